//! # EMR Web
//!
//! Axum-based REST surface for the engine: ingestion trigger, vector
//! index maintenance, hybrid/graph query, and the patient subgraph read.

pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest/sync", post(routes::ingest::run_sync))
        .route("/rag/index/rebuild", post(routes::rag::rebuild_index))
        .route("/rag/index/upsert", post(routes::rag::upsert_index))
        .route("/rag/query", post(routes::rag::query))
        .route("/rag/query/upload", post(routes::rag::query_with_document))
        .route("/patients/{patient_id}/graph", get(routes::patients::get_graph))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the web server.
pub async fn run_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Web server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}
