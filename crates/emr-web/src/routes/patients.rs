//! Patient subgraph read for the visualizer collaborator.

use axum::extract::{Path, State};
use axum::Json;

use emr_graph::{fetch_patient_graph, PatientGraph};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_graph(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientGraph>, ApiError> {
    let graph = fetch_patient_graph(&state.graph, &patient_id).await?;
    Ok(Json(graph))
}
