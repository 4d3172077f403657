//! Ingestion trigger.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Trigger a sync pass. Responds optimistically: `"queued"` when this call
/// spawned a pass, `"ok"` when one was already in flight. True completion
/// is observed via subsequent query results.
pub async fn run_sync(State(state): State<AppState>) -> Json<Value> {
    let status = state.syncer.trigger();
    Json(json!({ "status": status }))
}
