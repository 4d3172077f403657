//! RAG route handlers: index maintenance and question answering.

use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use emr_core::EngineError;
use emr_embedding::IndexReport;
use emr_retrieval::PlanStep;

use crate::error::ApiError;
use crate::state::AppState;

/// Retrieval strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Hybrid,
    Graph,
}

impl QueryMode {
    fn parse(raw: &str) -> Result<Self, ApiError> {
        match raw {
            "hybrid" => Ok(Self::Hybrid),
            "graph" => Ok(Self::Graph),
            other => Err(ApiError(EngineError::InvalidDocument(format!(
                "mode must be 'hybrid' or 'graph', got '{}'",
                other
            )))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryPayload {
    pub question: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub patient_ids: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct HybridResponse {
    pub answer: String,
    pub assembled_context: String,
    pub evidence_value_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct GraphModeResponse {
    pub answer: String,
    pub trace: Vec<PlanStep>,
}

pub async fn rebuild_index(State(state): State<AppState>) -> Result<Json<IndexReport>, ApiError> {
    let report = state.indexer.rebuild_all().await?;
    Ok(Json(report))
}

pub async fn upsert_index(
    State(state): State<AppState>,
    Json(patient_ids): Json<Vec<String>>,
) -> Result<Json<IndexReport>, ApiError> {
    let report = state.indexer.upsert_patients(&patient_ids).await?;
    Ok(Json(report))
}

pub async fn query(
    State(state): State<AppState>,
    Json(payload): Json<QueryPayload>,
) -> Result<Response, ApiError> {
    run_query(
        &state,
        &payload.question,
        payload.mode,
        payload.patient_ids.as_deref(),
        None,
    )
    .await
}

/// Query with an attached raw-text document (multipart/form-data fields:
/// `question`, `mode`, comma-separated `patient_ids`, `document`). The
/// document is appended to the hybrid context, never embedded or searched.
pub async fn query_with_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut question: Option<String> = None;
    let mut mode = QueryMode::default();
    let mut patient_ids: Option<Vec<String>> = None;
    let mut document: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(EngineError::InvalidDocument(format!("bad multipart body: {}", e))))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let text = field
            .text()
            .await
            .map_err(|e| ApiError(EngineError::InvalidDocument(format!("bad field '{}': {}", name, e))))?;

        match name.as_str() {
            "question" => question = Some(text),
            "mode" => mode = QueryMode::parse(text.trim())?,
            "patient_ids" => patient_ids = Some(parse_patient_ids(&text)),
            "document" => document = Some(text),
            _ => {}
        }
    }

    let question = question.ok_or_else(|| {
        ApiError(EngineError::InvalidDocument("missing 'question' field".to_string()))
    })?;

    run_query(
        &state,
        &question,
        mode,
        patient_ids.as_deref(),
        document.as_deref(),
    )
    .await
}

async fn run_query(
    state: &AppState,
    question: &str,
    mode: QueryMode,
    patient_ids: Option<&[String]>,
    extra_doc: Option<&str>,
) -> Result<Response, ApiError> {
    match mode {
        QueryMode::Graph => {
            let result = state.planner.answer(question, patient_ids).await?;
            Ok(Json(GraphModeResponse {
                answer: result.answer,
                trace: result.trace,
            })
            .into_response())
        }
        QueryMode::Hybrid => {
            let result = state.retriever.answer(question, patient_ids, extra_doc).await?;
            Ok(Json(HybridResponse {
                answer: result.answer,
                assembled_context: result.context,
                evidence_value_ids: result.evidence,
            })
            .into_response())
        }
    }
}

/// Split a comma-separated patient-ID form field, dropping blanks.
fn parse_patient_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_mode_defaults_to_hybrid() {
        let payload: QueryPayload =
            serde_json::from_str(r#"{ "question": "What medication?" }"#).unwrap();
        assert_eq!(payload.mode, QueryMode::Hybrid);
        assert!(payload.patient_ids.is_none());

        let payload: QueryPayload = serde_json::from_str(
            r#"{ "question": "q", "mode": "graph", "patient_ids": ["00028"] }"#,
        )
        .unwrap();
        assert_eq!(payload.mode, QueryMode::Graph);
        assert_eq!(payload.patient_ids.unwrap(), vec!["00028".to_string()]);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(serde_json::from_str::<QueryPayload>(r#"{ "question": "q", "mode": "both" }"#).is_err());
        assert!(QueryMode::parse("both").is_err());
    }

    #[test]
    fn patient_id_field_splits_on_commas() {
        assert_eq!(
            parse_patient_ids("00028, 00042,,  "),
            vec!["00028".to_string(), "00042".to_string()]
        );
        assert!(parse_patient_ids("").is_empty());
    }
}
