//! Vector indexing pipeline.
//!
//! Flattens graph facts into retrievable text units, embeds them in
//! batches, and upserts them into the vector store keyed by the fact's
//! stable `Value` identifier. The graph store remains the system of
//! record; the whole index is rebuildable from it at any time.

use neo4rs::Query;
use serde_json::{json, Value as Json};
use tracing::{debug, info};

use emr_core::hash::patient_hash;
use emr_core::{EngineConfig, EngineError, EngineResult};
use emr_graph::GraphClient;

use crate::embedder::EmbeddingClient;
use crate::store::{FactPoint, VectorStore};

/// Texts per embedding request.
const EMBED_BATCH: usize = 64;

/// Bumped when the canonical text format changes, so stale records are
/// identifiable in the payload.
const EMBEDDING_VERSION: i64 = 1;

/// Result of an indexing operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexReport {
    pub collection: String,
    pub upserted: usize,
}

/// One eligible fact pulled from the graph store.
#[derive(Debug, Clone)]
pub(crate) struct FactRecord {
    pub patient_id: String,
    pub section: String,
    pub field: String,
    pub value_id: String,
    pub schema_id: String,
    pub props: Json,
}

/// Rows eligible for indexing: facts whose `Schema` and `Value` nodes both
/// carry stable identifiers. Nodes lacking one are skipped, not fabricated.
/// The props projection enumerates scalar fields only; whole-node
/// projection would drag in the `created_at` temporal.
const FACT_ROWS: &str = "\
MATCH (p:Patient)
MATCH (p)-[]->(sec:Section {patient_id: p.patient_id})
MATCH (sec)-[:HAS_INFORMATION_OF]->(s:Schema {patient_id: p.patient_id})
MATCH (s)-[:HAS_VALUE]->(v:Value {patient_id: p.patient_id})
WHERE v.node_id IS NOT NULL AND s.node_id IS NOT NULL
RETURN p.patient_id AS patient_id, sec.name AS section, s.field AS field,
       v.node_id AS value_id, s.node_id AS schema_id,
       v {.value, .value_type, .unit, .category, .type, .since_year,
          .on_medication, .generic_name, .brand_name, .dose, .frequency,
          .route, .test_name, .result, .date} AS props";

const FACT_ROWS_FILTERED: &str = "\
MATCH (p:Patient)
WHERE p.patient_id IN $pids
MATCH (p)-[]->(sec:Section {patient_id: p.patient_id})
MATCH (sec)-[:HAS_INFORMATION_OF]->(s:Schema {patient_id: p.patient_id})
MATCH (s)-[:HAS_VALUE]->(v:Value {patient_id: p.patient_id})
WHERE v.node_id IS NOT NULL AND s.node_id IS NOT NULL
RETURN p.patient_id AS patient_id, sec.name AS section, s.field AS field,
       v.node_id AS value_id, s.node_id AS schema_id,
       v {.value, .value_type, .unit, .category, .type, .since_year,
          .on_medication, .generic_name, .brand_name, .dose, .frequency,
          .route, .test_name, .result, .date} AS props";

/// Pipeline turning graph facts into vector records.
pub struct VectorIndexer {
    graph: GraphClient,
    embedder: EmbeddingClient,
    store: VectorStore,
    patient_salt: String,
}

impl VectorIndexer {
    pub fn new(
        graph: GraphClient,
        embedder: EmbeddingClient,
        store: VectorStore,
        config: &EngineConfig,
    ) -> Self {
        Self {
            graph,
            embedder,
            store,
            patient_salt: config.patient_salt.clone(),
        }
    }

    /// Full re-embedding pass over every eligible fact in the graph.
    /// Idempotent: point IDs derive from stable `Value` identifiers, so
    /// repeating the pass overwrites rather than duplicates.
    pub async fn rebuild_all(&self) -> EngineResult<IndexReport> {
        self.store.ensure_collection().await?;
        let rows = self.fetch_rows(None).await?;
        self.upsert_rows(rows).await
    }

    /// Incremental path: re-index only the given patients' facts. Invoked
    /// by the syncer after a successful graph load of the same documents.
    pub async fn upsert_patients(&self, patient_ids: &[String]) -> EngineResult<IndexReport> {
        if patient_ids.is_empty() {
            return Ok(IndexReport {
                collection: self.store.collection().to_string(),
                upserted: 0,
            });
        }
        self.store.ensure_collection().await?;
        let rows = self.fetch_rows(Some(patient_ids)).await?;
        self.upsert_rows(rows).await
    }

    /// Number of points currently in the collection.
    pub async fn vector_count(&self) -> EngineResult<u64> {
        self.store.count().await
    }

    async fn fetch_rows(&self, patient_ids: Option<&[String]>) -> EngineResult<Vec<FactRecord>> {
        let query = match patient_ids {
            Some(pids) => Query::new(FACT_ROWS_FILTERED.to_string()).param("pids", pids.to_vec()),
            None => Query::new(FACT_ROWS.to_string()),
        };

        let raw = self.graph.query(query).await?;
        let mut rows = Vec::with_capacity(raw.len());
        for row in &raw {
            rows.push(FactRecord {
                patient_id: get_field(row, "patient_id")?,
                section: get_field(row, "section")?,
                field: get_field(row, "field")?,
                value_id: get_field(row, "value_id")?,
                schema_id: get_field(row, "schema_id")?,
                props: get_field(row, "props")?,
            });
        }
        Ok(rows)
    }

    async fn upsert_rows(&self, rows: Vec<FactRecord>) -> EngineResult<IndexReport> {
        let mut upserted = 0;

        for chunk in rows.chunks(EMBED_BATCH) {
            let texts: Vec<String> = chunk.iter().map(canonical_text).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| EngineError::IndexWrite(e.to_string()))?;

            let points: Vec<FactPoint> = chunk
                .iter()
                .zip(vectors)
                .map(|(record, vector)| FactPoint {
                    id: record.value_id.clone(),
                    vector,
                    payload: payload_for(&self.patient_salt, self.embedder.model(), record),
                })
                .collect();

            upserted += self.store.upsert_batch(points).await?;
            debug!(upserted, "Index batch complete");
        }

        info!(upserted, collection = %self.store.collection(), "Vector index updated");
        Ok(IndexReport {
            collection: self.store.collection().to_string(),
            upserted,
        })
    }
}

fn get_field<T: serde::de::DeserializeOwned>(row: &neo4rs::Row, field: &str) -> EngineResult<T> {
    row.get(field)
        .map_err(|e| EngineError::IndexWrite(format!("bad fact row, missing {}: {:?}", field, e)))
}

/// Canonical text to embed for one fact.
///
/// Keyed-collection entries get dedicated phrasings so the terms a
/// clinician would search for (disease categories, medication names, test
/// names) actually appear in the embedded text; plain scalars render as a
/// single declarative sentence.
pub(crate) fn canonical_text(record: &FactRecord) -> String {
    let props = record.props.as_object();
    let prop = |name: &str| -> Option<String> {
        props
            .and_then(|map| map.get(name))
            .and_then(render_scalar)
    };

    if record.section == "MedicalHistory" && record.field == "PastDisease" {
        return format!(
            "Past disease ({}; type: {}), since {}, on medication: {}.",
            prop("category").unwrap_or_else(|| "unknown".to_string()),
            prop("type").unwrap_or_else(|| "unknown".to_string()),
            prop("since_year").unwrap_or_else(|| "unknown".to_string()),
            prop("on_medication").unwrap_or_else(|| "unknown".to_string()),
        );
    }

    if record.field == "PastMedication" {
        let name = prop("generic_name")
            .or_else(|| prop("brand_name"))
            .unwrap_or_else(|| prop("value").unwrap_or_default());
        let mut text = format!("Past medication {}", name);
        if let Some(brand) = prop("brand_name") {
            if prop("generic_name").is_some() {
                text.push_str(&format!(" ({})", brand));
            }
        }
        if let Some(dose) = prop("dose") {
            text.push_str(&format!(", dose {}", dose));
        }
        if let Some(freq) = prop("frequency") {
            text.push_str(&format!(", frequency {}", freq));
        }
        if let Some(route) = prop("route") {
            text.push_str(&format!(", route {}", route));
        }
        text.push('.');
        return text;
    }

    if record.field == "PastTesting" {
        let mut text = format!(
            "Past test {}: {}",
            prop("test_name").unwrap_or_else(|| prop("value").unwrap_or_default()),
            prop("result").unwrap_or_else(|| "no result recorded".to_string()),
        );
        if let Some(date) = prop("date") {
            text.push_str(&format!(" on {}", date));
        }
        text.push('.');
        return text;
    }

    let unit = prop("unit").map(|u| format!(" {}", u)).unwrap_or_default();
    format!(
        "Patient {}: {}{}.",
        record.field,
        prop("value").unwrap_or_default(),
        unit
    )
}

/// Vector payload for one fact. Carries the hashed patient identifier
/// only; the raw identifier must never enter the vector store.
pub(crate) fn payload_for(salt: &str, embed_model: &str, record: &FactRecord) -> Json {
    let props = record.props.as_object();
    let prop = |name: &str| props.and_then(|map| map.get(name)).cloned();

    json!({
        "value_id": record.value_id,
        "schema_id": record.schema_id,
        "patient_hash": patient_hash(salt, &record.patient_id),
        "section": record.section,
        "field": record.field,
        "value_type": prop("value_type"),
        "unit": prop("unit"),
        "embedding_model": embed_model,
        "embedding_version": EMBEDDING_VERSION,
        "indexed_at": chrono::Utc::now().to_rfc3339(),
    })
}

fn render_scalar(value: &Json) -> Option<String> {
    match value {
        Json::String(s) if !s.is_empty() => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(section: &str, field: &str, props: Json) -> FactRecord {
        FactRecord {
            patient_id: "00028".to_string(),
            section: section.to_string(),
            field: field.to_string(),
            value_id: "val-1".to_string(),
            schema_id: "sch-1".to_string(),
            props,
        }
    }

    #[test]
    fn scalar_facts_render_with_unit() {
        let rec = record(
            "MenstrualHistory",
            "AgeOfMenarche",
            json!({ "value": 13, "unit": "y" }),
        );
        assert_eq!(canonical_text(&rec), "Patient AgeOfMenarche: 13 y.");
    }

    #[test]
    fn disease_entries_use_dedicated_phrasing() {
        let rec = record(
            "MedicalHistory",
            "PastDisease",
            json!({
                "value": "dis_001",
                "category": "endocrine",
                "type": "PCOS",
                "since_year": 2019,
                "on_medication": true
            }),
        );
        assert_eq!(
            canonical_text(&rec),
            "Past disease (endocrine; type: PCOS), since 2019, on medication: true."
        );
    }

    #[test]
    fn medication_entries_surface_the_drug_name() {
        let rec = record(
            "PastMedication",
            "PastMedication",
            json!({
                "value": "med_001",
                "generic_name": "Bemfola",
                "dose": "150 IU",
                "frequency": "daily"
            }),
        );
        let text = canonical_text(&rec);
        assert!(text.contains("Bemfola"));
        assert!(text.contains("150 IU"));
        assert!(text.contains("daily"));
    }

    #[test]
    fn payload_never_carries_the_raw_patient_id() {
        let rec = record("MenstrualHistory", "Flow", json!({ "value": "heavy" }));
        let payload = payload_for("test-salt", "text-embedding-3-small", &rec);

        let hash = payload["patient_hash"].as_str().unwrap();
        assert_ne!(hash, "00028");
        assert!(payload.get("patient_id").is_none());

        let serialized = payload.to_string();
        assert!(!serialized.contains("00028"));
    }
}
