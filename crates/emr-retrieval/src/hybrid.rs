//! Hybrid retrieval: vector similarity search fused with graph context
//! expansion.
//!
//! ## Pipeline
//! 1. Embed the question with the same model used at indexing time
//! 2. ANN search, optionally filtered by hashed patient identifiers
//! 3. Dedup hits by stable `Value` identifier, preserving rank order
//! 4. Expand each identifier into its full graph context, grouped by
//!    patient and section
//! 5. Synthesize an answer grounded in the structured context
//!
//! Zero ANN hits short-circuit to a fixed insufficient-data answer with an
//! empty evidence list; that outcome is a valid result, not an error.

use std::collections::HashSet;

use neo4rs::Query;
use serde_json::{Map, Value as Json};
use tracing::debug;

use emr_core::hash::patient_hash;
use emr_core::EngineResult;
use emr_embedding::{EmbeddingClient, VectorHit, VectorStore};
use emr_graph::GraphClient;

use crate::synthesis::ChatClient;

/// Nearest neighbors fetched per query.
pub const TOP_K: u64 = 12;

/// Answer returned when nothing in the index matches the question.
pub const INSUFFICIENT_DATA_ANSWER: &str =
    "No indexed facts matched this question; there is insufficient data to answer.";

const SYSTEM_PROMPT: &str = "You are a clinical QA assistant. Use ONLY the provided JSON facts \
    (and optional document) to answer. If insufficient evidence is present, say so explicitly.";

/// Graph expansion for a set of `Value` identifiers, grouped by patient
/// and section with a cap per group.
const CONTEXT_CYPHER: &str = "\
MATCH (v:Value) WHERE v.node_id IN $ids
MATCH (s:Schema)-[:HAS_VALUE]->(v)
MATCH (sec:Section)-[:HAS_INFORMATION_OF]->(s)
MATCH (p:Patient)-[]->(sec)
WITH p, sec, s, v
ORDER BY p.patient_id
WITH p.patient_id AS patient_id, sec.name AS section,
     collect(DISTINCT {
       field: s.field,
       value: v.value,
       value_type: v.value_type,
       unit: v.unit,
       node_id: v.node_id,
       category: v.category,
       disease_type: v.type,
       since_year: v.since_year,
       on_medication: v.on_medication,
       generic_name: v.generic_name,
       brand_name: v.brand_name,
       dose: v.dose,
       frequency: v.frequency,
       test_name: v.test_name,
       result: v.result
     })[0..24] AS facts
RETURN patient_id, section, facts";

/// A hybrid answer with its grounding context and evidence.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HybridAnswer {
    pub answer: String,
    /// Serialized JSON context the answer was grounded in.
    pub context: String,
    /// Stable `Value` identifiers supporting the answer. Never raw
    /// patient identifiers.
    pub evidence: Vec<String>,
}

/// One grouped context row from the graph store.
#[derive(Debug, Clone)]
pub(crate) struct ContextRow {
    pub patient_id: String,
    pub section: String,
    pub facts: Json,
}

/// Question answering over the vector index plus graph expansion.
pub struct HybridRetriever {
    graph: GraphClient,
    embedder: EmbeddingClient,
    store: VectorStore,
    chat: ChatClient,
    patient_salt: String,
}

impl HybridRetriever {
    pub fn new(
        graph: GraphClient,
        embedder: EmbeddingClient,
        store: VectorStore,
        chat: ChatClient,
        patient_salt: String,
    ) -> Self {
        Self {
            graph,
            embedder,
            store,
            chat,
            patient_salt,
        }
    }

    /// Answer a question, optionally restricted to the given patients and
    /// optionally grounded in an extra uploaded document.
    pub async fn answer(
        &self,
        question: &str,
        patient_ids: Option<&[String]>,
        extra_doc: Option<&str>,
    ) -> EngineResult<HybridAnswer> {
        let query_vector = self.embedder.embed(question).await?;

        let hashes: Option<Vec<String>> = patient_ids.map(|ids| {
            ids.iter()
                .map(|id| patient_hash(&self.patient_salt, id))
                .collect()
        });

        let hits = self
            .store
            .search(query_vector, TOP_K, hashes.as_deref())
            .await?;
        let evidence = dedup_value_ids(&hits);
        debug!(hits = hits.len(), evidence = evidence.len(), "ANN search complete");

        if evidence.is_empty() {
            return Ok(HybridAnswer {
                answer: INSUFFICIENT_DATA_ANSWER.to_string(),
                context: "{}".to_string(),
                evidence: Vec::new(),
            });
        }

        let rows = self.fetch_context(&evidence).await?;
        let context = serde_json::to_string_pretty(&group_context(&rows))?;

        let mut user = format!(
            "Question:\n{}\n\nEMR JSON (grouped by patient/section):\n{}",
            question, context
        );
        if let Some(doc) = extra_doc {
            user.push_str(&format!("\n\nAdditional consultation document:\n{}", doc));
        }

        let answer = self.chat.complete_with_fallback(SYSTEM_PROMPT, &user).await?;

        Ok(HybridAnswer {
            answer,
            context,
            evidence,
        })
    }

    async fn fetch_context(&self, ids: &[String]) -> EngineResult<Vec<ContextRow>> {
        let query = Query::new(CONTEXT_CYPHER.to_string()).param("ids", ids.to_vec());
        let raw = self.graph.query(query).await?;

        let mut rows = Vec::with_capacity(raw.len());
        for row in &raw {
            let (Ok(patient_id), Ok(section)) = (row.get("patient_id"), row.get("section")) else {
                continue;
            };
            rows.push(ContextRow {
                patient_id,
                section,
                facts: row.get("facts").unwrap_or(Json::Null),
            });
        }
        Ok(rows)
    }
}

/// Extract the stable `Value` identifiers from search hits, deduplicated
/// and in rank order.
pub(crate) fn dedup_value_ids(hits: &[VectorHit]) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter_map(|hit| hit.payload.get("value_id").and_then(|v| v.as_str()))
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// Group context rows into `{patient: {section: facts}}`.
pub(crate) fn group_context(rows: &[ContextRow]) -> Json {
    let mut by_patient: Map<String, Json> = Map::new();

    for row in rows {
        let patient = by_patient
            .entry(row.patient_id.clone())
            .or_insert_with(|| Json::Object(Map::new()));
        if let Json::Object(sections) = patient {
            sections.insert(row.section.clone(), row.facts.clone());
        }
    }

    Json::Object(by_patient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(value_id: Option<&str>) -> VectorHit {
        VectorHit {
            id: "point".to_string(),
            score: 0.9,
            payload: match value_id {
                Some(id) => json!({ "value_id": id }),
                None => json!({}),
            },
        }
    }

    #[test]
    fn dedup_preserves_rank_order() {
        let hits = vec![hit(Some("b")), hit(Some("a")), hit(Some("b")), hit(None)];
        assert_eq!(dedup_value_ids(&hits), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn empty_hits_produce_no_evidence() {
        assert!(dedup_value_ids(&[]).is_empty());
        assert!(dedup_value_ids(&[hit(None)]).is_empty());
    }

    #[test]
    fn context_groups_by_patient_then_section() {
        let rows = vec![
            ContextRow {
                patient_id: "00028".to_string(),
                section: "PastMedication".to_string(),
                facts: json!([{ "field": "PastMedication", "generic_name": "Bemfola" }]),
            },
            ContextRow {
                patient_id: "00028".to_string(),
                section: "MenstrualHistory".to_string(),
                facts: json!([{ "field": "Flow", "value": "heavy" }]),
            },
        ];

        let grouped = group_context(&rows);
        assert_eq!(
            grouped["00028"]["PastMedication"][0]["generic_name"],
            "Bemfola"
        );
        assert_eq!(grouped["00028"]["MenstrualHistory"][0]["field"], "Flow");
    }
}
