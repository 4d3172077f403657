//! Graph Loader: merges parsed documents into the patient graph.
//!
//! Every fact row becomes one idempotent merge across
//! `Patient → Section → Schema → Value`. Merge keys are composite
//! (patient, section, field[, value]) so repeated ingestion of identical
//! content creates zero additional nodes, and stable `node_id`s are
//! assigned with `coalesce` so an identifier is written exactly once and
//! preserved on every later merge.

use neo4rs::Query;
use serde_json::Value as Json;
use tracing::debug;
use uuid::Uuid;

use emr_core::{Document, EngineResult, FactRow, FactValue};

use crate::GraphClient;

/// Result of loading one document.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub facts_merged: usize,
}

/// Merge a parsed document into the graph.
///
/// Fails with a graph-write error on store connectivity loss; the caller
/// must not record the document's fingerprint in that case so the next
/// sync pass retries it.
pub async fn load_document(client: &GraphClient, doc: &Document) -> EngineResult<LoadResult> {
    // Root merge first so a document with no usable facts still registers
    // its patient node.
    let patient = Query::new("MERGE (p:Patient {patient_id: $pid})".to_string())
        .param("pid", doc.patient_id.as_str());
    client.execute(patient).await?;

    let facts = doc.facts();
    for row in &facts {
        client.execute(fact_merge_query(&doc.patient_id, row)).await?;
    }

    debug!(facts = facts.len(), "Document merged into graph");
    Ok(LoadResult {
        facts_merged: facts.len(),
    })
}

/// Build the merge statement for one fact row.
///
/// The relationship type is interpolated from the closed section registry,
/// never from document input; everything document-derived travels as a
/// parameter.
fn fact_merge_statement(row: &FactRow) -> String {
    let mut stmt = format!(
        "MERGE (p:Patient {{patient_id: $pid}})\n\
         MERGE (sec:Section {{name: $section, patient_id: $pid}})\n\
         MERGE (p)-[:{rel}]->(sec)\n\
         MERGE (s:Schema {{section: $section, field: $field, patient_id: $pid}})\n\
         SET s.node_id = coalesce(s.node_id, $schema_id)\n\
         MERGE (sec)-[:HAS_INFORMATION_OF]->(s)\n\
         MERGE (v:Value {{value: $value, value_type: $value_type, patient_id: $pid}})\n\
         ON CREATE SET v.created_at = datetime()\n\
         SET v.node_id = coalesce(v.node_id, $value_id)",
        rel = row.section.relationship()
    );

    if row.unit.is_some() {
        stmt.push_str(",\n    v.unit = $unit");
    }
    for (i, (name, _)) in row.entry_props.iter().enumerate() {
        stmt.push_str(&format!(",\n    v.{} = $p{}", name, i));
    }

    stmt.push_str("\nMERGE (s)-[:HAS_VALUE]->(v)");
    stmt
}

fn fact_merge_query(patient_id: &str, row: &FactRow) -> Query {
    let mut query = Query::new(fact_merge_statement(row))
        .param("pid", patient_id)
        .param("section", row.section_name.as_str())
        .param("field", row.field.as_str())
        .param("value_type", row.value_kind.as_str())
        // Fresh identifiers are only consumed when the target node does not
        // already carry one (coalesce in the statement).
        .param("schema_id", Uuid::new_v4().to_string())
        .param("value_id", Uuid::new_v4().to_string());

    query = match &row.value {
        FactValue::Str(s) => query.param("value", s.as_str()),
        FactValue::Int(i) => query.param("value", *i),
        FactValue::Bool(b) => query.param("value", *b),
    };

    if let Some(unit) = &row.unit {
        query = query.param("unit", unit.as_str());
    }

    for (i, (_, value)) in row.entry_props.iter().enumerate() {
        let key = format!("p{}", i);
        query = match value {
            Json::String(s) => query.param(&key, s.as_str()),
            Json::Number(n) if n.is_i64() => query.param(&key, n.as_i64().unwrap_or_default()),
            Json::Bool(b) => query.param(&key, *b),
            other => query.param(&key, other.to_string()),
        };
    }

    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use emr_core::{SectionKind, ValueKind};

    fn scalar_row() -> FactRow {
        FactRow {
            section: SectionKind::MenstrualHistory,
            section_name: "MenstrualHistory".to_string(),
            field: "AgeOfMenarche".to_string(),
            value: FactValue::Int(13),
            value_kind: ValueKind::Int,
            unit: Some("y".to_string()),
            entry_props: Vec::new(),
        }
    }

    fn dict_row() -> FactRow {
        FactRow {
            section: SectionKind::PastMedication,
            section_name: "PastMedication".to_string(),
            field: "PastMedication".to_string(),
            value: FactValue::Str("med_001".to_string()),
            value_kind: ValueKind::Dict,
            unit: None,
            entry_props: vec![
                ("generic_name".to_string(), Json::from("Bemfola")),
                ("dose".to_string(), Json::from("150 IU")),
            ],
        }
    }

    #[test]
    fn statement_uses_registry_relationship() {
        let stmt = fact_merge_statement(&scalar_row());
        assert!(stmt.contains("-[:HAS_MENSTRUAL_HISTORY]->"));
        assert!(stmt.contains("MERGE (p:Patient {patient_id: $pid})"));
    }

    #[test]
    fn identifiers_are_assigned_via_coalesce() {
        let stmt = fact_merge_statement(&scalar_row());
        assert!(stmt.contains("s.node_id = coalesce(s.node_id, $schema_id)"));
        assert!(stmt.contains("v.node_id = coalesce(v.node_id, $value_id)"));
    }

    #[test]
    fn unit_clause_only_present_when_set() {
        assert!(fact_merge_statement(&scalar_row()).contains("v.unit = $unit"));
        assert!(!fact_merge_statement(&dict_row()).contains("v.unit"));
    }

    #[test]
    fn entry_props_become_parameterized_set_clauses() {
        let stmt = fact_merge_statement(&dict_row());
        assert!(stmt.contains("v.generic_name = $p0"));
        assert!(stmt.contains("v.dose = $p1"));
        // Values never appear in the statement text.
        assert!(!stmt.contains("Bemfola"));
    }
}
