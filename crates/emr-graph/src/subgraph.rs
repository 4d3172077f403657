//! Patient subgraph read for the visualizer collaborator.
//!
//! Returns the full `Patient → Section → Schema → Value` subgraph as flat
//! `{id, attrs}` / `{source, target, attrs}` pairs so the consumer needs
//! no knowledge of the store's driver types.

use std::collections::HashSet;

use neo4rs::Query;
use serde::Serialize;
use serde_json::{json, Value as Json};

use emr_core::{EngineError, EngineResult, SectionKind};

use crate::GraphClient;

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub attrs: Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub attrs: Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientGraph {
    pub patient_id: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

const SUBGRAPH_CYPHER: &str = "\
MATCH (p:Patient {patient_id: $pid})-[r1]->(sec:Section {patient_id: $pid})
WHERE type(r1) IN $section_rels
OPTIONAL MATCH (sec)-[:HAS_INFORMATION_OF]->(s:Schema {patient_id: $pid})
OPTIONAL MATCH (s)-[:HAS_VALUE]->(v:Value {patient_id: $pid})
RETURN sec.name AS section, type(r1) AS section_rel,
       s.node_id AS schema_id, s.field AS field,
       v.node_id AS value_id, v.value AS value,
       v.value_type AS value_type, v.unit AS unit";

/// One flattened result row.
#[derive(Debug, Clone)]
pub(crate) struct SubgraphRow {
    pub section: String,
    pub section_rel: String,
    pub schema_id: Option<String>,
    pub field: Option<String>,
    pub value_id: Option<String>,
    pub value: Option<Json>,
    pub value_type: Option<String>,
    pub unit: Option<String>,
}

/// Fetch a patient's full subgraph.
///
/// Surfaces an empty subgraph as not-found so the caller can distinguish
/// "unknown patient" from a transport failure.
pub async fn fetch_patient_graph(client: &GraphClient, patient_id: &str) -> EngineResult<PatientGraph> {
    let section_rels: Vec<String> = SectionKind::KNOWN
        .iter()
        .chain(std::iter::once(&SectionKind::Other))
        .map(|kind| kind.relationship().to_string())
        .collect();

    let query = Query::new(SUBGRAPH_CYPHER.to_string())
        .param("pid", patient_id)
        .param("section_rels", section_rels);

    let raw = client.query(query).await?;
    let mut rows = Vec::with_capacity(raw.len());
    for row in &raw {
        rows.push(SubgraphRow {
            section: row
                .get("section")
                .map_err(|e| EngineError::GraphRead(format!("bad subgraph row: {:?}", e)))?,
            section_rel: row
                .get("section_rel")
                .map_err(|e| EngineError::GraphRead(format!("bad subgraph row: {:?}", e)))?,
            schema_id: row.get("schema_id").unwrap_or(None),
            field: row.get("field").unwrap_or(None),
            value_id: row.get("value_id").unwrap_or(None),
            value: row.get("value").unwrap_or(None),
            value_type: row.get("value_type").unwrap_or(None),
            unit: row.get("unit").unwrap_or(None),
        });
    }

    let graph = assemble_graph(patient_id, &rows);
    if graph.nodes.is_empty() {
        return Err(EngineError::not_found("no graph data for requested patient"));
    }
    Ok(graph)
}

/// Assemble deduplicated nodes and edges from flattened rows.
pub(crate) fn assemble_graph(patient_id: &str, rows: &[SubgraphRow]) -> PatientGraph {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut seen_nodes: HashSet<String> = HashSet::new();
    let mut seen_edges: HashSet<(String, String, String)> = HashSet::new();

    let add_node = |nodes: &mut Vec<GraphNode>, seen: &mut HashSet<String>, id: String, attrs: Json| {
        if seen.insert(id.clone()) {
            nodes.push(GraphNode { id, attrs });
        }
    };
    let add_edge = |edges: &mut Vec<GraphEdge>,
                        seen: &mut HashSet<(String, String, String)>,
                        source: String,
                        target: String,
                        rel: &str| {
        if seen.insert((source.clone(), target.clone(), rel.to_string())) {
            edges.push(GraphEdge {
                source,
                target,
                attrs: json!({ "type": rel }),
            });
        }
    };

    if rows.is_empty() {
        return PatientGraph {
            patient_id: patient_id.to_string(),
            nodes,
            edges,
        };
    }

    let patient_node = format!("patient:{}", patient_id);
    add_node(
        &mut nodes,
        &mut seen_nodes,
        patient_node.clone(),
        json!({ "label": "Patient" }),
    );

    for row in rows {
        let section_node = format!("section:{}", row.section);
        add_node(
            &mut nodes,
            &mut seen_nodes,
            section_node.clone(),
            json!({ "label": "Section", "name": row.section }),
        );
        add_edge(
            &mut edges,
            &mut seen_edges,
            patient_node.clone(),
            section_node.clone(),
            &row.section_rel,
        );

        let Some(schema_id) = &row.schema_id else { continue };
        add_node(
            &mut nodes,
            &mut seen_nodes,
            schema_id.clone(),
            json!({
                "label": "Schema",
                "section": row.section,
                "field": row.field,
            }),
        );
        add_edge(
            &mut edges,
            &mut seen_edges,
            section_node.clone(),
            schema_id.clone(),
            "HAS_INFORMATION_OF",
        );

        let Some(value_id) = &row.value_id else { continue };
        add_node(
            &mut nodes,
            &mut seen_nodes,
            value_id.clone(),
            json!({
                "label": "Value",
                "value": row.value,
                "value_type": row.value_type,
                "unit": row.unit,
            }),
        );
        add_edge(
            &mut edges,
            &mut seen_edges,
            schema_id.clone(),
            value_id.clone(),
            "HAS_VALUE",
        );
    }

    PatientGraph {
        patient_id: patient_id.to_string(),
        nodes,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(section: &str, schema: &str, field: &str, value_id: &str, value: &str) -> SubgraphRow {
        SubgraphRow {
            section: section.to_string(),
            section_rel: "HAS_MENSTRUAL_HISTORY".to_string(),
            schema_id: Some(schema.to_string()),
            field: Some(field.to_string()),
            value_id: Some(value_id.to_string()),
            value: Some(Json::from(value)),
            value_type: Some("string".to_string()),
            unit: None,
        }
    }

    #[test]
    fn empty_rows_produce_empty_graph() {
        let graph = assemble_graph("00028", &[]);
        assert!(graph.nodes.is_empty());
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn shared_nodes_are_deduplicated() {
        let rows = vec![
            row("MenstrualHistory", "sch-1", "Flow", "val-1", "heavy"),
            row("MenstrualHistory", "sch-1", "Flow", "val-2", "light"),
        ];
        let graph = assemble_graph("00028", &rows);

        // patient + section + one schema + two values
        assert_eq!(graph.nodes.len(), 5);
        // patient->section, section->schema, schema->value x2
        assert_eq!(graph.edges.len(), 4);

        let patient = graph.nodes.iter().find(|n| n.id == "patient:00028").unwrap();
        assert_eq!(patient.attrs["label"], "Patient");
        assert!(graph
            .edges
            .iter()
            .any(|e| e.source == "patient:00028" && e.attrs["type"] == "HAS_MENSTRUAL_HISTORY"));
    }

    #[test]
    fn sections_without_values_still_appear() {
        let rows = vec![SubgraphRow {
            section: "GeneralInformation".to_string(),
            section_rel: "HAS_GENERAL_INFORMATION".to_string(),
            schema_id: None,
            field: None,
            value_id: None,
            value: None,
            value_type: None,
            unit: None,
        }];
        let graph = assemble_graph("00028", &rows);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
    }
}
