//! Live schema summary for the query planner.

use neo4rs::Query;
use serde::Serialize;

use emr_core::EngineResult;

use crate::GraphClient;

/// Snapshot of the store's current labels, relationship types, and
/// property keys. Rendered into the query-generation prompt so generated
/// statements stay constrained to what actually exists.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
    pub property_keys: Vec<String>,
}

impl SchemaSummary {
    /// Render the summary as a prompt block.
    pub fn render(&self) -> String {
        format!(
            "Node labels: {}\nRelationship types: {}\nProperty keys: {}",
            self.labels.join(", "),
            self.relationship_types.join(", "),
            self.property_keys.join(", ")
        )
    }
}

/// Fetch the live schema from the graph store.
pub async fn schema_summary(client: &GraphClient) -> EngineResult<SchemaSummary> {
    Ok(SchemaSummary {
        labels: collect(client, "CALL db.labels() YIELD label RETURN label AS name").await?,
        relationship_types: collect(
            client,
            "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType AS name",
        )
        .await?,
        property_keys: collect(
            client,
            "CALL db.propertyKeys() YIELD propertyKey RETURN propertyKey AS name",
        )
        .await?,
    })
}

async fn collect(client: &GraphClient, cypher: &str) -> EngineResult<Vec<String>> {
    let rows = client.query(Query::new(cypher.to_string())).await?;
    let mut names = Vec::with_capacity(rows.len());
    for row in rows {
        if let Ok(name) = row.get::<String>("name") {
            names.push(name);
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_every_dimension() {
        let summary = SchemaSummary {
            labels: vec!["Patient".to_string(), "Value".to_string()],
            relationship_types: vec!["HAS_VALUE".to_string()],
            property_keys: vec!["patient_id".to_string()],
        };
        let block = summary.render();
        assert!(block.contains("Node labels: Patient, Value"));
        assert!(block.contains("Relationship types: HAS_VALUE"));
        assert!(block.contains("Property keys: patient_id"));
    }
}
