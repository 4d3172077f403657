//! Graph schema initialization (constraints, indexes, identifier backfill).

use neo4rs::Query;
use tracing::info;

use emr_core::EngineResult;

use crate::GraphClient;

/// Cypher statements for schema initialization.
const SCHEMA_STATEMENTS: &[&str] = &[
    // Uniqueness constraints
    "CREATE CONSTRAINT patient_id IF NOT EXISTS FOR (p:Patient) REQUIRE p.patient_id IS UNIQUE",
    "CREATE CONSTRAINT ingestion_meta_doc IF NOT EXISTS FOR (m:IngestionMeta) REQUIRE m.doc_id IS UNIQUE",
    "CREATE CONSTRAINT schema_node_id IF NOT EXISTS FOR (s:Schema) REQUIRE s.node_id IS UNIQUE",
    "CREATE CONSTRAINT value_node_id IF NOT EXISTS FOR (v:Value) REQUIRE v.node_id IS UNIQUE",
    // Composite lookup indexes
    "CREATE INDEX section_patient IF NOT EXISTS FOR (sec:Section) ON (sec.name, sec.patient_id)",
    "CREATE INDEX schema_key IF NOT EXISTS FOR (s:Schema) ON (s.section, s.field, s.patient_id)",
    "CREATE INDEX value_key IF NOT EXISTS FOR (v:Value) ON (v.value, v.value_type, v.patient_id)",
];

/// Repair statements for nodes that predate stable identifiers. Data
/// ingested by early backfills can carry null `node_id`s; those nodes are
/// invisible to the vector indexer until repaired.
const BACKFILL_STATEMENTS: &[&str] = &[
    "MATCH (s:Schema) WHERE s.node_id IS NULL SET s.node_id = randomUUID()",
    "MATCH (v:Value) WHERE v.node_id IS NULL SET v.node_id = randomUUID()",
];

/// Initialize the graph schema with constraints and indexes.
///
/// Safe to run multiple times - uses IF NOT EXISTS clauses, and the
/// backfill only touches nodes with null identifiers.
pub async fn initialize_schema(client: &GraphClient) -> EngineResult<()> {
    info!("Initializing graph schema...");

    for statement in SCHEMA_STATEMENTS {
        client.execute(Query::new(statement.to_string())).await?;
    }
    for statement in BACKFILL_STATEMENTS {
        client.execute(Query::new(statement.to_string())).await?;
    }

    info!(
        "Graph schema initialized ({} statements)",
        SCHEMA_STATEMENTS.len() + BACKFILL_STATEMENTS.len()
    );
    Ok(())
}
