//! Content Fingerprint Store.
//!
//! Fingerprints persist as `IngestionMeta` nodes in the graph store, one
//! per source document, so re-ingestion decisions survive process
//! restarts. Written by the syncer only; query paths never read them.

use neo4rs::Query;

use emr_core::EngineResult;

use crate::GraphClient;

/// Return the last recorded content hash for a document, if any.
pub async fn last_seen(client: &GraphClient, doc_id: &str) -> EngineResult<Option<String>> {
    let query = Query::new(
        "OPTIONAL MATCH (m:IngestionMeta {doc_id: $doc_id}) RETURN m.last_hash AS last_hash"
            .to_string(),
    )
    .param("doc_id", doc_id);

    let hash: Option<Option<String>> = client.query_scalar(query, "last_hash").await?;
    Ok(hash.flatten())
}

/// Record a successful ingestion of a document.
///
/// Only called after both the graph load and the vector upsert succeed;
/// skipping this on failure is what guarantees the next pass retries.
pub async fn record_update(
    client: &GraphClient,
    doc_id: &str,
    patient_id: &str,
    file_name: &str,
    hash: &str,
) -> EngineResult<()> {
    let query = Query::new(
        "MERGE (p:Patient {patient_id: $pid})\n\
         MERGE (m:IngestionMeta {doc_id: $doc_id})\n\
         ON CREATE SET m.first_ingested = datetime()\n\
         SET m.last_ingested = datetime(),\n\
             m.last_file = $file,\n\
             m.last_hash = $hash\n\
         MERGE (p)-[:HAS_INGESTION_META]->(m)"
            .to_string(),
    )
    .param("pid", patient_id)
    .param("doc_id", doc_id)
    .param("file", file_name)
    .param("hash", hash);

    client.execute(query).await
}
