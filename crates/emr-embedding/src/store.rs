//! Qdrant vector store client.
//!
//! Manages the facts collection, upserts points, and performs filtered
//! similarity search via the qdrant-client gRPC library.

use std::time::Duration;

use qdrant_client::qdrant::{
    value::Kind, Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance,
    FieldType, Filter, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

use emr_core::{EngineError, EngineResult, VectorSettings};

/// Bound on any single vector-store call.
const STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// A point ready for upsert: deterministic ID, vector, JSON payload.
#[derive(Debug, Clone)]
pub struct FactPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// Vector store client for the facts collection.
#[derive(Clone)]
pub struct VectorStore {
    client: Qdrant,
    collection: String,
    dim: usize,
}

impl VectorStore {
    /// Create a new VectorStore client.
    pub fn new(settings: &VectorSettings) -> EngineResult<Self> {
        let mut builder = Qdrant::from_url(&settings.url);
        if let Some(key) = &settings.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| EngineError::IndexWrite(format!("failed to create Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            collection: settings.collection.clone(),
            dim: settings.embed_dim,
        })
    }

    /// Name of the managed collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ensure the facts collection exists with the correct configuration,
    /// plus a keyword payload index on `patient_hash` for fast filtering.
    pub async fn ensure_collection(&self) -> EngineResult<()> {
        let exists = self
            .bounded("failed to check collection", self.client.collection_exists(&self.collection))
            .await?;

        if !exists {
            self.bounded(
                "failed to create collection",
                self.client.create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dim as u64, Distance::Cosine),
                    ),
                ),
            )
            .await?;

            info!(collection = %self.collection, "Created vector collection");
        } else {
            debug!(collection = %self.collection, "Collection already exists");
        }

        // Index creation on an already-indexed field is rejected by some
        // server versions; filtered search still works without it, only slower.
        let index = self
            .bounded(
                "failed to create payload index",
                self.client.create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    "patient_hash",
                    FieldType::Keyword,
                )),
            )
            .await;
        if let Err(e) = index {
            debug!(error = %e, "Payload index creation skipped");
        }

        Ok(())
    }

    /// Upsert a batch of points. Each point is independently idempotent:
    /// the same ID always overwrites, never duplicates.
    pub async fn upsert_batch(&self, points: Vec<FactPoint>) -> EngineResult<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| PointStruct::new(uuid_point_id(&p.id), p.vector, flatten_payload(&p.payload)))
            .collect();

        self.bounded(
            "failed to upsert points",
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, qdrant_points)),
        )
        .await?;

        debug!(count, collection = %self.collection, "Upserted vectors");
        Ok(count)
    }

    /// Search for similar vectors, optionally restricted to a set of
    /// hashed patient identifiers (match-any).
    pub async fn search(
        &self,
        query_vector: Vec<f32>,
        top_k: u64,
        patient_hashes: Option<&[String]>,
    ) -> EngineResult<Vec<VectorHit>> {
        let mut builder =
            SearchPointsBuilder::new(&self.collection, query_vector, top_k).with_payload(true);

        if let Some(hashes) = patient_hashes.filter(|h| !h.is_empty()) {
            let conditions: Vec<Condition> = hashes
                .iter()
                .map(|h| Condition::matches("patient_hash", h.clone()))
                .collect();
            builder = builder.filter(Filter::should(conditions));
        }

        let response = self
            .bounded("vector search failed", self.client.search_points(builder))
            .await?;

        let hits = response
            .result
            .into_iter()
            .map(|point| VectorHit {
                id: point
                    .id
                    .map(|id| format!("{:?}", id))
                    .unwrap_or_default(),
                score: point.score,
                payload: payload_to_json(&point.payload),
            })
            .collect();

        Ok(hits)
    }

    /// Number of points in the collection.
    pub async fn count(&self) -> EngineResult<u64> {
        let info = self
            .bounded("failed to get collection info", self.client.collection_info(&self.collection))
            .await?;

        Ok(info
            .result
            .map(|r| r.points_count.unwrap_or(0))
            .unwrap_or(0))
    }

    async fn bounded<T, E>(
        &self,
        context: &str,
        fut: impl std::future::Future<Output = Result<T, E>>,
    ) -> EngineResult<T>
    where
        E: std::fmt::Display,
    {
        match timeout(STORE_TIMEOUT, fut).await {
            Err(_) => Err(EngineError::Timeout(STORE_TIMEOUT)),
            Ok(Err(e)) => Err(EngineError::IndexWrite(format!("{}: {}", context, e))),
            Ok(Ok(value)) => Ok(value),
        }
    }
}

/// Payload field that must never reach the store. The indexer only ever
/// emits the salted `patient_hash`; dropping the raw key at the conversion
/// boundary makes the privacy invariant structural, not conventional.
const FORBIDDEN_PAYLOAD_FIELD: &str = "patient_id";

/// Convert a stable identifier to a UUID-formatted Qdrant point ID.
///
/// Identifiers assigned by the loader are already UUIDs and pass through
/// unchanged, which is what makes repeated upserts overwrite rather than
/// duplicate. Legacy identifiers that predate UUID assignment derive a
/// synthetic UUID from their digest, so the same identifier always maps
/// to the same point.
pub(crate) fn uuid_point_id(id: &str) -> String {
    if let Ok(parsed) = Uuid::parse_str(id) {
        return parsed.to_string();
    }

    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes).to_string()
}

/// Flatten a JSON object into a Qdrant payload. Only scalar fields
/// survive, and a raw patient identifier is refused outright.
pub(crate) fn flatten_payload(json: &serde_json::Value) -> std::collections::HashMap<String, Value> {
    let serde_json::Value::Object(map) = json else {
        return std::collections::HashMap::new();
    };

    map.iter()
        .filter(|(key, _)| key.as_str() != FORBIDDEN_PAYLOAD_FIELD)
        .filter_map(|(key, val)| scalar_to_qdrant(val).map(|v| (key.clone(), v)))
        .collect()
}

fn scalar_to_qdrant(val: &serde_json::Value) -> Option<Value> {
    // i64 checked before f64 so integer fields stay integers in the store.
    let kind = match val {
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64()?),
        },
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        _ => return None,
    };
    Some(Value { kind: Some(kind) })
}

/// Rebuild a JSON object from a stored Qdrant payload.
pub(crate) fn payload_to_json(payload: &std::collections::HashMap<String, Value>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = payload
        .iter()
        .filter_map(|(key, val)| qdrant_to_scalar(val).map(|v| (key.clone(), v)))
        .collect();

    serde_json::Value::Object(map)
}

fn qdrant_to_scalar(val: &Value) -> Option<serde_json::Value> {
    match val.kind.as_ref()? {
        Kind::StringValue(s) => Some(serde_json::Value::String(s.clone())),
        Kind::IntegerValue(i) => Some(serde_json::json!(*i)),
        Kind::DoubleValue(f) => Some(serde_json::json!(*f)),
        Kind::BoolValue(b) => Some(serde_json::Value::Bool(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uuid_ids_pass_through() {
        let id = "a9c5f3d2-4b7e-4f7a-9c1d-2e8b5a6f0c3d";
        assert_eq!(uuid_point_id(id), id);
    }

    #[test]
    fn non_uuid_ids_derive_deterministically() {
        let a = uuid_point_id("value-node-legacy-17");
        let b = uuid_point_id("value-node-legacy-17");
        let c = uuid_point_id("value-node-legacy-18");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn payload_conversion_round_trips_scalars() {
        let payload = flatten_payload(&json!({
            "section": "MenstrualHistory",
            "since_year": 2019,
            "on_medication": true,
            "nested": {"dropped": 1}
        }));
        assert_eq!(payload.len(), 3);

        let back = payload_to_json(&payload);
        assert_eq!(back["section"], "MenstrualHistory");
        assert_eq!(back["since_year"], 2019);
        assert_eq!(back["on_medication"], true);
        assert!(back.get("nested").is_none());
    }

    #[test]
    fn raw_patient_ids_are_refused_at_the_boundary() {
        let payload = flatten_payload(&json!({
            "patient_id": "00028",
            "patient_hash": "deadbeef",
        }));
        assert!(!payload.contains_key("patient_id"));
        assert!(payload.contains_key("patient_hash"));
    }
}
