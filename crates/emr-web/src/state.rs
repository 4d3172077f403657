//! Application state.
//!
//! Long-lived store and service handles are owned here and injected into
//! every handler; no component reaches for global connections.

use std::sync::Arc;

use emr_embedding::VectorIndexer;
use emr_graph::GraphClient;
use emr_retrieval::{GraphPlanner, HybridRetriever};
use emr_sync::Syncer;

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub graph: GraphClient,
    pub indexer: Arc<VectorIndexer>,
    pub retriever: Arc<HybridRetriever>,
    pub planner: Arc<GraphPlanner>,
    pub syncer: Arc<Syncer>,
}

impl AppState {
    pub fn new(
        graph: GraphClient,
        indexer: Arc<VectorIndexer>,
        retriever: Arc<HybridRetriever>,
        planner: Arc<GraphPlanner>,
        syncer: Arc<Syncer>,
    ) -> Self {
        Self {
            graph,
            indexer,
            retriever,
            planner,
            syncer,
        }
    }
}
