//! # EMR Retrieval
//!
//! The engine's two query strategies: hybrid retrieval (vector similarity
//! fused with graph context expansion) and graph-mode query planning
//! (schema-constrained Cypher generation), plus the shared synthesis
//! client with its sampling-parameter fallback.

pub mod hybrid;
pub mod planner;
pub mod synthesis;

pub use hybrid::{HybridAnswer, HybridRetriever, INSUFFICIENT_DATA_ANSWER, TOP_K};
pub use planner::{GraphAnswer, GraphPlanner, PlanStep};
pub use synthesis::{ChatClient, DEFAULT_TEMPERATURE};
