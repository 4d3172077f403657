//! # EMR Graph
//!
//! Neo4j integration for the engine: connection client, schema
//! initialization, the document loader, the content fingerprint store,
//! live schema introspection, and the patient subgraph read.

pub mod client;
pub mod fingerprint;
pub mod introspect;
pub mod loader;
pub mod schema;
pub mod subgraph;

pub use client::{GraphClient, GraphCounts, QUERY_TIMEOUT};
pub use introspect::{schema_summary, SchemaSummary};
pub use loader::{load_document, LoadResult};
pub use schema::initialize_schema;
pub use subgraph::{fetch_patient_graph, GraphEdge, GraphNode, PatientGraph};
