//! # EMR Embedding
//!
//! Vector side of the engine: the embedding HTTP client, the Qdrant store
//! wrapper, and the indexing pipeline that flattens graph facts into
//! retrievable, privacy-preserving vector records.

pub mod embedder;
pub mod indexer;
pub mod store;

pub use embedder::EmbeddingClient;
pub use indexer::{IndexReport, VectorIndexer};
pub use store::{FactPoint, VectorHit, VectorStore};
