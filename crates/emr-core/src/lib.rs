//! # EMR Core
//!
//! Shared foundation for the EMR GraphRAG engine: the structured document
//! model and closed section registry, the typed error taxonomy, content and
//! patient hashing, and engine configuration.

pub mod config;
pub mod document;
pub mod error;
pub mod hash;

pub use config::{EngineConfig, GraphSettings, LlmSettings, SyncSettings, VectorSettings};
pub use document::{Document, FactRow, FactValue, SectionKind, ValueKind};
pub use error::{EngineError, EngineResult};
