//! Centralized error types for the engine.

use std::time::Duration;
use thiserror::Error;

/// Main error type for engine operations.
///
/// Error payloads carry document identifiers and service names for
/// diagnostics, never raw patient identifiers.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Graph write failed: {0}")]
    GraphWrite(String),

    #[error("Graph read failed: {0}")]
    GraphRead(String),

    #[error("Vector index write failed: {0}")]
    IndexWrite(String),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Query planning failed: {reason} (statement: {statement})")]
    QueryPlan { statement: String, reason: String },

    #[error("Answer synthesis failed: {0}")]
    Synthesis(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Create a graph write error.
    pub fn graph_write(msg: impl Into<String>) -> Self {
        Self::GraphWrite(msg.into())
    }

    /// Create an index write error.
    pub fn index_write(msg: impl Into<String>) -> Self {
        Self::IndexWrite(msg.into())
    }

    /// Create a query-plan error carrying the offending statement.
    pub fn query_plan(statement: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueryPlan {
            statement: statement.into(),
            reason: reason.into(),
        }
    }

    /// Create a synthesis error.
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_plan_error_includes_statement() {
        let err = EngineError::query_plan("MERGE (n) RETURN n", "write clause rejected");
        let msg = err.to_string();
        assert!(msg.contains("MERGE (n) RETURN n"));
        assert!(msg.contains("write clause rejected"));
    }
}
