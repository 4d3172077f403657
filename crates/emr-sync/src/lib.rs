//! # EMR Sync
//!
//! The ingestion syncer: periodic and on-demand passes that diff content
//! fingerprints and re-ingest only changed documents, graph first, vectors
//! second, fingerprint last.

pub mod syncer;

pub use syncer::{run_periodic, SyncReport, Syncer};
