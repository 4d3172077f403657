//! Engine configuration.
//!
//! Settings load from an optional TOML file with localhost defaults for
//! every service, then env overrides for the secrets that should not live
//! on disk (`EMR_NEO4J_PASSWORD`, `EMR_QDRANT_API_KEY`, `EMR_LLM_API_KEY`,
//! `EMR_PATIENT_SALT`).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "emr_dev_2026".to_string(),
        }
    }
}

/// Configuration for the Qdrant vector store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub embed_dim: usize,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "patient_facts".to_string(),
            embed_dim: 1536,
        }
    }
}

/// Configuration for the embedding and chat services
/// (OpenAI-compatible HTTP API).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub embed_model: String,
    pub chat_model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            embed_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Configuration for the ingestion syncer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Directory scanned for `*.json` documents each pass.
    pub document_dir: PathBuf,
    /// Seconds between periodic passes.
    pub interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            document_dir: PathBuf::from("data"),
            interval_secs: 60,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub graph: GraphSettings,
    pub vector: VectorSettings,
    pub llm: LlmSettings,
    pub sync: SyncSettings,
    /// Secret salt for the one-way patient-identifier hash. Override the
    /// development default in any real deployment.
    pub patient_salt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph: GraphSettings::default(),
            vector: VectorSettings::default(),
            llm: LlmSettings::default(),
            sync: SyncSettings::default(),
            patient_salt: "emr-dev-salt".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file is absent, then apply env overrides.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)
                    .map_err(|e| EngineError::Config(format!("{}: {}", p.display(), e)))?
            }
            Some(p) => {
                return Err(EngineError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )))
            }
            None => {
                let default_path = Path::new("emr.toml");
                if default_path.exists() {
                    let raw = std::fs::read_to_string(default_path)?;
                    toml::from_str(&raw)
                        .map_err(|e| EngineError::Config(format!("emr.toml: {}", e)))?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("EMR_NEO4J_PASSWORD") {
            self.graph.password = v;
        }
        if let Ok(v) = std::env::var("EMR_QDRANT_API_KEY") {
            self.vector.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("EMR_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("EMR_PATIENT_SALT") {
            self.patient_salt = v;
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if self.patient_salt.is_empty() {
            return Err(EngineError::Config(
                "patient_salt must be set (config file or EMR_PATIENT_SALT)".to_string(),
            ));
        }
        if self.vector.embed_dim == 0 {
            return Err(EngineError::Config("vector.embed_dim must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml_over_defaults() {
        let raw = r#"
            patient_salt = "s3cret"

            [graph]
            uri = "bolt://graph:7687"

            [sync]
            interval_secs = 15
        "#;
        let config: EngineConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.graph.uri, "bolt://graph:7687");
        assert_eq!(config.graph.user, "neo4j");
        assert_eq!(config.sync.interval_secs, 15);
        assert_eq!(config.vector.collection, "patient_facts");
        assert_eq!(config.patient_salt, "s3cret");
    }

    #[test]
    fn empty_salt_fails_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());
        config.patient_salt.clear();
        assert!(config.validate().is_err());
    }
}
