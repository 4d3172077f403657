//! Embedding HTTP client (OpenAI-compatible `/embeddings` API).

use serde::{Deserialize, Serialize};
use tracing::debug;

use emr_core::{EngineError, EngineResult, LlmSettings};

/// Embedding client shared by the indexer and the hybrid retriever, so
/// queries are embedded with exactly the model used at indexing time.
#[derive(Clone)]
pub struct EmbeddingClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// Create a new embedding client from LLM settings.
    pub fn new(settings: &LlmSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.embed_model.clone(),
            client,
        }
    }

    /// Model identifier, recorded in vector payloads.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate an embedding vector for a single text.
    pub async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EngineError::Embedding("service returned no embedding".to_string()))
    }

    /// Generate embedding vectors for a batch of texts, in input order.
    pub async fn embed_batch(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EngineError::Embedding(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Embedding(format!("API error ({}): {}", status, body)));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Embedding(format!("bad response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(EngineError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        debug!(count = result.data.len(), "Generated embeddings");
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}
