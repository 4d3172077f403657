//! Chat completion client for answer synthesis
//! (OpenAI-compatible `/chat/completions` API).

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use emr_core::{EngineError, EngineResult, LlmSettings};

/// Sampling temperature used on the first synthesis attempt.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Chat client shared by the hybrid retriever and the query planner.
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatClient {
    /// Create a new chat client from LLM settings.
    pub fn new(settings: &LlmSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.chat_model.clone(),
            client,
        }
    }

    /// Run one chat completion and return the assistant message content.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> EngineResult<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        if let Some(t) = temperature {
            body["temperature"] = json!(t);
        }

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EngineError::Synthesis(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Synthesis(format!("API error ({}): {}", status, text)));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Synthesis(format!("bad response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngineError::Synthesis("service returned no choices".to_string()))?;

        debug!(chars = content.len(), "Chat completion received");
        Ok(content)
    }

    /// Two-step fallback: some chat models reject explicit sampling
    /// parameters. The first attempt sends the default temperature; a
    /// rejection of that parameter is retried exactly once without it.
    pub async fn complete_with_fallback(&self, system: &str, user: &str) -> EngineResult<String> {
        match self.complete(system, user, Some(DEFAULT_TEMPERATURE)).await {
            Ok(answer) => Ok(answer),
            Err(EngineError::Synthesis(msg)) if should_retry_without_temperature(&msg) => {
                warn!("Synthesis rejected sampling parameter; retrying without temperature");
                self.complete(system, user, None).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Whether a synthesis failure looks like a rejected sampling parameter
/// rather than a transport or service fault.
pub(crate) fn should_retry_without_temperature(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("temperature") || lower.contains("unsupported")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_rejections_trigger_the_fallback() {
        assert!(should_retry_without_temperature(
            "API error (400): 'temperature' is not supported with this model"
        ));
        assert!(should_retry_without_temperature(
            "API error (400): Unsupported value for sampling parameter"
        ));
    }

    #[test]
    fn transport_faults_do_not_trigger_the_fallback() {
        assert!(!should_retry_without_temperature("request failed: connection refused"));
        assert!(!should_retry_without_temperature("API error (500): internal error"));
    }
}
