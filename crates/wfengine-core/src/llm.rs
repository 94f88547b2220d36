//! The `LLMProvider` capability (§4.5): a single completion call shared by
//! every AI step kind, backed either by a deterministic mock or a live
//! Anthropic Messages API client. Grounded on the teacher's `XAIClient` in
//! `clients.rs` for the reqwest request/response shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EngineError;

/// What shape of text the caller expects back, so the mock provider can
/// return the fixed sentinel structures §4.5 asks for on JSON-returning
/// kinds instead of the generic `[MOCK] ` echo used for plain text kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseHint {
    Text,
    Sentiment,
    Classification { categories: Vec<String> },
    Extraction,
}

/// A single completion request: a system prompt (the AI step's fixed
/// instructions) and the user content it is applied to (the resolved
/// template).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_content: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub response_hint: ResponseHint,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_content: impl Into<String>) -> Self {
        CompletionRequest {
            system_prompt: system_prompt.into(),
            user_content: user_content.into(),
            max_tokens: 1000,
            temperature: 0.7,
            response_hint: ResponseHint::Text,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_response_hint(mut self, hint: ResponseHint) -> Self {
        self.response_hint = hint;
        self
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, EngineError>;
}

/// Deterministic provider used in tests and whenever no credential is
/// configured. Text-returning kinds get the user content echoed back with
/// a `[MOCK] ` prefix; JSON-returning kinds get a fixed sentinel object so
/// each handler's parse path is still exercised. Simulates ~500ms of
/// provider latency.
pub struct MockLlmProvider;

#[async_trait]
impl LLMProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, EngineError> {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        Ok(match &request.response_hint {
            ResponseHint::Text => format!("[MOCK] {}", request.user_content),
            ResponseHint::Sentiment => {
                json!({"sentiment": "positive", "score": 0.8, "explanation": "mock sentiment analysis"}).to_string()
            }
            ResponseHint::Classification { categories } => {
                let category = categories.first().cloned().unwrap_or_else(|| "positive".to_string());
                json!({"category": category, "confidence": 0.8, "explanation": "mock classification"}).to_string()
            }
            ResponseHint::Extraction => json!({"mock": true, "extracted": request.user_content}).to_string(),
        })
    }
}

/// Live provider backed by `api.anthropic.com/v1/messages`.
pub struct AnthropicLlmProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicLlmProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        AnthropicLlmProvider {
            client,
            api_key,
            model: "claude-3-5-sonnet-latest".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
}

#[async_trait]
impl LLMProvider for AnthropicLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, EngineError> {
        let system_prompt = match &request.response_hint {
            ResponseHint::Text => request.system_prompt.clone(),
            _ => format!("{}\nRespond with JSON only, no surrounding prose.", request.system_prompt),
        };

        let body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": system_prompt,
            "messages": [
                {"role": "user", "content": request.user_content}
            ],
        });

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::LlmError(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::LlmError(format!("anthropic returned {status}: {text}")));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| EngineError::LlmError(format!("failed to parse anthropic response: {e}")))?;

        Ok(parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

/// Resolves the provider to use for a run, per the credential resolution
/// order in §4.5: an explicit environment key wins, then a stored
/// credential, then the mock.
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    pub fn from_env(client: reqwest::Client) -> std::sync::Arc<dyn LLMProvider> {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.is_empty() {
                return std::sync::Arc::new(AnthropicLlmProvider::new(client, key));
            }
        }
        std::sync::Arc::new(MockLlmProvider)
    }

    pub fn from_credential(client: reqwest::Client, api_key: Option<String>) -> std::sync::Arc<dyn LLMProvider> {
        match api_key {
            Some(key) if !key.is_empty() => std::sync::Arc::new(AnthropicLlmProvider::new(client, key)),
            _ => std::sync::Arc::new(MockLlmProvider),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_prefixes_response() {
        let provider = MockLlmProvider;
        let result = provider
            .complete(CompletionRequest::new("summarize", "hello world"))
            .await
            .unwrap();
        assert_eq!(result, "[MOCK] hello world");
    }
}
