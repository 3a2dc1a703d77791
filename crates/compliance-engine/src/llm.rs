//! Language-model backend
//!
//! [`LanguageModel`] is the only seam through which checkers and refinement
//! stages reach a model. [`HttpLanguageModel`] talks to an OpenAI-compatible
//! chat completions endpoint and owns the retry policy for transient
//! failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Requested shape of the completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// Ask the backend for a JSON object. Callers must still tolerate
    /// malformed output.
    Json,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        format: ResponseFormat,
    ) -> Result<String, ModelError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint
pub struct HttpLanguageModel {
    client: reqwest::Client,
    config: ModelConfig,
}

impl HttpLanguageModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        if config.api_url.trim().is_empty() {
            return Err(ModelError::Configuration("LLM_API_URL is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn attempt(&self, body: &CompletionRequest<'_>) -> Result<String, ModelError> {
        let mut request = self.client.post(&self.config.api_url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Request(format!("undecodable completion: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ModelError::EmptyResponse)
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        format: ResponseFormat,
    ) -> Result<String, ModelError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ModelError::Configuration(
                "model calls must run inside the server runtime".to_string(),
            ));
        }

        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        all_messages.push(ChatMessage {
            role: Role::System,
            content: system_prompt.to_string(),
        });
        all_messages.extend_from_slice(messages);

        let body = CompletionRequest {
            model: &self.config.model,
            messages: all_messages,
            temperature: self.config.temperature,
            response_format: match format {
                ResponseFormat::Json => Some(serde_json::json!({ "type": "json_object" })),
                ResponseFormat::Text => None,
            },
        };

        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0;
        loop {
            match self.attempt(&body).await {
                Ok(content) => {
                    debug!("Completion received ({} chars)", content.len());
                    return Ok(content);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Model call failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt,
                        self.config.max_retries + 1,
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let body = CompletionRequest {
            model: "m",
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.0,
            response_format: Some(serde_json::json!({ "type": "json_object" })),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_text_format_omits_response_format() {
        let body = CompletionRequest {
            model: "m",
            messages: vec![],
            temperature: 0.0,
            response_format: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_empty_url_is_rejected() {
        let config = ModelConfig {
            api_url: " ".to_string(),
            ..ModelConfig::default()
        };
        assert!(matches!(
            HttpLanguageModel::new(config),
            Err(ModelError::Configuration(_))
        ));
    }

    #[test]
    fn test_outside_runtime_fails_fast() {
        let model = HttpLanguageModel::new(ModelConfig::default()).unwrap();
        let result = futures::executor::block_on(model.complete("sys", &[], ResponseFormat::Text));
        assert!(matches!(result, Err(ModelError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_request_error() {
        let model = HttpLanguageModel::new(ModelConfig {
            api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            max_retries: 0,
            ..ModelConfig::default()
        })
        .unwrap();
        let result = model.complete("sys", &[ChatMessage::user("x")], ResponseFormat::Json).await;
        assert!(matches!(result, Err(ModelError::Request(_))));
    }
}
