//! `reqwest`-backed client for the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Block, CompletionResponse, FinishReason, LlmClient, Message, ToolSchema};
use crate::error::{CocoError, Result};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

pub struct AnthropicClient {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CocoError::ExternalFailure(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn is_retryable(status: reqwest::StatusCode) -> bool {
        status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
    }

    async fn send_once(&self, request: &AnthropicRequest) -> Result<AnthropicResponse> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| CocoError::ExternalFailure(format!("request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CocoError::RateLimited {
                service: "anthropic".to_string(),
                retry_after: Duration::from_secs(30),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CocoError::ExternalFailure(format!("anthropic http {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| CocoError::ExternalFailure(format!("invalid anthropic response: {e}")))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<CompletionResponse> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: system_prompt.to_string(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
        };

        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, ?backoff, "retrying anthropic request");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.send_once(&request).await {
                Ok(response) => return Ok(response.into()),
                Err(CocoError::RateLimited { service, retry_after }) => {
                    return Err(CocoError::RateLimited { service, retry_after });
                }
                Err(e @ CocoError::ExternalFailure(_)) => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| CocoError::ExternalFailure("max retries exceeded".to_string())))
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSchema>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<Block>,
    stop_reason: Option<String>,
}

impl From<AnthropicResponse> for CompletionResponse {
    fn from(value: AnthropicResponse) -> Self {
        let finish_reason = match value.stop_reason.as_deref() {
            Some("tool_use") => FinishReason::ToolUse,
            Some("max_tokens") => FinishReason::MaxTokens,
            Some("end_turn") | Some("stop_sequence") => FinishReason::EndTurn,
            _ => FinishReason::EndTurn,
        };
        CompletionResponse {
            content: value.content,
            finish_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_maps_to_finish_reason() {
        let response = AnthropicResponse {
            content: vec![Block::text("hi")],
            stop_reason: Some("tool_use".to_string()),
        };
        let completion: CompletionResponse = response.into();
        assert_eq!(completion.finish_reason, FinishReason::ToolUse);
    }

    #[test]
    fn missing_stop_reason_defaults_to_end_turn() {
        let response = AnthropicResponse {
            content: vec![],
            stop_reason: None,
        };
        let completion: CompletionResponse = response.into();
        assert_eq!(completion.finish_reason, FinishReason::EndTurn);
    }
}
