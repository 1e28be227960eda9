//! OpenAI-compatible chat-completion provider
//!
//! Plain `POST {base_url}/chat/completions` with a bearer token, non-streaming.
//! Works against OpenRouter, OpenAI and local OpenAI-compatible servers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{ChatProvider, ChatRequest, Completion, Usage};
use crate::config::Config;
use crate::error::ProviderError;

pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key_env: String,
}

impl OpenAiCompatibleProvider {
    /// Create a provider for `base_url`. The API key is read from `api_key_env` on
    /// every call, so rotating the variable takes effect without a restart.
    pub fn new(
        base_url: &str,
        api_key_env: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key_env: api_key_env.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        Self::new(&config.base_url, &config.api_key_env, config.request_timeout)
    }

    fn api_key(&self) -> Result<String, ProviderError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingCredential(self.api_key_env.clone()))
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<UsageBody>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ErrorBody {
    /// OpenRouter reports some failures in a 200 body with the HTTP code inside
    fn status(&self) -> Option<u16> {
        self.code
            .as_ref()
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
    }
}

/// Map a failed status code and body to a provider error
fn status_error(status: u16, message: String) -> ProviderError {
    match StatusCode::from_u16(status) {
        Ok(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            ProviderError::Auth { status, message }
        }
        Ok(StatusCode::TOO_MANY_REQUESTS) => ProviderError::RateLimited(message),
        Ok(StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT) => ProviderError::Timeout,
        _ => ProviderError::Api { status, message },
    }
}

/// Prefer the structured `error.message` over the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let api_key = self.api_key()?;

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), error_message(&body)));
        }

        let data: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        if let Some(error) = data.error {
            return Err(status_error(error.status().unwrap_or(500), error.message));
        }

        let choice = data.choices.into_iter().next().ok_or_else(|| {
            ProviderError::MalformedResponse("response contained no choices".to_string())
        })?;

        let usage = data
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            model: data.model.unwrap_or_else(|| request.model.clone()),
            usage,
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }
}
