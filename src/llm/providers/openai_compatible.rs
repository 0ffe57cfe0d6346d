//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! All OpenAI wire types are private to this module; callers only see
//! [`CompletionRequest`] / [`CompletionResponse`] / [`CompletionError`].
//! The provider is stateless: history management belongs to the memory
//! subsystem.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{ChatMessage, CompletionError, CompletionRequest, CompletionResponse, ProviderError};

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// `timeout_seconds` is the client-wide ceiling; each request may set a
    /// shorter one through [`CompletionRequest::timeout`].
    pub fn new(
        api_base_url: String,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, api_key })
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        // gpt-5 family models reject an explicit temperature.
        let temperature = if request.model.starts_with("gpt-5") {
            None
        } else {
            Some(request.temperature)
        };

        let payload = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            max_tokens = payload.max_tokens,
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self
            .client
            .post(&self.api_base_url)
            .timeout(request.timeout)
            .json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            if e.is_timeout() {
                CompletionError::Timeout
            } else {
                CompletionError::Unknown(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CompletionError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "LLM provider returned error status");
            return Err(CompletionError::Upstream(format!("HTTP {status}: {body}")));
        }

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            if e.is_timeout() {
                CompletionError::Timeout
            } else {
                CompletionError::Unknown(format!("failed to parse response body: {e}"))
            }
        })?;

        debug!(choices = parsed.choices.len(), model = ?parsed.model, "received LLM response");

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(CompletionError::Empty)?;

        Ok(CompletionResponse {
            text,
            model_used: parsed.model.unwrap_or(request.model),
        })
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
