//! Text-completion collaborator.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! Every call is atomic from the caller's point of view: it either yields a
//! full [`CompletionResponse`] or one typed [`CompletionError`].

pub mod providers;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// One completion call: `complete(model, messages, temperature, maxTokens, timeout)`.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub text: String,
    /// Model name reported by the provider.
    pub model_used: String,
}

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("rate limited by provider")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("provider error: {0}")]
    Upstream(String),
    #[error("unknown error: {0}")]
    Unknown(String),
    /// Provider answered without any usable text.
    #[error("empty response")]
    Empty,
}

impl CompletionError {
    /// Friendly text for the end user. The detailed error goes to the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            CompletionError::RateLimited => "the model is busy right now (rate limited), please try again later",
            CompletionError::Timeout => "the request timed out, please try again",
            CompletionError::Upstream(_) => "the model provider returned an error, please try again later",
            CompletionError::Unknown(_) => "something unexpected went wrong, please try again later",
            CompletionError::Empty => "the model did not return anything",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider setup failed: {0}")]
    Setup(String),
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new `complete` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
}

impl LlmProvider {
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(request).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(request).await,
        }
    }
}
