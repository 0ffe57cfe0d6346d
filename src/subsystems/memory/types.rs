//! Value types shared by the memory subsystem.
//!
//! Field names match the JSON the bot has always written (`role`/`content`
//! turns, `data`/`timestamp` cache entries) so existing namespace files load
//! unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::ChatMessage;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into() }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            TurnRole::User => ChatMessage::user(turn.content.clone()),
            TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
        }
    }
}

/// A cached upstream payload and the wall-clock second it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    /// Seconds since the Unix epoch (fractional).
    pub timestamp: f64,
}

impl CacheEntry {
    pub fn age(&self, now: f64) -> f64 {
        now - self.timestamp
    }

    /// Valid while `now - timestamp < ttl`.
    pub fn is_fresh(&self, now: f64, ttl_secs: f64) -> bool {
        self.age(now) < ttl_secs
    }
}

/// Per-user conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// No turns stored.
    Empty,
    Active,
    /// Summarisation is running for this user.
    PendingSummary,
}

/// Current wall-clock time as fractional epoch seconds.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
