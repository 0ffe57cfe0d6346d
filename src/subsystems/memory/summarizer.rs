//! Summarisation worker: condenses a user's turn log into a synopsis.
//!
//! Holds a clone of the provider plus the model and instruction it should
//! use. It only produces text; writing the summary and truncating history is
//! the caller's job, so a failure here never touches stored state.

use std::time::Duration;

use tracing::{debug, info};

use crate::llm::{ChatMessage, CompletionError, CompletionRequest, LlmProvider};
use super::types::{Turn, TurnRole};

/// Fallback instruction when no prompt file is configured.
pub const DEFAULT_SUMMARY_INSTRUCTION: &str = "Summarise the whole conversation between the user and the \
assistant for use as background context in later conversations. Write in the third person, in general \
terms, without quoting or repeating the original messages and without commentary. Focus on the user's \
behaviour, mood, stylistic preferences and main topics.";

const TRANSCRIPT_HEADER: &str = "Here is the complete conversation history:";

/// Generation limits for one summarisation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryLimits {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl SummaryLimits {
    /// Threshold-triggered summaries.
    pub const AUTO: Self = Self { temperature: 0.3, max_tokens: 500, timeout: Duration::from_secs(60) };
    /// Summaries requested explicitly by the user.
    pub const MANUAL: Self = Self { temperature: 0.3, max_tokens: 1000, timeout: Duration::from_secs(60) };
}

/// Result of a threshold check after an append.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    /// Summary replaced and history truncated to `kept` turns.
    Summarized { kept: usize },
    /// Provider call failed; history and summary are unchanged.
    Failed(CompletionError),
}

#[derive(Debug, Clone)]
pub struct Summarizer {
    llm: LlmProvider,
    model: String,
    instruction: String,
}

impl Summarizer {
    pub fn new(llm: LlmProvider, model: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self { llm, model: model.into(), instruction: instruction.into() }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the provider for a synopsis of `turns`.
    ///
    /// Returns the trimmed summary text. A blank answer is
    /// [`CompletionError::Empty`]. Callers must not pass an empty log.
    pub async fn summarize(
        &self,
        user_id: &str,
        turns: &[Turn],
        limits: SummaryLimits,
    ) -> Result<String, CompletionError> {
        info!(user_id, turns = turns.len(), model = %self.model, "summarising history");

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(self.instruction.clone()),
                ChatMessage::user(format!("{TRANSCRIPT_HEADER}\n\n{}", render_transcript(turns))),
            ],
            temperature: limits.temperature,
            max_tokens: limits.max_tokens,
            timeout: limits.timeout,
        };

        let response = self.llm.complete(request).await?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(CompletionError::Empty);
        }

        debug!(user_id, chars = text.chars().count(), model = %response.model_used, "summary produced");
        Ok(text.to_string())
    }
}

/// One `"User: ..."` / `"Assistant: ..."` line per turn, in order.
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| match t.role {
            TurnRole::User => format!("User: {}", t.content),
            TurnRole::Assistant => format!("Assistant: {}", t.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
