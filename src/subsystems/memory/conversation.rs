//! Per-user conversation memory.
//!
//! Three namespaces back it: `histories` (user id → turn list), `summaries`
//! (user id → text) and `roles` (user id → role profile). Every mutation goes
//! through a [`UserSession`], which holds the user's keyed lock for its whole
//! lifetime, so appends from two commands never interleave and a threshold
//! crossing triggers at most one summarisation.
//!
//! After each append the full log length is compared with the trigger `T`;
//! at `len >= T` the summariser runs inline and, on success, the summary is
//! overwritten and the log cut to its last `K` turns. On failure nothing
//! changes and the next append retries. A question/answer exchange is one
//! append of two turns, so it checks the threshold once.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::error::AppError;
use crate::llm::ChatMessage;
use super::locks::{KeyedGuard, KeyedLocks};
use super::store::DictNamespace;
use super::summarizer::{SummaryLimits, SummaryOutcome, Summarizer};
use super::types::{ConversationState, Turn};

const ROLE_HEADER: &str = "[The user's custom role setting follows; take it into account:]";
const SUMMARY_HEADER: &str = "[Background information about me, for your reference]";

/// What an append did.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    /// Log length after the append and any truncation.
    pub history_len: usize,
    /// Set when the append reached the trigger threshold.
    pub summary: Option<SummaryOutcome>,
}

#[derive(Debug)]
pub struct ConversationMemory {
    config: MemoryConfig,
    histories: DictNamespace,
    summaries: DictNamespace,
    roles: DictNamespace,
    locks: Arc<KeyedLocks>,
    summarizer: Summarizer,
    pending: Mutex<HashSet<String>>,
}

impl ConversationMemory {
    pub fn new(
        config: MemoryConfig,
        histories: DictNamespace,
        summaries: DictNamespace,
        roles: DictNamespace,
        locks: Arc<KeyedLocks>,
        summarizer: Summarizer,
    ) -> Self {
        info!(
            users = histories.len(),
            summaries = summaries.len(),
            roles = roles.len(),
            window = config.context_window,
            trigger = config.summary_trigger,
            keep = config.keep_after_summary,
            "conversation memory loaded"
        );
        Self {
            config,
            histories,
            summaries,
            roles,
            locks,
            summarizer,
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Wait for the user's lock and open a session on it.
    pub async fn session(&self, user_id: &str) -> UserSession<'_> {
        let guard = self.locks.acquire(user_id).await;
        UserSession { memory: self, user_id: user_id.to_string(), _guard: guard }
    }

    // Read-only views. Safe without the lock; they may observe a state
    // between two mutations of a running session.

    pub fn history(&self, user_id: &str) -> Vec<Turn> {
        self.histories.get_or(user_id, Vec::new())
    }

    /// The last `W` turns of the user's log, in order.
    pub fn windowed_context(&self, user_id: &str) -> Vec<Turn> {
        let mut log = self.history(user_id);
        let skip = log.len().saturating_sub(self.config.context_window);
        log.drain(..skip);
        log
    }

    pub fn summary(&self, user_id: &str) -> Option<String> {
        self.summaries.get(user_id)
    }

    pub fn role(&self, user_id: &str) -> Option<String> {
        self.roles.get(user_id)
    }

    pub fn state(&self, user_id: &str) -> ConversationState {
        let pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if pending.contains(user_id) {
            ConversationState::PendingSummary
        } else if self.history(user_id).is_empty() {
            ConversationState::Empty
        } else {
            ConversationState::Active
        }
    }

    fn set_pending(&self, user_id: &str, on: bool) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if on {
            pending.insert(user_id.to_string());
        } else {
            pending.remove(user_id);
        }
    }
}

/// Exclusive access to one user's memory. Dropping it releases the lock.
pub struct UserSession<'a> {
    memory: &'a ConversationMemory,
    user_id: String,
    _guard: KeyedGuard,
}

impl UserSession<'_> {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn history(&self) -> Vec<Turn> {
        self.memory.history(&self.user_id)
    }

    pub fn windowed_context(&self) -> Vec<Turn> {
        self.memory.windowed_context(&self.user_id)
    }

    pub fn state(&self) -> ConversationState {
        self.memory.state(&self.user_id)
    }

    pub fn summary(&self) -> Option<String> {
        self.memory.summary(&self.user_id)
    }

    pub fn role(&self) -> Option<String> {
        self.memory.role(&self.user_id)
    }

    pub fn set_role(&self, role: &str) {
        self.memory.roles.set(&self.user_id, role);
        info!(user_id = %self.user_id, "role profile set");
    }

    /// `false` when no role was set.
    pub fn clear_role(&self) -> bool {
        self.memory.roles.delete(&self.user_id)
    }

    pub async fn append_user_turn(&self, text: &str) -> AppendOutcome {
        self.append([Turn::user(text)]).await
    }

    pub async fn append_assistant_turn(&self, text: &str) -> AppendOutcome {
        self.append([Turn::assistant(text)]).await
    }

    /// Appends a user turn and its reply with a single persist and a single
    /// threshold check.
    pub async fn append_exchange(&self, user: &str, assistant: &str) -> AppendOutcome {
        self.append([Turn::user(user), Turn::assistant(assistant)]).await
    }

    async fn append(&self, turns: impl IntoIterator<Item = Turn>) -> AppendOutcome {
        let mut log = self.history();
        log.extend(turns);
        self.memory.histories.set(&self.user_id, &log);

        let trigger = self.memory.config.summary_trigger;
        if log.len() < trigger {
            return AppendOutcome { history_len: log.len(), summary: None };
        }

        debug!(user_id = %self.user_id, len = log.len(), trigger, "summary threshold reached");
        let outcome = self.compact(log).await;
        AppendOutcome { history_len: self.history().len(), summary: Some(outcome) }
    }

    async fn compact(&self, mut log: Vec<Turn>) -> SummaryOutcome {
        let memory = self.memory;
        memory.set_pending(&self.user_id, true);
        let result = memory.summarizer.summarize(&self.user_id, &log, SummaryLimits::AUTO).await;
        memory.set_pending(&self.user_id, false);

        match result {
            Ok(text) => {
                memory.summaries.set(&self.user_id, &text);
                let keep = memory.config.keep_after_summary;
                let cut = log.len().saturating_sub(keep);
                log.drain(..cut);
                memory.histories.set(&self.user_id, &log);
                info!(user_id = %self.user_id, kept = log.len(), "history summarised and truncated");
                SummaryOutcome::Summarized { kept: log.len() }
            }
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "summarisation failed; history left as is");
                SummaryOutcome::Failed(e)
            }
        }
    }

    /// Summarise on request. History is not truncated.
    pub async fn summarize_now(&self) -> Result<String, AppError> {
        let log = self.history();
        if log.is_empty() {
            return Err(AppError::Memory("no history to summarise".into()));
        }

        let memory = self.memory;
        memory.set_pending(&self.user_id, true);
        let result = memory.summarizer.summarize(&self.user_id, &log, SummaryLimits::MANUAL).await;
        memory.set_pending(&self.user_id, false);

        let text = result.map_err(|e| {
            warn!(user_id = %self.user_id, error = %e, "manual summary failed");
            e
        })?;
        memory.summaries.set(&self.user_id, &text);
        info!(user_id = %self.user_id, "manual summary stored");
        Ok(text)
    }

    /// Drop history, summary and role profile.
    pub fn reset(&self) {
        let memory = self.memory;
        let history = memory.histories.delete(&self.user_id);
        let summary = memory.summaries.delete(&self.user_id);
        let role = memory.roles.delete(&self.user_id);
        info!(user_id = %self.user_id, history, summary, role, "conversation reset");
    }

    /// Messages for one completion call.
    ///
    /// System prompt (with the role profile appended when set), the stored
    /// summary as a background user message, then the last `W` turns of the
    /// log extended by `pending`.
    pub fn build_messages(&self, system_prompt: &str, pending: Option<&Turn>) -> Vec<ChatMessage> {
        let system = match self.role() {
            Some(role) if !role.trim().is_empty() => format!("{system_prompt}\n\n{ROLE_HEADER}\n{role}"),
            _ => system_prompt.to_string(),
        };

        let mut messages = vec![ChatMessage::system(system)];
        if let Some(summary) = self.summary() {
            messages.push(ChatMessage::user(format!("{SUMMARY_HEADER}\n{summary}")));
        }

        let mut log = self.history();
        log.extend(pending.cloned());
        let skip = log.len().saturating_sub(self.memory.config.context_window);
        messages.extend(log[skip..].iter().map(ChatMessage::from));
        messages
    }
}
