//! Chat commands over conversation memory.
//!
//! Every handler that reads and then writes a user's state runs inside one
//! [`UserSession`](crate::subsystems::memory::UserSession), so the user lock
//! covers the whole read-call-write sequence. Replies are plain text; errors
//! carry a typed cause and the channel decides how to show them.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::AppError;
use crate::llm::{ChatMessage, CompletionError, CompletionRequest, LlmProvider};
use crate::prompts::{self, Prompts};
use crate::subsystems::memory::{MemorySystem, SummaryOutcome, Turn};

const CALL_TIMEOUT: Duration = Duration::from_secs(60);

const TRANSLATE_REQUEST: &str = "Translate the following into {{lang}}:\n\n{{text}}";

pub struct ChatService {
    memory: Arc<MemorySystem>,
    llm: LlmProvider,
    prompts: Prompts,
    chat_model: String,
    translate_model: String,
}

impl ChatService {
    pub fn new(memory: Arc<MemorySystem>, llm: LlmProvider, prompts: Prompts, config: &LlmConfig) -> Self {
        Self {
            memory,
            llm,
            prompts,
            chat_model: config.chat_model.clone(),
            translate_model: config.translate_model.clone(),
        }
    }

    /// Answer `prompt` with the user's memory as context.
    ///
    /// Both turns are recorded only after the provider answered, so a failed
    /// call leaves memory untouched.
    pub async fn ask(&self, user_id: &str, prompt: &str) -> Result<String, AppError> {
        let session = self.memory.conversations().session(user_id).await;
        let pending = Turn::user(prompt);
        let messages = session.build_messages(&self.prompts.system, Some(&pending));
        debug!(user_id, messages = messages.len(), "ask: context built");

        let reply = self.complete(&self.chat_model, messages, 0.7).await.map_err(|e| {
            warn!(user_id, error = %e, "ask: completion failed");
            e
        })?;

        let outcome = session.append_exchange(prompt, &reply).await;
        if let Some(SummaryOutcome::Failed(e)) = outcome.summary {
            warn!(user_id, error = %e, "ask: summary deferred to next exchange");
        }

        info!(user_id, history = session.history().len(), "ask: reply sent");
        Ok(reply)
    }

    /// Stateless translation; memory is not read or written.
    pub async fn translate(&self, user_id: &str, lang: &str, text: &str) -> Result<String, AppError> {
        let request = prompts::render(TRANSLATE_REQUEST, &[("lang", lang), ("text", text)]);
        let messages = vec![ChatMessage::system(self.prompts.translate.clone()), ChatMessage::user(request)];
        let reply = self.complete(&self.translate_model, messages, 0.5).await?;
        info!(user_id, lang, "translation done");
        Ok(reply)
    }

    /// Summarise the whole history now, without truncating it.
    pub async fn summarize(&self, user_id: &str) -> Result<String, AppError> {
        let session = self.memory.conversations().session(user_id).await;
        if session.history().is_empty() {
            return Ok("There is no history yet, so there is nothing to summarise.".into());
        }
        session.summarize_now().await?;
        Ok("Summary updated. Use /summarycheck to read it.".into())
    }

    pub fn summary_check(&self, user_id: &str) -> String {
        match self.memory.conversations().summary(user_id) {
            Some(text) => format!("Your conversation summary:\n\n{text}"),
            None => "There is no summary yet.".into(),
        }
    }

    pub async fn set_role(&self, user_id: &str, role: &str) -> String {
        let role = role.trim();
        if role.is_empty() {
            return "Tell me the role to use, e.g. /setrole a grumpy pirate".into();
        }
        self.memory.conversations().session(user_id).await.set_role(role);
        "Role profile saved.".into()
    }

    pub fn role_check(&self, user_id: &str) -> String {
        match self.memory.conversations().role(user_id) {
            Some(role) => format!("Your current role profile:\n\n{role}"),
            None => "You have no custom role profile. Set one with /setrole.".into(),
        }
    }

    pub async fn reset_role(&self, user_id: &str) -> String {
        if self.memory.conversations().session(user_id).await.clear_role() {
            info!(user_id, "role profile cleared");
            "Role profile cleared; back to the default style.".into()
        } else {
            "You have no custom role profile; the default style is already in use.".into()
        }
    }

    /// Forget history, summary and role profile.
    pub async fn reset(&self, user_id: &str) -> String {
        self.memory.conversations().session(user_id).await.reset();
        "History, summary and role profile cleared.".into()
    }

    pub fn set_trigger(&self, user_id: &str, enabled: bool) -> String {
        self.memory.triggers().set_enabled(user_id, enabled);
        if enabled {
            "Keyword replies are on.".into()
        } else {
            "Keyword replies are off.".into()
        }
    }

    /// Reply the bot sends when a plain message contains the keyword.
    pub fn keyword_reply(&self, user_id: &str, text: &str) -> Option<&'static str> {
        self.memory.triggers().reply_for(user_id, text)
    }

    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
    ) -> Result<String, CompletionError> {
        let response = self
            .llm
            .complete(CompletionRequest {
                model: model.to_string(),
                messages,
                temperature,
                max_tokens: 1000,
                timeout: CALL_TIMEOUT,
            })
            .await?;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(CompletionError::Empty);
        }
        debug!(model = %response.model_used, "completion ok");
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::providers::dummy::{DummyBehaviour, DummyProvider};
    use crate::subsystems::memory::TurnRole;
    use tempfile::TempDir;

    fn service(tmp: &TempDir, dummy: &DummyProvider) -> (ChatService, Arc<MemorySystem>) {
        let cfg = Config::test_default(tmp.path());
        let llm = LlmProvider::Dummy(dummy.clone());
        let prompts = Prompts::default();
        let memory = Arc::new(MemorySystem::open(&cfg, llm.clone(), &prompts).unwrap());
        (ChatService::new(memory.clone(), llm, prompts, &cfg.llm), memory)
    }

    #[tokio::test]
    async fn ask_records_both_turns() {
        let tmp = TempDir::new().unwrap();
        let dummy = DummyProvider::echo();
        let (chat, memory) = service(&tmp, &dummy);

        let reply = chat.ask("u", "hello").await.unwrap();
        assert_eq!(reply, "[echo] hello");
        let history = memory.conversations().history("u");
        assert_eq!(history, vec![Turn::user("hello"), Turn::assistant("[echo] hello")]);
        assert_eq!(history[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn failed_ask_leaves_memory_untouched() {
        let tmp = TempDir::new().unwrap();
        let dummy = DummyProvider::failing(CompletionError::RateLimited);
        let (chat, memory) = service(&tmp, &dummy);

        let err = chat.ask("u", "hello").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(CompletionError::RateLimited)));
        assert!(err.user_message().contains("rate limited"));
        assert!(memory.conversations().history("u").is_empty());
    }

    #[tokio::test]
    async fn blank_reply_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let dummy = DummyProvider::reply("  ");
        let (chat, memory) = service(&tmp, &dummy);
        assert!(matches!(chat.ask("u", "x").await, Err(AppError::Upstream(CompletionError::Empty))));
        assert!(memory.conversations().history("u").is_empty());
    }

    #[tokio::test]
    async fn translate_does_not_touch_memory() {
        let tmp = TempDir::new().unwrap();
        let dummy = DummyProvider::echo();
        let (chat, memory) = service(&tmp, &dummy);
        let out = chat.translate("u", "French", "good morning").await.unwrap();
        assert!(out.contains("French"));
        assert!(out.ends_with("good morning"));
        assert!(memory.conversations().history("u").is_empty());
    }

    #[tokio::test]
    async fn summary_commands() {
        let tmp = TempDir::new().unwrap();
        let dummy = DummyProvider::echo();
        let (chat, _memory) = service(&tmp, &dummy);

        assert!(chat.summarize("u").await.unwrap().contains("no history"));
        assert_eq!(dummy.calls(), 0);
        assert_eq!(chat.summary_check("u"), "There is no summary yet.");

        chat.ask("u", "I like tea").await.unwrap();
        dummy.set_behaviour(DummyBehaviour::Reply("likes tea".into()));
        chat.summarize("u").await.unwrap();
        assert!(chat.summary_check("u").ends_with("likes tea"));
    }

    #[tokio::test]
    async fn role_and_reset_commands() {
        let tmp = TempDir::new().unwrap();
        let dummy = DummyProvider::echo();
        let (chat, memory) = service(&tmp, &dummy);

        assert!(chat.role_check("u").contains("no custom role"));
        assert!(chat.reset_role("u").await.contains("no custom role"));
        chat.set_role("u", " pirate ").await;
        assert!(chat.role_check("u").ends_with("pirate"));
        assert!(chat.reset_role("u").await.contains("cleared"));

        chat.set_role("u", "pirate").await;
        chat.ask("u", "hi").await.unwrap();
        chat.reset("u").await;
        assert!(memory.conversations().history("u").is_empty());
        assert_eq!(memory.conversations().role("u"), None);
    }

    #[tokio::test]
    async fn trigger_toggle_controls_keyword_reply() {
        let tmp = TempDir::new().unwrap();
        let dummy = DummyProvider::echo();
        let (chat, _memory) = service(&tmp, &dummy);
        assert!(chat.keyword_reply("u", "咋办").is_some());
        chat.set_trigger("u", false);
        assert!(chat.keyword_reply("u", "咋办").is_none());
        chat.set_trigger("u", true);
        assert!(chat.keyword_reply("u", "咋办").is_some());
    }
}
