//! Dummy LLM provider. Echoes the last user message back prefixed with
//! `[echo]`. Used without an API key and in tests.
//!
//! Clones share state: the call counter and the scripted behaviour, so a
//! test can keep one clone, hand another to the bot and inspect afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::llm::{CompletionError, CompletionRequest, CompletionResponse, MessageRole};

#[derive(Debug, Clone)]
pub enum DummyBehaviour {
    Echo,
    Reply(String),
    Fail(CompletionError),
}

#[derive(Debug, Clone)]
pub struct DummyProvider {
    behaviour: Arc<Mutex<DummyBehaviour>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl DummyProvider {
    pub fn echo() -> Self {
        Self::with_behaviour(DummyBehaviour::Echo)
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self::with_behaviour(DummyBehaviour::Reply(text.into()))
    }

    pub fn failing(error: CompletionError) -> Self {
        Self::with_behaviour(DummyBehaviour::Fail(error))
    }

    fn with_behaviour(behaviour: DummyBehaviour) -> Self {
        Self {
            behaviour: Arc::new(Mutex::new(behaviour)),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long inside every call, to widen interleaving windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_behaviour(&self, behaviour: DummyBehaviour) {
        if let Ok(mut b) = self.behaviour.lock() {
            *b = behaviour;
        }
    }

    /// Number of `complete` calls made so far, across all clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let behaviour = self
            .behaviour
            .lock()
            .map(|b| b.clone())
            .map_err(|_| CompletionError::Unknown("dummy provider state poisoned".into()))?;

        let text = match behaviour {
            DummyBehaviour::Fail(e) => return Err(e),
            DummyBehaviour::Reply(text) => text,
            DummyBehaviour::Echo => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == MessageRole::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                format!("[echo] {last_user}")
            }
        };

        Ok(CompletionResponse { text, model_used: request.model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn request(content: &str) -> CompletionRequest {
        CompletionRequest {
            model: "dummy-model".into(),
            messages: vec![ChatMessage::system("sys"), ChatMessage::user(content)],
            temperature: 0.0,
            max_tokens: 16,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn complete_prefixes_echo() {
        let p = DummyProvider::echo();
        let r = p.complete(request("hello")).await.unwrap();
        assert_eq!(r.text, "[echo] hello");
        assert_eq!(r.model_used, "dummy-model");
    }

    #[tokio::test]
    async fn failing_returns_error_and_counts() {
        let p = DummyProvider::failing(CompletionError::Timeout);
        let observer = p.clone();
        assert_eq!(p.complete(request("x")).await, Err(CompletionError::Timeout));
        assert_eq!(observer.calls(), 1);
    }

    #[tokio::test]
    async fn behaviour_can_be_switched() {
        let p = DummyProvider::failing(CompletionError::RateLimited);
        p.set_behaviour(DummyBehaviour::Reply("ok".into()));
        assert_eq!(p.complete(request("x")).await.unwrap().text, "ok");
    }
}
