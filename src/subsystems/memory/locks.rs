//! Keyed lock registry: one async mutex per logical id.
//!
//! A lock is created on first request for an id and reused for the rest of
//! the process; entries are never removed. The registry map itself sits
//! behind a short-lived `std::sync::Mutex`, so two tasks asking for a new id
//! at the same time always end up with the same lock.
//!
//! Waiters are served in FIFO order (`tokio::sync::Mutex` is fair), so for a
//! cache source the first caller fetches and the rest see its result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Exclusive hold on one id. Released on drop.
pub type KeyedGuard = OwnedMutexGuard<()>;

#[derive(Debug)]
pub struct KeyedLocks {
    scope: String,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    /// `scope` only labels log lines (`"user"`, `"reddit"`, ...).
    pub fn new(scope: impl Into<String>) -> Self {
        Self { scope: scope.into(), locks: Mutex::new(HashMap::new()) }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The lock for `id`, created if absent.
    pub fn handle(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(id.to_string())
            .or_insert_with(|| {
                trace!(scope = %self.scope, id, "creating keyed lock");
                Arc::new(AsyncMutex::new(()))
            })
            .clone()
    }

    /// Wait for exclusive hold on `id`.
    pub async fn acquire(&self, id: &str) -> KeyedGuard {
        let lock = self.handle(id);
        trace!(scope = %self.scope, id, "acquiring keyed lock");
        lock.lock_owned().await
    }

    /// Take `id` only if nobody holds it right now.
    pub fn try_acquire(&self, id: &str) -> Option<KeyedGuard> {
        self.handle(id).try_lock_owned().ok()
    }

    /// Number of ids seen so far.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
