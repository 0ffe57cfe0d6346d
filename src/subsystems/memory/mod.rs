//! Memory subsystem: all persisted bot state behind one process-scoped object.
//!
//! Constructed once at startup and shared via `Arc`. Namespace files are
//! split across two directories:
//!
//! ```text
//! {data_dir}/                     {config_dir}/
//! ├── histories.json              ├── roles.json
//! ├── summaries.json              ├── disabled_triggers.json
//! ├── reddit_cache.json           ├── guilds.json
//! ├── reddit_sent_cache.json      └── status_config.json
//! ├── neodb_cache.json
//! └── steam_cache.json
//! ```
//!
//! One user lock registry is shared by conversation memory and the recency
//! set, so every per-user mutation serialises on the same lock.

pub mod cache;
pub mod conversation;
pub mod locks;
pub mod seen;
pub mod settings;
pub mod store;
pub mod summarizer;
pub mod types;

pub use cache::TtlCache;
pub use conversation::{AppendOutcome, ConversationMemory, UserSession};
pub use locks::{KeyedGuard, KeyedLocks};
pub use seen::SeenSet;
pub use settings::{GuildInfo, GuildRegistry, Presence, StatusStore, TriggerToggles};
pub use store::{DictNamespace, ListNamespace};
pub use summarizer::{SummaryOutcome, Summarizer};
pub use types::{CacheEntry, ConversationState, Turn, TurnRole};

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::llm::LlmProvider;
use crate::prompts::Prompts;

/// Central memory system.
#[derive(Debug)]
pub struct MemorySystem {
    user_locks: Arc<KeyedLocks>,
    conversations: ConversationMemory,
    reddit_cache: TtlCache,
    neodb_cache: TtlCache,
    steam_cache: TtlCache,
    reddit_seen: SeenSet,
    triggers: TriggerToggles,
    guilds: GuildRegistry,
    status: StatusStore,
}

impl MemorySystem {
    /// Create both directories if needed and load every namespace.
    pub fn open(config: &Config, llm: LlmProvider, prompts: &Prompts) -> Result<Self, AppError> {
        let data = config.data_dir.as_path();
        let conf = config.config_dir.as_path();
        ensure_dir(data)?;
        ensure_dir(conf)?;

        let user_locks = Arc::new(KeyedLocks::new("user"));
        let summarizer = Summarizer::new(llm, config.llm.summary_model.clone(), prompts.summary.clone());

        let conversations = ConversationMemory::new(
            config.memory.clone(),
            DictNamespace::open("histories", data.join("histories.json")),
            DictNamespace::open("summaries", data.join("summaries.json")),
            DictNamespace::open("roles", conf.join("roles.json")),
            user_locks.clone(),
            summarizer,
        );

        let system = Self {
            conversations,
            reddit_cache: TtlCache::open("reddit", data.join("reddit_cache.json"), config.cache_ttl),
            neodb_cache: TtlCache::open("neodb", data.join("neodb_cache.json"), config.cache_ttl),
            steam_cache: TtlCache::open("steam", data.join("steam_cache.json"), config.cache_ttl),
            reddit_seen: SeenSet::open(data.join("reddit_sent_cache.json"), config.seen_max_entries),
            triggers: TriggerToggles::new(ListNamespace::open(
                "disabled_triggers",
                conf.join("disabled_triggers.json"),
            )),
            guilds: GuildRegistry::new(DictNamespace::open("guilds", conf.join("guilds.json"))),
            status: StatusStore::new(DictNamespace::open("status", conf.join("status_config.json"))),
            user_locks,
        };

        info!(
            data_dir = %data.display(),
            config_dir = %conf.display(),
            "memory system ready"
        );
        Ok(system)
    }

    pub fn conversations(&self) -> &ConversationMemory {
        &self.conversations
    }

    pub fn user_locks(&self) -> &Arc<KeyedLocks> {
        &self.user_locks
    }

    pub fn reddit_cache(&self) -> &TtlCache {
        &self.reddit_cache
    }

    pub fn neodb_cache(&self) -> &TtlCache {
        &self.neodb_cache
    }

    pub fn steam_cache(&self) -> &TtlCache {
        &self.steam_cache
    }

    pub fn reddit_seen(&self) -> &SeenSet {
        &self.reddit_seen
    }

    pub fn triggers(&self) -> &TriggerToggles {
        &self.triggers
    }

    pub fn guilds(&self) -> &GuildRegistry {
        &self.guilds
    }

    pub fn status(&self) -> &StatusStore {
        &self.status
    }
}

fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::Memory(format!("cannot create {}: {e}", dir.display())))
}
