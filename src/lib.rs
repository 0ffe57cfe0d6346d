//! zaban-bot: session-state and caching core of a conversational bot.
//!
//! Per-user conversation memory with automatic summarisation, TTL caches for
//! upstream listings, a bounded per-user recency set and keyed locks, all
//! persisted as JSON namespace files. The binary wires them to a console
//! channel.

pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod prompts;
pub mod subsystems;
