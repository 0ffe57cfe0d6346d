//! Small persisted settings: keyword-trigger opt-outs, the guild registry
//! and the bot's presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::store::{DictNamespace, ListNamespace};

/// Message fragment the bot answers with itself.
pub const TRIGGER_KEYWORD: &str = "咋办";

/// Users who opted out of the keyword reply.
#[derive(Debug)]
pub struct TriggerToggles {
    disabled: ListNamespace,
}

impl TriggerToggles {
    pub fn new(disabled: ListNamespace) -> Self {
        Self { disabled }
    }

    pub fn set_enabled(&self, user_id: &str, enabled: bool) {
        let changed = if enabled {
            self.disabled.remove(user_id)
        } else {
            self.disabled.append(user_id)
        };
        info!(user_id, enabled, changed, "keyword trigger toggled");
    }

    pub fn is_enabled(&self, user_id: &str) -> bool {
        !self.disabled.contains(user_id)
    }

    /// The keyword reply for `text`, if the user has it enabled.
    pub fn reply_for(&self, user_id: &str, text: &str) -> Option<&'static str> {
        (text.contains(TRIGGER_KEYWORD) && self.is_enabled(user_id)).then_some(TRIGGER_KEYWORD)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub id: u64,
    pub name: String,
    pub member_count: u64,
    pub owner_id: u64,
    /// When this record was last written.
    pub joined_at: DateTime<Utc>,
}

const GUILDS_KEY: &str = "guilds";

/// Guilds the bot belongs to, stored as one list under `"guilds"`.
#[derive(Debug)]
pub struct GuildRegistry {
    namespace: DictNamespace,
}

impl GuildRegistry {
    pub fn new(namespace: DictNamespace) -> Self {
        Self { namespace }
    }

    pub fn list(&self) -> Vec<GuildInfo> {
        self.namespace.get_or(GUILDS_KEY, Vec::new())
    }

    /// Insert or replace the entry with the same id.
    pub fn record(&self, guild: GuildInfo) {
        info!(guild_id = guild.id, name = %guild.name, members = guild.member_count, "guild recorded");
        self.modify(|guilds| match guilds.iter_mut().find(|g| g.id == guild.id) {
            Some(existing) => *existing = guild,
            None => guilds.push(guild),
        });
    }

    /// `false` if the guild was not registered.
    pub fn remove(&self, guild_id: u64) -> bool {
        let removed = self.modify(|guilds| {
            let before = guilds.len();
            guilds.retain(|g| g.id != guild_id);
            guilds.len() != before
        });
        if removed {
            info!(guild_id, "guild removed");
        }
        removed
    }

    /// Edit the stored list in one locked read-modify-write.
    fn modify<R>(&self, f: impl FnOnce(&mut Vec<GuildInfo>) -> R) -> R {
        self.namespace.update(GUILDS_KEY, |slot| {
            let mut guilds: Vec<GuildInfo> = serde_json::from_value(slot.take()).unwrap_or_default();
            let out = f(&mut guilds);
            match serde_json::to_value(&guilds) {
                Ok(v) => *slot = v,
                Err(e) => warn!(error = %e, "guild list not serialisable; left empty"),
            }
            out
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub status: String,
    #[serde(default)]
    pub activity_type: String,
    #[serde(default)]
    pub text: String,
}

/// Last presence set by the owner, restored at startup.
#[derive(Debug)]
pub struct StatusStore {
    namespace: DictNamespace,
}

impl StatusStore {
    pub fn new(namespace: DictNamespace) -> Self {
        Self { namespace }
    }

    pub fn get(&self) -> Option<Presence> {
        let status: String = self.namespace.get("status")?;
        Some(Presence {
            status,
            activity_type: self.namespace.get_or("activity_type", String::new()),
            text: self.namespace.get_or("text", String::new()),
        })
    }

    pub fn set(&self, presence: &Presence) {
        self.namespace.extend([
            ("status".to_string(), Value::from(presence.status.as_str())),
            ("activity_type".to_string(), Value::from(presence.activity_type.as_str())),
            ("text".to_string(), Value::from(presence.text.as_str())),
        ]);
        info!(status = %presence.status, activity = %presence.activity_type, "presence saved");
    }
}
