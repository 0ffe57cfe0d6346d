//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or `-f <path>`) relative to the working directory,
//! then applies `ZABAN_DATA_DIR` and `ZABAN_LOG_LEVEL` env overrides.
//! Secrets (`LLM_API_KEY`, `NEODB_ACCESS_TOKEN`) only ever come from env.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Conversation memory tuning (`[memory]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Number of most recent turns sent with each completion request (W).
    pub context_window: usize,
    /// Log length at which summarisation fires (T).
    pub summary_trigger: usize,
    /// Turns kept after a successful summarisation (K).
    pub keep_after_summary: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            summary_trigger: default_summary_trigger(),
            keep_after_summary: default_keep_after_summary(),
        }
    }
}

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"` or `"openai"`).
    pub provider: String,
    pub chat_model: String,
    pub summary_model: String,
    pub translate_model: String,
    pub openai: OpenAiConfig,
}

/// NeoDB catalog search configuration.
#[derive(Debug, Clone)]
pub struct NeoDbConfig {
    pub api_url: String,
    pub timeout_seconds: u64,
}

/// Steam storefront search endpoint (`[steam]`).
#[derive(Debug, Clone)]
pub struct SteamConfig {
    pub api_url: String,
    /// Storefront language for item names (`l=` parameter).
    pub language: String,
    pub timeout_seconds: u64,
}

/// Public Reddit listing endpoint (`[reddit]`).
#[derive(Debug, Clone)]
pub struct RedditConfig {
    /// Base URL; `/r/{subreddit}/hot.json` is appended.
    pub api_url: String,
    pub user_agent: String,
    /// Listing size requested per fetch.
    pub limit: u32,
    pub timeout_seconds: u64,
}

/// Fully-resolved bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Directory for conversation data and caches (already expanded, no `~`).
    pub data_dir: PathBuf,
    /// Directory for user settings namespaces (roles, triggers, guilds, status).
    pub config_dir: PathBuf,
    /// Prompt templates directory.
    pub prompts_dir: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub memory: MemoryConfig,
    pub cache_ttl: Duration,
    pub seen_max_entries: usize,
    pub llm: LlmConfig,
    /// API key from `LLM_API_KEY`; `None` for keyless local models.
    pub llm_api_key: Option<String>,
    pub neodb: NeoDbConfig,
    pub neodb_token: Option<String>,
    pub reddit: RedditConfig,
    pub steam: SteamConfig,
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    bot: RawBot,
    #[serde(default)]
    memory: RawMemory,
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    seen: RawSeen,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    neodb: RawNeoDb,
    #[serde(default)]
    reddit: RawReddit,
    #[serde(default)]
    steam: RawSteam,
}

#[derive(Deserialize)]
struct RawBot {
    name: String,
    data_dir: String,
    #[serde(default = "default_config_dir")]
    config_dir: String,
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(default = "default_context_window")]
    context_window: usize,
    #[serde(default = "default_summary_trigger")]
    summary_trigger: usize,
    #[serde(default = "default_keep_after_summary")]
    keep_after_summary: usize,
}

impl Default for RawMemory {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            summary_trigger: default_summary_trigger(),
            keep_after_summary: default_keep_after_summary(),
        }
    }
}

#[derive(Deserialize)]
struct RawCache {
    #[serde(default = "default_cache_ttl_seconds")]
    ttl_seconds: u64,
}

impl Default for RawCache {
    fn default() -> Self {
        Self { ttl_seconds: default_cache_ttl_seconds() }
    }
}

#[derive(Deserialize)]
struct RawSeen {
    #[serde(default = "default_seen_max_entries")]
    max_entries: usize,
}

impl Default for RawSeen {
    fn default() -> Self {
        Self { max_entries: default_seen_max_entries() }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default = "default_chat_model")]
    chat_model: String,
    #[serde(default = "default_summary_model")]
    summary_model: String,
    #[serde(default = "default_translate_model")]
    translate_model: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            chat_model: default_chat_model(),
            summary_model: default_summary_model(),
            translate_model: default_translate_model(),
            openai: RawOpenAiConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawNeoDb {
    #[serde(default = "default_neodb_api_url")]
    api_url: String,
    #[serde(default = "default_upstream_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawNeoDb {
    fn default() -> Self {
        Self { api_url: default_neodb_api_url(), timeout_seconds: default_upstream_timeout_seconds() }
    }
}

#[derive(Deserialize)]
struct RawSteam {
    #[serde(default = "default_steam_api_url")]
    api_url: String,
    #[serde(default = "default_steam_language")]
    language: String,
    #[serde(default = "default_upstream_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawSteam {
    fn default() -> Self {
        Self {
            api_url: default_steam_api_url(),
            language: default_steam_language(),
            timeout_seconds: default_upstream_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawReddit {
    #[serde(default = "default_reddit_api_url")]
    api_url: String,
    #[serde(default = "default_reddit_user_agent")]
    user_agent: String,
    #[serde(default = "default_reddit_limit")]
    limit: u32,
    #[serde(default = "default_upstream_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawReddit {
    fn default() -> Self {
        Self {
            api_url: default_reddit_api_url(),
            user_agent: default_reddit_user_agent(),
            limit: default_reddit_limit(),
            timeout_seconds: default_upstream_timeout_seconds(),
        }
    }
}

fn default_config_dir() -> String { "config".to_string() }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_context_window() -> usize { 100 }
fn default_summary_trigger() -> usize { 100 }
fn default_keep_after_summary() -> usize { 50 }
fn default_cache_ttl_seconds() -> u64 { 1800 }
fn default_seen_max_entries() -> usize { 20 }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_chat_model() -> String { "gpt-4.1".to_string() }
fn default_summary_model() -> String { "gpt-4.1".to_string() }
fn default_translate_model() -> String { "gpt-4o".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_neodb_api_url() -> String { "https://neodb.social/api/catalog/search".to_string() }
fn default_reddit_api_url() -> String { "https://www.reddit.com".to_string() }
fn default_reddit_user_agent() -> String { concat!("zaban-bot/", env!("CARGO_PKG_VERSION")).to_string() }
fn default_reddit_limit() -> u32 { 50 }
fn default_steam_api_url() -> String { "https://store.steampowered.com/api/storesearch/".to_string() }
fn default_steam_language() -> String { "english".to_string() }
fn default_upstream_timeout_seconds() -> u64 { 20 }

/// Load config from `path` (default `config/default.toml`), then apply
/// env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let data_dir_override = env::var("ZABAN_DATA_DIR").ok();
    let log_level_override = env::var("ZABAN_LOG_LEVEL").ok();
    load_from(
        Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)),
        data_dir_override.as_deref(),
        log_level_override.as_deref(),
    )
}

/// Internal loader. Accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    data_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let b = parsed.bot;
    let memory = MemoryConfig {
        context_window: parsed.memory.context_window,
        summary_trigger: parsed.memory.summary_trigger,
        keep_after_summary: parsed.memory.keep_after_summary,
    };
    validate_memory(&memory)?;

    if parsed.seen.max_entries == 0 {
        return Err(AppError::Config("seen.max_entries must be at least 1".into()));
    }

    let data_dir = expand_home(data_dir_override.unwrap_or(&b.data_dir));
    let log_level = log_level_override.unwrap_or(&b.log_level).to_string();

    Ok(Config {
        bot_name: b.name,
        data_dir,
        config_dir: expand_home(&b.config_dir),
        prompts_dir: expand_home(&b.prompts_dir),
        log_level,
        log_file: b.log_file.as_deref().map(expand_home),
        memory,
        cache_ttl: Duration::from_secs(parsed.cache.ttl_seconds),
        seen_max_entries: parsed.seen.max_entries,
        llm: LlmConfig {
            provider: parsed.llm.provider,
            chat_model: parsed.llm.chat_model,
            summary_model: parsed.llm.summary_model,
            translate_model: parsed.llm.translate_model,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        llm_api_key: env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
        neodb: NeoDbConfig {
            api_url: parsed.neodb.api_url,
            timeout_seconds: parsed.neodb.timeout_seconds,
        },
        neodb_token: env::var("NEODB_ACCESS_TOKEN").ok().filter(|k| !k.is_empty()),
        reddit: RedditConfig {
            api_url: parsed.reddit.api_url,
            user_agent: parsed.reddit.user_agent,
            limit: parsed.reddit.limit,
            timeout_seconds: parsed.reddit.timeout_seconds,
        },
        steam: SteamConfig {
            api_url: parsed.steam.api_url,
            language: parsed.steam.language,
            timeout_seconds: parsed.steam.timeout_seconds,
        },
    })
}

/// Check the window/trigger/keep relationship: `W >= 1`, `T >= W`, `K < T`.
pub fn validate_memory(m: &MemoryConfig) -> Result<(), AppError> {
    if m.context_window == 0 {
        return Err(AppError::Config("memory.context_window must be at least 1".into()));
    }
    if m.summary_trigger < m.context_window {
        return Err(AppError::Config(format!(
            "memory.summary_trigger ({}) must be >= context_window ({})",
            m.summary_trigger, m.context_window
        )));
    }
    if m.keep_after_summary >= m.summary_trigger {
        return Err(AppError::Config(format!(
            "memory.keep_after_summary ({}) must be < summary_trigger ({})",
            m.keep_after_summary, m.summary_trigger
        )));
    }
    Ok(())
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// `Config` for tests: dummy LLM, no API keys, everything under `root`.
impl Config {
    pub fn test_default(root: &Path) -> Self {
        Self {
            bot_name: "test".into(),
            data_dir: root.join("savedata"),
            config_dir: root.join("config"),
            prompts_dir: root.join("prompts"),
            log_level: "info".into(),
            log_file: None,
            memory: MemoryConfig::default(),
            cache_ttl: Duration::from_secs(default_cache_ttl_seconds()),
            seen_max_entries: default_seen_max_entries(),
            llm: LlmConfig {
                provider: "dummy".into(),
                chat_model: "test-chat".into(),
                summary_model: "test-summary".into(),
                translate_model: "test-translate".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    timeout_seconds: 1,
                },
            },
            llm_api_key: None,
            neodb: NeoDbConfig {
                api_url: "http://localhost:0/api/catalog/search".into(),
                timeout_seconds: 1,
            },
            neodb_token: None,
            reddit: RedditConfig {
                api_url: "http://localhost:0".into(),
                user_agent: "zaban-bot-test".into(),
                limit: 50,
                timeout_seconds: 1,
            },
            steam: SteamConfig {
                api_url: "http://localhost:0/api/storesearch/".into(),
                language: "english".into(),
                timeout_seconds: 1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[bot]
name = "test-bot"
data_dir = "~/.zaban"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config_uses_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.bot_name, "test-bot");
        assert_eq!(cfg.memory, MemoryConfig::default());
        assert_eq!(cfg.cache_ttl, Duration::from_secs(1800));
        assert_eq!(cfg.seen_max_entries, 20);
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.config_dir, PathBuf::from("config"));
        assert_eq!(cfg.reddit.limit, 50);
        assert_eq!(cfg.neodb.api_url, "https://neodb.social/api/catalog/search");
        assert_eq!(cfg.neodb.timeout_seconds, 20);
        assert_eq!(cfg.steam.timeout_seconds, 20);
        assert_eq!(cfg.steam.language, "english");
    }

    #[test]
    fn parse_upstream_timeouts() {
        let f = write_toml(&format!(
            "{MINIMAL_TOML}\n[neodb]\ntimeout_seconds = 7\n\n[steam]\ntimeout_seconds = 9\nlanguage = \"schinese\"\n"
        ));
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.neodb.timeout_seconds, 7);
        assert_eq!(cfg.steam.timeout_seconds, 9);
        assert_eq!(cfg.steam.language, "schinese");
        assert_eq!(cfg.reddit.timeout_seconds, 20);
    }

    #[test]
    fn parse_memory_section() {
        let f = write_toml(&format!(
            "{MINIMAL_TOML}\n[memory]\ncontext_window = 10\nsummary_trigger = 20\nkeep_after_summary = 5\n"
        ));
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.memory.context_window, 10);
        assert_eq!(cfg.memory.summary_trigger, 20);
        assert_eq!(cfg.memory.keep_after_summary, 5);
    }

    #[test]
    fn keep_not_below_trigger_rejected() {
        let f = write_toml(&format!(
            "{MINIMAL_TOML}\n[memory]\nsummary_trigger = 50\nkeep_after_summary = 50\ncontext_window = 10\n"
        ));
        let err = load_from(f.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("keep_after_summary"));
    }

    #[test]
    fn trigger_below_window_rejected() {
        let m = MemoryConfig { context_window: 100, summary_trigger: 50, keep_after_summary: 10 };
        assert!(validate_memory(&m).is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.zaban");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".zaban"));
    }

    #[test]
    fn relative_path_unchanged() {
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn env_overrides_applied() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/zaban-data"), Some("debug")).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/zaban-data"));
        assert_eq!(cfg.log_level, "debug");
    }
}
