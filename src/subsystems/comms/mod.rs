//! Comms: turns channel input into command handler calls.
//!
//! Channels only deal in lines of text. [`parse_command`] maps a line to a
//! [`Command`] and [`CommsState::handle`] runs it against the chat and feed
//! services, returning the reply lines to print.

pub mod pty;

use std::sync::Arc;

use tracing::{debug, warn};

use chrono::Utc;

use crate::error::AppError;
use crate::subsystems::chat::ChatService;
use crate::subsystems::feeds::neodb::{self, CATEGORIES};
use crate::subsystems::feeds::steam::{self, REGIONS};
use crate::subsystems::feeds::{CUTE_SUBREDDITS, FeedService, cute_subreddit};
use crate::subsystems::memory::{GuildInfo, MemorySystem, Presence};

const HELP: &str = "\
/ask <text>               ask with your conversation memory (plain text works too)
/translate <lang> <text>  translate text
/summary                  summarise your conversation now
/summarycheck             show your summary
/setrole <text>           set your role profile
/rolecheck                show your role profile
/resetrole                clear your role profile
/reset                    forget history, summary and role
/trigger on|off           keyword replies on or off
/neodb [book|movie|tv|album] <title>
/steam [cn|us|jp|hk|my|ca|eu|ru|tr|ar] <game>
/aww [subreddit]          a cute picture you have not seen yet
/status [online|idle|dnd|invisible [playing|watching|listening] [text]]
/guild list | join <id> <members> <owner_id> <name> | leave <id>
/help                     this text";

const STATUSES: &[&str] = &["online", "idle", "dnd", "invisible"];
const ACTIVITIES: &[&str] = &["playing", "watching", "listening"];

const GUILD_USAGE: &str = "usage: /guild list | join <id> <members> <owner_id> <name> | leave <id>";

/// Maximum search hits shown per reply.
const HITS_SHOWN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Translate { lang: String, text: String },
    Summary,
    SummaryCheck,
    SetRole(String),
    RoleCheck,
    ResetRole,
    Reset,
    Trigger(bool),
    NeoDb { category: Option<String>, query: String },
    Steam { region: Option<String>, term: String },
    /// Canonical subreddit name, or `None` for a random one.
    Aww(Option<String>),
    /// Show the stored presence, or replace it.
    Status(Option<Presence>),
    GuildList,
    GuildJoin { id: u64, member_count: u64, owner_id: u64, name: String },
    GuildLeave(u64),
    Help,
    /// Malformed or unknown input, with the text to show back.
    Invalid(String),
}

/// Parse one input line. Text without a leading `/` is an [`Command::Ask`].
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Ask(line.to_string());
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name.to_lowercase().as_str() {
        "ask" if !args.is_empty() => Command::Ask(args.to_string()),
        "ask" => Command::Invalid("usage: /ask <text>".into()),
        "translate" => match args.split_once(char::is_whitespace) {
            Some((lang, text)) if !text.trim().is_empty() => {
                Command::Translate { lang: lang.to_string(), text: text.trim().to_string() }
            }
            _ => Command::Invalid("usage: /translate <lang> <text>".into()),
        },
        "summary" => Command::Summary,
        "summarycheck" => Command::SummaryCheck,
        "setrole" => Command::SetRole(args.to_string()),
        "rolecheck" => Command::RoleCheck,
        "resetrole" => Command::ResetRole,
        "reset" => Command::Reset,
        "trigger" => match args.to_lowercase().as_str() {
            "on" => Command::Trigger(true),
            "off" => Command::Trigger(false),
            _ => Command::Invalid("usage: /trigger on|off".into()),
        },
        "neodb" => parse_neodb(args),
        "steam" => parse_steam(args),
        "aww" if args.is_empty() => Command::Aww(None),
        "aww" => match cute_subreddit(args) {
            Some(name) => Command::Aww(Some(name.to_string())),
            None => Command::Invalid(format!("unknown subreddit; choose one of: {}", CUTE_SUBREDDITS.join(", "))),
        },
        "status" => parse_status(args),
        "guild" => parse_guild(args),
        "help" => Command::Help,
        other => Command::Invalid(format!("unknown command /{other}; try /help")),
    }
}

fn parse_neodb(args: &str) -> Command {
    let (first, rest) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    let first_lower = first.to_lowercase();
    let (category, query) = if CATEGORIES.contains(&first_lower.as_str()) {
        (Some(first_lower), rest.trim())
    } else {
        (None, args)
    };
    if query.is_empty() {
        return Command::Invalid("usage: /neodb [book|movie|tv|album] <title>".into());
    }
    Command::NeoDb { category, query: query.to_string() }
}

fn parse_steam(args: &str) -> Command {
    let (first, rest) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    let (region, term) = match REGIONS.iter().find(|r| r.eq_ignore_ascii_case(first)) {
        Some(region) if !rest.trim().is_empty() => (Some(region.to_string()), rest.trim()),
        _ => (None, args),
    };
    if term.is_empty() {
        return Command::Invalid("usage: /steam [region] <game>".into());
    }
    Command::Steam { region, term: term.to_string() }
}

fn parse_status(args: &str) -> Command {
    if args.is_empty() {
        return Command::Status(None);
    }
    let mut words = args.splitn(3, char::is_whitespace);
    let status = words.next().unwrap_or_default().to_lowercase();
    if !STATUSES.contains(&status.as_str()) {
        return Command::Invalid(format!("status must be one of: {}", STATUSES.join(", ")));
    }
    let (activity_type, text) = match words.next().map(str::to_lowercase) {
        None => (String::new(), String::new()),
        Some(kind) if ACTIVITIES.contains(&kind.as_str()) => {
            (kind, words.next().unwrap_or_default().trim().to_string())
        }
        Some(_) => return Command::Invalid(format!("activity must be one of: {}", ACTIVITIES.join(", "))),
    };
    Command::Status(Some(Presence { status, activity_type, text }))
}

fn parse_guild(args: &str) -> Command {
    let mut words = args.split_whitespace();
    match words.next().map(str::to_lowercase).as_deref() {
        Some("list") => Command::GuildList,
        Some("leave") => match words.next().and_then(|id| id.parse().ok()) {
            Some(id) => Command::GuildLeave(id),
            None => Command::Invalid(GUILD_USAGE.into()),
        },
        Some("join") => {
            let numbers: Vec<u64> = words.by_ref().take(3).filter_map(|w| w.parse().ok()).collect();
            let name = words.collect::<Vec<_>>().join(" ");
            match numbers[..] {
                [id, member_count, owner_id] if !name.is_empty() => {
                    Command::GuildJoin { id, member_count, owner_id, name }
                }
                _ => Command::Invalid(GUILD_USAGE.into()),
            }
        }
        _ => Command::Invalid(GUILD_USAGE.into()),
    }
}

/// Services shared by every channel.
pub struct CommsState {
    memory: Arc<MemorySystem>,
    chat: Arc<ChatService>,
    feeds: Arc<FeedService>,
}

impl CommsState {
    pub fn new(memory: Arc<MemorySystem>, chat: Arc<ChatService>, feeds: Arc<FeedService>) -> Self {
        Self { memory, chat, feeds }
    }

    /// Run one input line for `user_id` and return the reply lines.
    pub async fn handle(&self, user_id: &str, line: &str) -> Vec<String> {
        let command = parse_command(line);
        debug!(user_id, ?command, "command parsed");

        // Only plain chat lines can fire the keyword reply.
        let mut replies = Vec::new();
        if !line.trim_start().starts_with('/') {
            if let Some(keyword) = self.chat.keyword_reply(user_id, line) {
                replies.push(keyword.to_string());
            }
        }

        match self.run(user_id, command).await {
            Ok(reply) => replies.push(reply),
            Err(e) => {
                warn!(user_id, error = %e, "command failed");
                replies.push(format!("error: {}", e.user_message()));
            }
        }
        replies
    }

    async fn run(&self, user_id: &str, command: Command) -> Result<String, AppError> {
        let chat = &self.chat;
        Ok(match command {
            Command::Ask(text) => chat.ask(user_id, &text).await?,
            Command::Translate { lang, text } => chat.translate(user_id, &lang, &text).await?,
            Command::Summary => chat.summarize(user_id).await?,
            Command::SummaryCheck => chat.summary_check(user_id),
            Command::SetRole(role) => chat.set_role(user_id, &role).await,
            Command::RoleCheck => chat.role_check(user_id),
            Command::ResetRole => chat.reset_role(user_id).await,
            Command::Reset => chat.reset(user_id).await,
            Command::Trigger(on) => chat.set_trigger(user_id, on),
            Command::NeoDb { category, query } => {
                let items = self.feeds.neodb_search(&query, category.as_deref()).await?;
                let mut lines: Vec<String> = items.iter().take(HITS_SHOWN).map(neodb::describe).collect();
                if items.len() > HITS_SHOWN {
                    lines.push(format!("... and {} more", items.len() - HITS_SHOWN));
                }
                lines.join("\n")
            }
            Command::Aww(subreddit) => {
                let (subreddit, post) = self.feeds.aww(user_id, subreddit.as_deref()).await?;
                let media = post.video_url().unwrap_or(&post.url).to_string();
                format!("{}\nfrom r/{subreddit}: {}\n{media}", post.title, post.post_link())
            }
            Command::Steam { region, term } => {
                let items = self.feeds.steam_search(&term, region.as_deref()).await?;
                let mut lines: Vec<String> = items.iter().take(HITS_SHOWN).map(steam::SteamItem::describe).collect();
                if items.len() > HITS_SHOWN {
                    lines.push(format!("... and {} more", items.len() - HITS_SHOWN));
                }
                lines.join("\n")
            }
            Command::Status(None) => match self.memory.status().get() {
                Some(p) => describe_presence(&p),
                None => "No presence stored.".into(),
            },
            Command::Status(Some(presence)) => {
                self.memory.status().set(&presence);
                format!("Presence saved: {}", describe_presence(&presence))
            }
            Command::GuildList => {
                let guilds = self.memory.guilds().list();
                if guilds.is_empty() {
                    "No guilds registered.".into()
                } else {
                    guilds
                        .iter()
                        .map(|g| format!("{} {} ({} members, owner {})", g.id, g.name, g.member_count, g.owner_id))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Command::GuildJoin { id, member_count, owner_id, name } => {
                self.memory.guilds().record(GuildInfo { id, name, member_count, owner_id, joined_at: Utc::now() });
                format!("Guild {id} recorded.")
            }
            Command::GuildLeave(id) => {
                if self.memory.guilds().remove(id) {
                    format!("Guild {id} removed.")
                } else {
                    format!("Guild {id} is not registered.")
                }
            }
            Command::Help => HELP.to_string(),
            Command::Invalid(msg) => msg,
        })
    }
}

fn describe_presence(p: &Presence) -> String {
    match (p.activity_type.is_empty(), p.text.is_empty()) {
        (true, _) => p.status.clone(),
        (false, true) => format!("{} ({})", p.status, p.activity_type),
        (false, false) => format!("{} ({} {})", p.status, p.activity_type, p.text),
    }
}
