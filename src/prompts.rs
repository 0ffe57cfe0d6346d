//! Prompt texts loaded from `config/prompts/`.
//!
//! A missing or unreadable file falls back to a built-in text so the bot
//! still starts. Templates use `{{name}}` placeholders.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::subsystems::memory::summarizer::DEFAULT_SUMMARY_INSTRUCTION;

pub const SYSTEM_FILE: &str = "system.txt";
pub const SUMMARY_FILE: &str = "summary.txt";
pub const TRANSLATE_FILE: &str = "translate.txt";

const DEFAULT_SYSTEM: &str = "You are {{bot_name}}, a friendly assistant in a group chat. \
Answer in the language the user writes in and keep replies short.";

const DEFAULT_TRANSLATE: &str = "You are a professional multilingual translator. Translate the text \
the user provides into the requested language with accurate terms and natural phrasing. Return only \
the translation, without explanations.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub system: String,
    pub summary: String,
    pub translate: String,
}

impl Prompts {
    /// Read all prompt files from `dir`; `{{bot_name}}` in the system prompt
    /// is filled in here.
    pub fn load(dir: &Path, bot_name: &str) -> Self {
        let system = read_or(dir, SYSTEM_FILE, DEFAULT_SYSTEM);
        Self {
            system: render(&system, &[("bot_name", bot_name)]),
            summary: read_or(dir, SUMMARY_FILE, DEFAULT_SUMMARY_INSTRUCTION),
            translate: read_or(dir, TRANSLATE_FILE, DEFAULT_TRANSLATE),
        }
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            system: render(DEFAULT_SYSTEM, &[("bot_name", "zaban")]),
            summary: DEFAULT_SUMMARY_INSTRUCTION.to_string(),
            translate: DEFAULT_TRANSLATE.to_string(),
        }
    }
}

fn read_or(dir: &Path, file: &str, fallback: &str) -> String {
    let path = dir.join(file);
    match fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => {
            debug!(path = %path.display(), "prompt loaded");
            text.trim().to_string()
        }
        Ok(_) => {
            warn!(path = %path.display(), "prompt file empty, using built-in text");
            fallback.to_string()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "prompt file unreadable, using built-in text");
            fallback.to_string()
        }
    }
}

/// Replace every `{{key}}` with its value. Unknown placeholders stay as is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}
