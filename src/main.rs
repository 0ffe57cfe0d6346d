//! zaban-bot entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Load prompts, build the LLM provider, open the memory system
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Run the console channel until shutdown or EOF

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use zaban_bot::config;
use zaban_bot::error::AppError;
use zaban_bot::llm::providers;
use zaban_bot::logger;
use zaban_bot::prompts::Prompts;
use zaban_bot::subsystems::chat::ChatService;
use zaban_bot::subsystems::comms::CommsState;
use zaban_bot::subsystems::comms::pty::PtyChannel;
use zaban_bot::subsystems::feeds::FeedService;
use zaban_bot::subsystems::memory::MemorySystem;

/// Memory key for the local console user.
const CONSOLE_USER: &str = "console";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        bot_name = %config.bot_name,
        data_dir = %config.data_dir.display(),
        config_dir = %config.config_dir.display(),
        effective_log_level = %effective_log_level,
        llm_provider = %config.llm.provider,
        context_window = config.memory.context_window,
        summary_trigger = config.memory.summary_trigger,
        keep_after_summary = config.memory.keep_after_summary,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "config loaded"
    );

    let prompts = Prompts::load(&config.prompts_dir, &config.bot_name);
    let llm = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;

    let memory = Arc::new(MemorySystem::open(&config, llm.clone(), &prompts)?);
    if let Some(presence) = memory.status().get() {
        info!(status = %presence.status, activity = %presence.activity_type, "stored presence");
    }

    let chat = Arc::new(ChatService::new(memory.clone(), llm, prompts, &config.llm));
    let feeds = Arc::new(FeedService::new(memory.clone(), &config)?);
    let state = Arc::new(CommsState::new(memory.clone(), chat, feeds));

    // Ctrl-C cancels the token; the console watches it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    PtyChannel::new("pty0", CONSOLE_USER, state).run(shutdown.clone()).await?;
    shutdown.cancel();

    {
        use std::io::Write as _;
        println!("\nBye :) ...");
        let _ = std::io::stdout().flush();
    }
    Ok(())
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: zaban-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: {})", config::DEFAULT_CONFIG_PATH);
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug
    //   -vvvv+  → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
