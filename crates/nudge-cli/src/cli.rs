use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use nudge_api::client::ApiClient;
use nudge_api::token::TokenCache;
use nudge_core::config::Config;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::commands;
use crate::render::Renderer;

const TOKEN_ENV_VAR: &str = "NUDGE_SESSION_TOKEN";

#[derive(Parser, Debug)]
#[command(
    name = "nudge",
    version,
    about = "Companion CLI for the nudge task assistant"
)]
pub struct Cli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Config file path (default: the per-user config directory)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Session token from the host chat platform
    #[arg(long = "token")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Active tasks grouped by due status
    List {
        /// Append recently completed tasks as a Completed group
        #[arg(long)]
        all: bool,
    },
    /// Month calendar with task markers (defaults to the current month)
    Cal {
        year: Option<i32>,
        /// Calendar month, 1-12
        month: Option<u32>,
        /// List the tasks due on one day of the month
        #[arg(long)]
        day: Option<u32>,
    },
    /// Archived tasks, most recent first
    Archived {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Clear the archive instead of listing it
        #[arg(long)]
        clear: bool,
    },
    /// Tasks completed since a date (YYYY-MM-DD)
    Completed { since: String },
    /// Create a task
    Add {
        text: String,
        /// Deadline: today / tomorrow / next_week, or a deadline string
        #[arg(long = "due")]
        due: Option<String>,
    },
    /// Mark a task done
    Done { id: i64 },
    /// Reopen a completed task
    Reopen { id: i64 },
    /// Move a task to the archive
    Archive { id: i64 },
    /// Replace a task's text
    Edit { id: i64, text: String },
    /// Reschedule: today / tomorrow / next_week, a deadline string, or "none" to clear
    Move { id: i64, when: String },
    /// Delete a task permanently
    Delete { id: i64 },
    /// Show or set the display timezone
    Timezone { zone: Option<String> },
    /// Reminders that have come due, and what is still scheduled
    Digest,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting nudge CLI");

    let cfg = Config::load(cli.config.as_deref())?;
    let cache = TokenCache::new(cfg.token_path()?);
    let token = resolve_token(cli.token.as_deref(), &cache)?;
    let client = ApiClient::new(cfg.api.base_url.clone(), token, cache)?;
    let mut renderer = Renderer::new(cfg.display.color);

    let now = Utc::now();
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(commands::dispatch(
        &client,
        &cfg,
        &mut renderer,
        cli.command,
        now,
    ))?;

    info!("done");
    Ok(())
}

fn resolve_token(flag: Option<&str>, cache: &TokenCache) -> anyhow::Result<String> {
    if let Some(token) = flag {
        let trimmed = token.trim();
        if !trimmed.is_empty() {
            debug!("using session token from --token");
            return Ok(trimmed.to_string());
        }
    }

    if let Ok(raw) = std::env::var(TOKEN_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            debug!("using session token from environment");
            return Ok(trimmed.to_string());
        }
    }

    cache.load().ok_or_else(|| {
        anyhow!("no session token: pass --token, set {TOKEN_ENV_VAR}, or reuse a cached session")
    })
}

fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
