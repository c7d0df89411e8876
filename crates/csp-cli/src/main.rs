//! csp: Slack-driven status page.
//!
//! # Commands
//!
//! - `csp serve [--logs]`: status page + Slack listener + reminder scheduler
//! - `csp remind [--force]`: one-shot pinned-message reminder
//! - `csp status`: show resolved configuration (secrets masked)
//! - `csp render <text>`: run the mrkdwn renderer on some text

mod helpers;
mod http;
mod serve;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use csp_bot::ReminderScanner;
use csp_core::config::load_config;
use csp_page::{ChannelSnapshot, PageBuilder, SnapshotStore};
use csp_slack::SlackClient;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Status page driven by a Slack channel
#[derive(Parser)]
#[command(name = "csp", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.csp/config.json)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the status page and process Slack events
    Serve {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Post the pinned-message reminder now
    Remind {
        /// Include pins younger than the configured minimum age
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show resolved configuration
    Status,

    /// Render Slack mrkdwn to the page's sanitized HTML
    Render {
        /// Text to render
        text: String,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path: Option<PathBuf> = cli.config.as_deref().map(helpers::expand_tilde);

    match cli.command {
        Commands::Serve { logs } => {
            init_logging(logs);
            serve::run(config_path.as_deref()).await
        }
        Commands::Remind { force, logs } => {
            init_logging(logs);
            run_remind(config_path, force).await
        }
        Commands::Status => status::run(config_path.as_deref()),
        Commands::Render { text } => {
            print!("{}", csp_page::mrkdwn::render(&text));
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────
// Remind command
// ─────────────────────────────────────────────

/// Build a fresh snapshot, then scan it once.
async fn run_remind(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config = Arc::new(load_config(config_path.as_deref()));
    helpers::ensure_slack_configured(&config)?;

    let client = SlackClient::from_config(&config.slack);
    let bot_id = client
        .auth_test()
        .await
        .context("auth.test failed, check slack.botToken")?;

    let store = Arc::new(SnapshotStore::new(ChannelSnapshot::placeholder(&config.status)));
    let builder = PageBuilder::new(client.clone(), config.clone(), bot_id.clone(), store.clone());
    let snapshot = builder
        .build()
        .await
        .context("could not read the status channel")?;
    store.publish(snapshot);

    let scanner = ReminderScanner::new(client, config, bot_id, store);
    let count = scanner.scan_and_notify(force).await?;
    info!(pins = count, force, "reminder run finished");

    if count == 0 {
        println!("  {}", "Nothing pinned needs a reminder.".dimmed());
    } else {
        println!("  {} reminded about {} pinned message(s)", "✓".green(), count);
    }
    Ok(())
}

/// Initialize tracing/logging. `RUST_LOG` wins over `--logs`.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("csp=debug,csp_core=debug,csp_slack=debug,csp_page=debug,csp_bot=debug,csp_cron=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
