//! murmur-agent - anonymous message relay daemon
//!
//! Connects to the configured account's streaming feed and processes
//! notifications until stopped.

use std::sync::Arc;

use clap::Parser;
use libmurmur::api::mastodon::MastodonClient;
use libmurmur::api::ApiClient;
use libmurmur::stream::StreamIngestor;
use libmurmur::{Agent, Config, Result};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "murmur-agent")]
#[command(version)]
#[command(about = "Anonymous message relay agent for the Fediverse")]
#[command(long_about = "\
murmur-agent - anonymous message relay daemon

DESCRIPTION:
    murmur-agent is a long-running daemon that listens to a bot account's
    streaming feed. Direct messages addressed to the bot and naming a
    recipient with the ?handle marker are forwarded anonymously to that
    recipient, provided the recipient follows the bot. New followers get
    a welcome message, and replies tagged with a report hashtag are
    escalated to the configured moderators.

USAGE:
    # Run in foreground (logs to stderr)
    murmur-agent

    # Log what would be posted without posting anything
    murmur-agent --dry-run

    # Enable verbose logging
    murmur-agent --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown

CONFIGURATION:
    Configuration file: ~/.config/murmur/config.toml
    Every option can be overridden with a MURMUR_* environment variable,
    e.g. MURMUR_ACCESS_TOKEN, MURMUR_SERVER_URL, MURMUR_MODERATORS.

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
    2 - Authentication error

For more information, visit: https://github.com/murmur-bot/murmur
")]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Log write calls instead of performing them
    #[arg(long)]
    #[arg(help = "Do not post or bookmark anything, log instead")]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libmurmur::logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if cli.dry_run {
        config.dry_run = true;
    }

    let api: Arc<dyn ApiClient> = Arc::new(MastodonClient::from_config(&config)?);
    let bot = api.verify_credentials().await?;
    info!(account = %bot.acct, server = %config.server_url, "authenticated");
    if config.dry_run {
        info!("dry run enabled, nothing will be posted");
    }

    let ingestor = StreamIngestor::new(&config);
    let agent = Agent::new(config, api, bot)?;

    tokio::select! {
        _ = ingestor.run(&agent) => {}
        _ = wait_for_shutdown() => {
            info!("shutdown signal received, stopping");
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            signals.next().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "signal setup failed, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
