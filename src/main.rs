use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use qbit_bridge::bridge::Bridge;
use qbit_bridge::config::Config;
use qbit_bridge::logging;
use qbit_bridge::qbit::QbitClient;
use qbit_bridge::snapshot::SnapshotStore;
use qbit_bridge::state::Context;
use qbit_bridge::telegram::TelegramClient;

// Headroom on top of the long-poll wait so the HTTP client never cuts it short.
const TIMEOUT_SLACK_SECS: u64 = 5;

#[derive(Parser)]
#[command(
    name = "qbit-bridge",
    version,
    about = "Relay magnets and media from a Telegram bot to qBittorrent",
    after_help = "Examples:\n  qbit-bridge\n  qbit-bridge --config ./config.json\n  qbit-bridge --check-config"
)]
struct Cli {
    #[arg(long, help = "Path to the JSON config file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Validate the config and exit")]
    check_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    if cli.check_config {
        println!(
            "Config OK: {} disk(s), {} categor{}, {} allowed user(s).",
            config.disks.len(),
            config.categories.len(),
            if config.categories.len() == 1 { "y" } else { "ies" },
            config.allowed_user_ids.len()
        );
        return Ok(());
    }

    logging::init(&config)?;

    let timeout = Duration::from_secs(config.poll_timeout + TIMEOUT_SLACK_SECS);
    let chat = TelegramClient::new(&config.telegram_api_url, &config.bot_token, timeout)?;
    let daemon = QbitClient::new(&config.qb_url, &config.qb_user, &config.qb_pass, timeout)?;
    let store = SnapshotStore::new(config.state_file.clone());
    info!(state_file = %store.path().display(), qb_url = %config.qb_url, "starting");

    let ctx = Context::new(config, chat, daemon, store)?;
    Bridge::new(ctx).run().await;
    Ok(())
}
