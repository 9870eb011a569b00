use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config;
use crate::messaging::telegram;
use crate::messaging::{LogNotifier, Notifier};
use crate::runtime::{check_docker_available, ContainerRuntime, DockerCli};
use crate::stats::StatsClient;
use crate::watcher::Watcher;

/// Run the watcher until SIGINT/SIGTERM.
/// Usage: node-watcher run [--config <path>]
pub fn execute(config_path: &Path) -> Result<()> {
    let config = config::load(config_path)?;
    check_docker_available()?;

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(config.tail_lines));

    let (notifier, commands) = match config.secrets.telegram() {
        Some((token, chat_id)) => {
            let (notifier, updates) =
                telegram::connect(token, chat_id).context("Failed to set up Telegram channel")?;
            (Arc::new(notifier) as Arc<dyn Notifier>, Some(updates))
        }
        None => {
            warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set; notifications go to the log only");
            (Arc::new(LogNotifier) as Arc<dyn Notifier>, None)
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let stats = match (&config.stats_endpoint, config.reputation.enabled) {
        (Some(endpoint), true) => Some(StatsClient::new(endpoint)?),
        _ => None,
    };

    let mut watcher = Watcher::new(config, runtime, notifier);
    if let Some(updates) = commands {
        watcher = watcher.with_commands(Box::new(updates));
    }
    if let Some(stats) = stats {
        watcher = watcher.with_stats(Box::new(stats));
    }

    info!(config = %config_path.display(), "starting watcher");
    watcher.run(shutdown)
}
