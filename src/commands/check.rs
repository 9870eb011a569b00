use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::config::{self, WatcherConfig};

/// Validate the configuration and print what the watcher would use.
/// Usage: node-watcher check [--config <path>]
pub fn execute(config_path: &Path) -> Result<()> {
    let config = config::load(config_path)?;
    println!(
        "{} {}",
        "Configuration OK:".green().bold(),
        config_path.display()
    );
    print_summary(&config);
    Ok(())
}

fn print_summary(config: &WatcherConfig) {
    println!("\n{}", "Nodes".bold());
    for node in &config.nodes {
        let address = node.address.as_deref().unwrap_or("-");
        let tx = if config.is_tx_watched(node) {
            " [tx watched]".cyan().to_string()
        } else {
            String::new()
        };
        println!("  {} {}{}", node.name, address.dimmed(), tx);
    }

    println!("\n{}", "Timing".bold());
    println!("  poll interval:      {}s", config.poll_interval.as_secs());
    println!("  minor grace:        {}s", config.minor_grace.as_secs());
    println!("  major grace:        {}s", config.major_grace.as_secs());
    println!("  state query limit:  {}s", config.state_query_timeout.as_secs());
    println!("  warm-up:            {}s", config.warmup.as_secs());
    println!("  tx timeout:         {}s", config.tx_timeout.as_secs());
    println!("  min quorum:         {}", config.min_quorum);

    println!("\n{}", "Alerts".bold());
    let live = config.live_settings();
    let enabled = if live.stagnation_alert_enabled {
        "on".green()
    } else {
        "off".yellow()
    };
    println!(
        "  stagnation alert:   {} after {} minutes",
        enabled,
        live.stagnation_threshold_minutes()
    );
    match (&config.stats_endpoint, config.reputation.enabled) {
        (Some(endpoint), true) => println!(
            "  reputation check:   {} ({} failures in last {} tasks)",
            endpoint, config.reputation.failure_threshold, config.reputation.window
        ),
        (None, true) => println!("  reputation check:   {}", "enabled but no stats_endpoint".red()),
        _ => println!("  reputation check:   off"),
    }

    println!("\n{}", "Messaging".bold());
    if config.secrets.telegram().is_some() {
        println!("  telegram:           configured");
    } else {
        println!("  telegram:           {}", "not configured (log only)".yellow());
    }

    println!("\n{}", "Diagnostics".bold());
    println!("  snapshots:          {}", config.log_dir.display());
    println!("  event journal:      {}", config.event_log.display());
    println!("  state file:         {}", config.state_file.display());
}
