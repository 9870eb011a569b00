//! Wires the detectors, the orchestrator, and the listeners together.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

use super::board::RestartBoard;
use super::poll::PollLoop;
use super::reputation::StatsSource;
use super::restart::RestartOrchestrator;
use super::state::StateStore;
use super::tasks::{spawn_control_listener, spawn_dispatcher, spawn_log_scanner, spawn_tx_watchdog};
use super::tx_watchdog::TransactionWatchdog;
use crate::config::{SharedSettings, WatcherConfig};
use crate::control::RemoteControl;
use crate::diagnostics::DiagnosticsStore;
use crate::messaging::{CommandSource, Notice, Notifier};
use crate::runtime::ContainerRuntime;

pub struct Watcher {
    config: WatcherConfig,
    runtime: Arc<dyn ContainerRuntime>,
    notifier: Arc<dyn Notifier>,
    settings: SharedSettings,
    commands: Option<Box<dyn CommandSource>>,
    stats: Option<Box<dyn StatsSource>>,
}

impl Watcher {
    pub fn new(
        config: WatcherConfig,
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let settings = SharedSettings::new(config.live_settings());
        Self {
            config,
            runtime,
            notifier,
            settings,
            commands: None,
            stats: None,
        }
    }

    /// Serve operator commands from `source`.
    pub fn with_commands(mut self, source: Box<dyn CommandSource>) -> Self {
        self.commands = Some(source);
        self
    }

    /// Use `source` for the reputation check, when enabled in the config.
    pub fn with_stats(mut self, source: Box<dyn StatsSource>) -> Self {
        self.stats = Some(source);
        self
    }

    /// Handle to the live settings the detectors read.
    pub fn settings(&self) -> SharedSettings {
        self.settings.clone()
    }

    /// Run until `shutdown` is set, then stop every task and send the final
    /// notification.
    pub fn run(self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let Watcher {
            config,
            runtime,
            notifier,
            settings,
            commands,
            stats,
        } = self;

        let diagnostics = DiagnosticsStore::new(&config.log_dir, &config.event_log);
        diagnostics
            .ensure_dirs()
            .context("Failed to prepare diagnostics directories")?;

        let board = Arc::new(RestartBoard::new(&config.nodes));
        let warmup = chrono::Duration::from_std(config.warmup)
            .context("warm-up period is out of range")?;
        let warmup_until = Utc::now() + warmup;
        let orchestrator = Arc::new(RestartOrchestrator::new(
            Arc::clone(&runtime),
            Arc::clone(&notifier),
            diagnostics,
            Arc::clone(&board),
            config.tail_lines,
            warmup_until,
        ));

        let (restart_tx, restart_rx) = mpsc::channel();
        let (tx_event_tx, tx_event_rx) = mpsc::channel();

        notifier.send(&Notice::WatcherStarted);
        info!(
            nodes = config.nodes.len(),
            warmup_secs = config.warmup.as_secs(),
            "watcher started"
        );

        let mut handles: Vec<JoinHandle<()>> = vec![spawn_dispatcher(
            orchestrator,
            restart_rx,
            Arc::clone(&shutdown),
        )];

        let rules = Arc::new(config.log_rules.clone());
        for identity in &config.nodes {
            let tx_events = config
                .is_tx_watched(identity)
                .then(|| tx_event_tx.clone());
            handles.push(spawn_log_scanner(
                identity.clone(),
                Arc::clone(&runtime),
                Arc::clone(&rules),
                Arc::clone(&board),
                restart_tx.clone(),
                tx_events,
                Arc::clone(&shutdown),
            ));
        }
        drop(tx_event_tx);

        let watched = config.nodes.iter().filter(|n| config.is_tx_watched(n));
        handles.push(spawn_tx_watchdog(
            TransactionWatchdog::new(watched, config.tx_timeout),
            tx_event_rx,
            Arc::clone(&board),
            restart_tx.clone(),
            Arc::clone(&shutdown),
        ));

        // Long-polling can block for a while; the listener is not joined.
        match commands {
            Some(source) => {
                let control = RemoteControl::new(
                    settings.clone(),
                    config.nodes.clone(),
                    restart_tx.clone(),
                    Arc::clone(&runtime),
                );
                drop(spawn_control_listener(
                    control,
                    source,
                    Arc::clone(&notifier),
                    Arc::clone(&shutdown),
                ));
            }
            None => info!("no command source configured, remote control disabled"),
        }

        let mut poll = PollLoop::new(
            &config,
            Arc::clone(&runtime),
            Arc::clone(&notifier),
            settings,
            Arc::clone(&board),
            restart_tx,
        )
        .with_state(StateStore::open(&config.state_file));
        if let Some(source) = stats {
            poll = poll.with_reputation(&config, source);
        } else if config.reputation.enabled {
            warn!("reputation check enabled but no stats endpoint configured");
        }
        poll.run(&shutdown, config.poll_interval);

        info!("shutting down");
        drop(poll);
        for handle in handles {
            if handle.join().is_err() {
                warn!("watcher task panicked during shutdown");
            }
        }
        notifier.send(&Notice::WatcherStopped);
        info!("watcher stopped");
        Ok(())
    }
}
