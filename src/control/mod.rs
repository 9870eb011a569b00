//! Remote control surface.
//!
//! Turns operator messages into reads and writes of the shared live
//! settings, manual restart requests, and log excerpts. Invalid input is
//! rejected with a message and never changes state.

mod command;


use anyhow::Result;
use chrono::Utc;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{ConfigError, SharedSettings};
use crate::messaging::{escape_html, CommandSource, Notice, Notifier};
use crate::models::constants::command_logs;
use crate::models::node::NodeIdentity;
use crate::models::restart::{RestartReason, RestartRequest};
use crate::runtime::ContainerRuntime;

pub use command::{parse, Command};

/// Why a command was not carried out. `Display` is the reply text.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{0}")]
    Usage(&'static str),
    #[error("'{0}' is not a positive whole number of minutes")]
    InvalidMinutes(String),
    #[error("{0}")]
    Rejected(#[from] ConfigError),
    #[error("'{0}' is not a monitored node")]
    UnknownNode(String),
    #[error("could not read logs for {node}: {reason}")]
    LogsUnavailable { node: String, reason: String },
    #[error("restart queue is closed; the watcher is shutting down")]
    QueueClosed,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub monitored: usize,
    pub stagnation_enabled: bool,
    pub threshold_minutes: u64,
}

impl StatusReport {
    fn render(&self) -> String {
        format!(
            "<b>Monitored nodes</b>: {}\n\
             <b>Stagnation alert</b>: {}\n\
             <b>Stagnation threshold</b>: {} minutes",
            self.monitored,
            if self.stagnation_enabled { "ON" } else { "OFF" },
            self.threshold_minutes
        )
    }
}

pub struct RemoteControl {
    settings: SharedSettings,
    nodes: Vec<NodeIdentity>,
    restarts: Sender<RestartRequest>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl RemoteControl {
    pub fn new(
        settings: SharedSettings,
        nodes: Vec<NodeIdentity>,
        restarts: Sender<RestartRequest>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            settings,
            nodes,
            restarts,
            runtime,
        }
    }

    pub fn status(&self) -> StatusReport {
        let live = self.settings.snapshot();
        StatusReport {
            monitored: self.nodes.len(),
            stagnation_enabled: live.stagnation_alert_enabled,
            threshold_minutes: live.stagnation_threshold_minutes(),
        }
    }

    pub fn set_stagnation_enabled(&self, enabled: bool) {
        self.settings.set_stagnation_enabled(enabled);
        info!(enabled, "stagnation alert toggled");
    }

    pub fn set_stagnation_threshold(&self, minutes: u64) -> Result<(), CommandError> {
        let threshold = Duration::from_secs(minutes.saturating_mul(60));
        self.settings.set_stagnation_threshold(threshold)?;
        info!(minutes, "stagnation threshold updated");
        Ok(())
    }

    /// Run a parsed command and produce the reply body.
    pub fn execute(&self, command: Command) -> Result<String, CommandError> {
        match command {
            Command::Help => Ok(Notice::Help.render()),
            Command::Status => Ok(self.status().render()),
            Command::Stagnation(enabled) => {
                self.set_stagnation_enabled(enabled);
                Ok(format!(
                    "Stagnation alert is now <b>{}</b>.",
                    if enabled { "ON" } else { "OFF" }
                ))
            }
            Command::StagnationTimer(minutes) => {
                self.set_stagnation_threshold(minutes)?;
                Ok(format!(
                    "Stagnation alert threshold set to <b>{minutes} minutes</b>."
                ))
            }
            Command::Restart(node) => {
                let identity = self.identity(&node)?;
                let request = RestartRequest::new(
                    identity.clone(),
                    RestartReason::Manual,
                    "requested by operator",
                    Utc::now(),
                );
                self.restarts
                    .send(request)
                    .map_err(|_| CommandError::QueueClosed)?;
                Ok(format!(
                    "Restart of <code>{}</code> requested.",
                    escape_html(&node)
                ))
            }
            Command::Logs { node, lines } => {
                let identity = self.identity(&node)?;
                let logs = self
                    .runtime
                    .snapshot_logs(identity, lines)
                    .map_err(|e| CommandError::LogsUnavailable {
                        node: node.clone(),
                        reason: format!("{e:#}"),
                    })?;
                Ok(format!(
                    "Last {lines} lines of <code>{}</code>:\n<pre>{}</pre>",
                    escape_html(&node),
                    escape_html(tail_chars(&logs, command_logs::MAX_REPLY_CHARS))
                ))
            }
        }
    }

    /// Parse and run one inbound message.
    pub fn handle_text(&self, text: &str) -> Notice {
        let result = parse(text).and_then(|command| match command {
            Command::Help => Ok(None),
            other => self.execute(other).map(Some),
        });
        match result {
            Ok(Some(text)) => Notice::CommandReply { text },
            Ok(None) => Notice::Help,
            Err(CommandError::Unknown(raw)) => {
                info!(command = %raw, "unknown command");
                Notice::UnknownCommand
            }
            Err(e) => {
                warn!(error = %e, "command rejected");
                Notice::CommandRejected {
                    text: e.to_string(),
                }
            }
        }
    }

    /// Serve commands until `keep_running` returns false.
    pub fn listen(
        &self,
        source: &mut dyn CommandSource,
        notifier: &dyn Notifier,
        keep_running: impl Fn() -> bool,
        retry_delay: Duration,
    ) {
        while keep_running() {
            match source.poll_commands() {
                Ok(texts) => {
                    for text in texts {
                        notifier.send(&self.handle_text(&text));
                    }
                }
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "command polling failed");
                    sleep_while(&keep_running, retry_delay);
                }
            }
        }
    }

    fn identity(&self, node: &str) -> Result<&NodeIdentity, CommandError> {
        self.nodes
            .iter()
            .find(|n| n.name == node)
            .ok_or_else(|| CommandError::UnknownNode(node.to_string()))
    }
}

/// The last `max` characters of `text`, cut on a char boundary.
fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    let start = text
        .char_indices()
        .nth(skip)
        .map_or(text.len(), |(idx, _)| idx);
    &text[start..]
}

fn sleep_while(keep_running: &impl Fn() -> bool, total: Duration) {
    let slice = Duration::from_millis(200);
    let mut waited = Duration::ZERO;
    while waited < total && keep_running() {
        std::thread::sleep(slice);
        waited += slice;
    }
}
