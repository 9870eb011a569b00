//! Watcher configuration: file loading, validation, and secrets.
//!
//! The file is read once at startup. Only [`LiveSettings`] change afterwards,
//! through [`SharedSettings`].

mod file;
mod live;
mod rules;


use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::node::NodeIdentity;

pub use file::{ConfigFile, LogRulesFile};
pub use live::{validate_stagnation_threshold, LiveSettings, SharedSettings};
pub use rules::LogRules;

/// Validation failures that stop the watcher from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no containers configured")]
    NoNodes,
    #[error("container '{0}' is listed more than once")]
    DuplicateNode(String),
    #[error("tx_watch_containers names '{0}', which is not a monitored container")]
    UnknownTxNode(String),
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error(
        "major_grace_period_seconds ({major}) must be greater than grace_period_seconds ({minor})"
    )]
    GraceOrder { minor: u64, major: u64 },
    #[error("stagnation threshold of {minutes} minutes is outside {min}..={max}")]
    StagnationThresholdOutOfRange { minutes: u64, min: u64, max: u64 },
    #[error("invalid pattern in {field}: {source}")]
    InvalidPattern {
        field: &'static str,
        source: regex::Error,
    },
    #[error("{0} needs a capture group for the transaction hash")]
    MissingCaptureGroup(&'static str),
}

/// Messaging secrets, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            telegram_bot_token: non_empty_env("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: non_empty_env("TELEGRAM_CHAT_ID"),
        }
    }

    /// Token and chat id, when both are present.
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token.as_str(), chat.as_str())),
            _ => None,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Reputation check settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReputationSettings {
    pub enabled: bool,
    pub window: usize,
    pub failure_threshold: usize,
}

/// Validated configuration for one watcher process.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub nodes: Vec<NodeIdentity>,
    pub tail_lines: usize,
    pub poll_interval: Duration,
    pub minor_grace: Duration,
    pub major_grace: Duration,
    pub state_query_timeout: Duration,
    pub min_quorum: usize,
    pub warmup: Duration,
    pub stats_endpoint: Option<String>,
    pub reputation: ReputationSettings,
    pub tx_watched: HashSet<String>,
    pub tx_timeout: Duration,
    pub stagnation_alert_enabled: bool,
    pub stagnation_threshold: Duration,
    pub concluded_state: u64,
    pub log_dir: PathBuf,
    pub event_log: PathBuf,
    pub state_file: PathBuf,
    pub log_rules: LogRules,
    pub secrets: Secrets,
}

impl WatcherConfig {
    /// Validate a parsed file and attach secrets.
    pub fn from_file(file: ConfigFile, secrets: Secrets) -> Result<Self, ConfigError> {
        if file.containers.is_empty() {
            return Err(ConfigError::NoNodes);
        }

        let mut seen = HashSet::new();
        for name in &file.containers {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateNode(name.clone()));
            }
        }

        for name in &file.tx_watch_containers {
            if !seen.contains(name.as_str()) {
                return Err(ConfigError::UnknownTxNode(name.clone()));
            }
        }

        for (field, value) in [
            ("check_interval_seconds", file.check_interval_seconds),
            ("grace_period_seconds", file.grace_period_seconds),
            ("state_query_timeout_seconds", file.state_query_timeout_seconds),
            ("tx_timeout_seconds", file.tx_timeout_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue(field));
            }
        }
        if file.min_quorum == 0 {
            return Err(ConfigError::ZeroValue("min_quorum"));
        }
        if file.reputation_check_enabled
            && (file.reputation_check_window == 0 || file.reputation_failure_threshold == 0)
        {
            return Err(ConfigError::ZeroValue(
                "reputation_check_window/reputation_failure_threshold",
            ));
        }

        if file.major_grace_period_seconds <= file.grace_period_seconds {
            return Err(ConfigError::GraceOrder {
                minor: file.grace_period_seconds,
                major: file.major_grace_period_seconds,
            });
        }

        let stagnation_threshold =
            Duration::from_secs(file.stagnation_threshold_minutes.saturating_mul(60));
        validate_stagnation_threshold(stagnation_threshold)?;

        let log_rules = LogRules::compile(&file.log_rules)?;
        let nodes = resolve_identities(&file);

        Ok(Self {
            nodes,
            tail_lines: file.tail_lines,
            poll_interval: Duration::from_secs(file.check_interval_seconds),
            minor_grace: Duration::from_secs(file.grace_period_seconds),
            major_grace: Duration::from_secs(file.major_grace_period_seconds),
            state_query_timeout: Duration::from_secs(file.state_query_timeout_seconds),
            min_quorum: file.min_quorum,
            warmup: Duration::from_secs(file.warmup_seconds),
            stats_endpoint: file
                .stats_endpoint
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            reputation: ReputationSettings {
                enabled: file.reputation_check_enabled,
                window: file.reputation_check_window,
                failure_threshold: file.reputation_failure_threshold,
            },
            tx_watched: file.tx_watch_containers.into_iter().collect(),
            tx_timeout: Duration::from_secs(file.tx_timeout_seconds),
            stagnation_alert_enabled: file.stagnation_alert_enabled,
            stagnation_threshold,
            concluded_state: file.concluded_state,
            log_dir: file.log_dir,
            event_log: file.event_log,
            state_file: file.state_file,
            log_rules,
            secrets,
        })
    }

    /// Initial value of the runtime-mutable slot.
    pub fn live_settings(&self) -> LiveSettings {
        LiveSettings {
            stagnation_alert_enabled: self.stagnation_alert_enabled,
            stagnation_threshold: self.stagnation_threshold,
        }
    }

    pub fn is_tx_watched(&self, node: &NodeIdentity) -> bool {
        self.tx_watched.contains(&node.name)
    }
}

/// Pair each container with its address, dropping malformed addresses.
fn resolve_identities(file: &ConfigFile) -> Vec<NodeIdentity> {
    let pattern = address_pattern();

    for name in file.node_addresses.keys() {
        if !file.containers.contains(name) {
            warn!(node = %name, "address configured for a container that is not monitored");
        }
    }

    file.containers
        .iter()
        .map(|name| {
            let address = file.node_addresses.get(name).and_then(|addr| {
                if pattern.as_ref().is_some_and(|re| re.is_match(addr)) {
                    Some(addr.clone())
                } else {
                    warn!(
                        node = %name,
                        address = %addr,
                        "invalid address format; node will be skipped by the reputation check"
                    );
                    None
                }
            });
            NodeIdentity::new(name.clone(), address)
        })
        .collect()
}

fn address_pattern() -> Option<Regex> {
    Regex::new(r"^0x[a-fA-F0-9]{40}$").ok()
}

/// Parse a config document. TOML when the path ends in `.toml`, JSON otherwise.
pub fn parse_config(path: &Path, content: &str) -> Result<ConfigFile> {
    let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
    if is_toml {
        toml::from_str(content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    } else {
        serde_json::from_str(content)
            .with_context(|| format!("Failed to parse JSON config: {}", path.display()))
    }
}

/// Load, parse, and validate the configuration file, reading secrets from
/// the environment.
pub fn load(path: &Path) -> Result<WatcherConfig> {
    info!(path = %path.display(), "loading configuration");
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let file = parse_config(path, &content)?;
    let config = WatcherConfig::from_file(file, Secrets::from_env())
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    info!(nodes = config.nodes.len(), "configuration loaded");
    Ok(config)
}
