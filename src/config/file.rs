//! On-disk shape of the watcher configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::models::constants::{self, log_rules};

/// Raw configuration document, JSON or TOML.
///
/// Every field has a default so a file only needs to name its containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub containers: Vec<String>,
    pub node_addresses: BTreeMap<String, String>,
    pub tail_lines: usize,
    pub check_interval_seconds: u64,
    pub grace_period_seconds: u64,
    pub major_grace_period_seconds: u64,
    pub state_query_timeout_seconds: u64,
    pub min_quorum: usize,
    pub warmup_seconds: u64,
    #[serde(alias = "reputation_api_base_url")]
    pub stats_endpoint: Option<String>,
    pub reputation_check_enabled: bool,
    pub reputation_check_window: usize,
    pub reputation_failure_threshold: usize,
    pub tx_watch_containers: Vec<String>,
    pub tx_timeout_seconds: u64,
    pub stagnation_alert_enabled: bool,
    pub stagnation_threshold_minutes: u64,
    /// Majority state meaning the session has concluded. Stopped nodes are
    /// restarted while the majority sits here.
    pub concluded_state: u64,
    pub log_dir: PathBuf,
    pub event_log: PathBuf,
    pub state_file: PathBuf,
    pub log_rules: LogRulesFile,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            node_addresses: BTreeMap::new(),
            tail_lines: constants::DEFAULT_TAIL_LINES,
            check_interval_seconds: constants::DEFAULT_CHECK_INTERVAL_SECS,
            grace_period_seconds: constants::DEFAULT_MINOR_GRACE_SECS,
            major_grace_period_seconds: constants::DEFAULT_MAJOR_GRACE_SECS,
            state_query_timeout_seconds: constants::DEFAULT_STATE_QUERY_TIMEOUT_SECS,
            min_quorum: constants::DEFAULT_MIN_QUORUM,
            warmup_seconds: constants::DEFAULT_WARMUP_SECS,
            stats_endpoint: None,
            reputation_check_enabled: false,
            reputation_check_window: constants::DEFAULT_REPUTATION_WINDOW,
            reputation_failure_threshold: constants::DEFAULT_REPUTATION_FAILURE_THRESHOLD,
            tx_watch_containers: Vec::new(),
            tx_timeout_seconds: constants::DEFAULT_TX_TIMEOUT_SECS,
            stagnation_alert_enabled: true,
            stagnation_threshold_minutes: constants::DEFAULT_STAGNATION_THRESHOLD_MINUTES,
            concluded_state: constants::DEFAULT_CONCLUDED_STATE,
            log_dir: PathBuf::from("restart_logs"),
            event_log: PathBuf::from("watcher.log"),
            state_file: PathBuf::from(constants::DEFAULT_STATE_FILE),
            log_rules: LogRulesFile::default(),
        }
    }
}

/// Pattern rules for the log scanner, as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRulesFile {
    pub fatal_patterns: Vec<String>,
    pub failure_pattern: String,
    pub failure_threshold: usize,
    pub failure_window_seconds: u64,
    pub quiet_period_seconds: u64,
    pub success_pattern: String,
    pub tx_submitted_pattern: String,
    pub tx_completed_pattern: String,
}

impl Default for LogRulesFile {
    fn default() -> Self {
        Self {
            fatal_patterns: vec![log_rules::FATAL_TRACEBACK.to_string()],
            failure_pattern: log_rules::PING_FAILURE.to_string(),
            failure_threshold: log_rules::FAILURE_THRESHOLD,
            failure_window_seconds: log_rules::FAILURE_WINDOW_SECS,
            quiet_period_seconds: log_rules::QUIET_PERIOD_SECS,
            success_pattern: log_rules::STATE_LINE.to_string(),
            tx_submitted_pattern: log_rules::TX_SUBMITTED.to_string(),
            tx_completed_pattern: log_rules::TX_COMPLETED.to_string(),
        }
    }
}
