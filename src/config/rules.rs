//! Compiled log-scanner rules.

use regex::Regex;
use std::time::Duration;

use super::file::LogRulesFile;
use super::ConfigError;

/// Regexes and counters used by the log scanner, compiled once at load.
#[derive(Debug, Clone)]
pub struct LogRules {
    pub fatal_patterns: Vec<Regex>,
    pub failure_pattern: Regex,
    pub failure_threshold: usize,
    pub failure_window: Duration,
    pub quiet_period: Duration,
    pub success_pattern: Regex,
    /// Capture group 1 is the transaction hash
    pub tx_submitted_pattern: Regex,
    /// Capture group 1 is the transaction hash
    pub tx_completed_pattern: Regex,
}

impl LogRules {
    pub fn compile(file: &LogRulesFile) -> Result<Self, ConfigError> {
        if file.failure_threshold == 0 {
            return Err(ConfigError::ZeroValue("log_rules.failure_threshold"));
        }
        if file.failure_window_seconds == 0 {
            return Err(ConfigError::ZeroValue("log_rules.failure_window_seconds"));
        }

        let fatal_patterns = file
            .fatal_patterns
            .iter()
            .map(|p| compile("log_rules.fatal_patterns", p))
            .collect::<Result<Vec<_>, _>>()?;

        let tx_submitted_pattern =
            compile("log_rules.tx_submitted_pattern", &file.tx_submitted_pattern)?;
        let tx_completed_pattern =
            compile("log_rules.tx_completed_pattern", &file.tx_completed_pattern)?;
        for (field, re) in [
            ("log_rules.tx_submitted_pattern", &tx_submitted_pattern),
            ("log_rules.tx_completed_pattern", &tx_completed_pattern),
        ] {
            if re.captures_len() < 2 {
                return Err(ConfigError::MissingCaptureGroup(field));
            }
        }

        Ok(Self {
            fatal_patterns,
            failure_pattern: compile("log_rules.failure_pattern", &file.failure_pattern)?,
            failure_threshold: file.failure_threshold,
            failure_window: Duration::from_secs(file.failure_window_seconds),
            quiet_period: Duration::from_secs(file.quiet_period_seconds),
            success_pattern: compile("log_rules.success_pattern", &file.success_pattern)?,
            tx_submitted_pattern,
            tx_completed_pattern,
        })
    }
}

fn compile(field: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern { field, source })
}
