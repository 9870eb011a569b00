//! Pattern matching over a node's log stream.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;

use super::tx_watchdog::TxEvent;
use crate::config::LogRules;

/// What a single log line means to the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSignal {
    /// Restart now, no grace period
    Critical { details: String },
    Tx(TxEvent),
}

/// Per-node scanner state. Owned by that node's scanner task.
pub struct LogScanner {
    rules: Arc<LogRules>,
    /// Timestamps of failures inside the current window, oldest first
    failures: VecDeque<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
}

impl LogScanner {
    pub fn new(rules: Arc<LogRules>) -> Self {
        Self {
            rules,
            failures: VecDeque::new(),
            last_failure: None,
        }
    }

    /// Failures currently counted toward the threshold.
    pub fn pending_failures(&self) -> usize {
        self.failures.len()
    }

    /// Forget all counted failures.
    pub fn reset(&mut self) {
        self.failures.clear();
        self.last_failure = None;
    }

    /// Classify one line.
    ///
    /// Fatal patterns win over everything else. Completion is checked before
    /// submission since completion lines often carry the same hash.
    pub fn observe(&mut self, line: &str, now: DateTime<Utc>) -> Option<LogSignal> {
        let rules = Arc::clone(&self.rules);

        if let Some(pattern) = rules.fatal_patterns.iter().find(|p| p.is_match(line)) {
            self.reset();
            return Some(LogSignal::Critical {
                details: format!("fatal pattern `{}`: {}", pattern.as_str(), line.trim()),
            });
        }

        if let Some(hash) = capture_hash(&rules.tx_completed_pattern, line) {
            return Some(LogSignal::Tx(TxEvent::Completed { hash }));
        }
        if let Some(hash) = capture_hash(&rules.tx_submitted_pattern, line) {
            return Some(LogSignal::Tx(TxEvent::Submitted { hash }));
        }

        if rules.failure_pattern.is_match(line) {
            return self.count_failure(&rules, now);
        }

        if rules.success_pattern.is_match(line) {
            self.reset();
        }
        None
    }

    fn count_failure(&mut self, rules: &LogRules, now: DateTime<Utc>) -> Option<LogSignal> {
        if let Some(last) = self.last_failure {
            if exceeds(now, last, rules.quiet_period) {
                self.failures.clear();
            }
        }
        while let Some(&first) = self.failures.front() {
            if exceeds_strictly(now, first, rules.failure_window) {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        self.failures.push_back(now);
        self.last_failure = Some(now);

        if self.failures.len() < rules.failure_threshold {
            return None;
        }
        let count = self.failures.len();
        let span = self
            .failures
            .front()
            .map(|first| (now - *first).num_seconds())
            .unwrap_or_default();
        self.reset();
        Some(LogSignal::Critical {
            details: format!(
                "{count} failures matching `{}` within {span}s",
                rules.failure_pattern.as_str()
            ),
        })
    }
}

/// First capture group that took part in the match. Alternations put the
/// hash in different groups.
fn capture_hash(pattern: &regex::Regex, line: &str) -> Option<String> {
    let caps = pattern.captures(line)?;
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().to_lowercase())
}

fn elapsed(now: DateTime<Utc>, since: DateTime<Utc>) -> std::time::Duration {
    (now - since).to_std().unwrap_or_default()
}

fn exceeds(now: DateTime<Utc>, since: DateTime<Utc>, limit: std::time::Duration) -> bool {
    !limit.is_zero() && elapsed(now, since) >= limit
}

fn exceeds_strictly(now: DateTime<Utc>, since: DateTime<Utc>, limit: std::time::Duration) -> bool {
    elapsed(now, since) > limit
}
