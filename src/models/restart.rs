use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::node::NodeIdentity;

/// Why a restart was requested.
///
/// Lag and log reasons come from the detectors; `Manual` is an operator
/// command and bypasses the warm-up window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestartReason {
    /// State diverged from majority past the minor grace period
    LagMinor,
    /// Session diverged from majority past the major grace period
    LagMajor,
    /// A fatal or repeated-failure log signature
    LogCritical,
    /// A submitted transaction never completed
    TxTimeout,
    /// Too many failed tasks reported by the stats endpoint
    ReputationFailure,
    /// Not running while the majority has concluded its session
    InactiveNode,
    /// Requested by the operator
    Manual,
}

impl RestartReason {
    /// Human-readable label used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            RestartReason::LagMinor => "State Deviation",
            RestartReason::LagMajor => "Session Lag",
            RestartReason::LogCritical => "Critical Log Pattern",
            RestartReason::TxTimeout => "Transaction Timeout",
            RestartReason::ReputationFailure => "Reputation Failure",
            RestartReason::InactiveNode => "Inactive Node",
            RestartReason::Manual => "Manual Restart",
        }
    }

    /// Lowercase token used in diagnostic file names.
    pub fn slug(&self) -> &'static str {
        match self {
            RestartReason::LagMinor => "lag_minor",
            RestartReason::LagMajor => "lag_major",
            RestartReason::LogCritical => "log_critical",
            RestartReason::TxTimeout => "tx_timeout",
            RestartReason::ReputationFailure => "reputation_failure",
            RestartReason::InactiveNode => "inactive_node",
            RestartReason::Manual => "manual",
        }
    }
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestartReason::LagMinor => "LAG_MINOR",
            RestartReason::LagMajor => "LAG_MAJOR",
            RestartReason::LogCritical => "LOG_CRITICAL",
            RestartReason::TxTimeout => "TX_TIMEOUT",
            RestartReason::ReputationFailure => "REPUTATION_FAILURE",
            RestartReason::InactiveNode => "INACTIVE_NODE",
            RestartReason::Manual => "MANUAL",
        };
        f.write_str(s)
    }
}

/// A request for the restart orchestrator. Consumed once and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub identity: NodeIdentity,
    pub reason: RestartReason,
    /// Free-form evidence for the operator
    pub details: String,
    pub requested_at: DateTime<Utc>,
}

impl RestartRequest {
    pub fn new(
        identity: NodeIdentity,
        reason: RestartReason,
        details: impl Into<String>,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity,
            reason,
            details: details.into(),
            requested_at,
        }
    }
}
