//! Node identity and the per-cycle observation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a monitored node, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Container name the runtime knows the node by
    pub name: String,
    /// On-chain address, present only when configured and well-formed
    pub address: Option<String>,
}

impl NodeIdentity {
    pub fn new(name: impl Into<String>, address: Option<String>) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The (session, state) pair a node reports.
///
/// Ordering compares the session id first, then the state value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatePair {
    pub session: u64,
    pub state: u64,
}

impl StatePair {
    pub fn new(session: u64, state: u64) -> Self {
        Self { session, state }
    }
}

impl fmt::Display for StatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.session, self.state)
    }
}

/// What a node reported during one poll cycle.
///
/// Observations are replaced wholesale by the next cycle, never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeObservation {
    pub identity: NodeIdentity,
    pub state: u64,
    pub session: u64,
    pub observed_at: DateTime<Utc>,
}

impl NodeObservation {
    pub fn new(identity: NodeIdentity, pair: StatePair, observed_at: DateTime<Utc>) -> Self {
        Self {
            identity,
            state: pair.state,
            session: pair.session,
            observed_at,
        }
    }

    pub fn pair(&self) -> StatePair {
        StatePair::new(self.session, self.state)
    }
}
