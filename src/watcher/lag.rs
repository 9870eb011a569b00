//! Per-node lag state machine.
//!
//! Each node sits in one of three tiers relative to the majority:
//!
//! - `None`: state and session both match.
//! - `Minor`: same session, different state. Restarts after the minor grace.
//! - `Major`: different session. Restarts after the (longer) major grace.
//!
//! A minor node whose session diverges escalates to major with a fresh
//! timer. A major node stays major until it fully realigns.
//!
//! When a timer expires the record is reset optimistically and the
//! discarded record is kept aside. If the restart board later shows that
//! no restart happened for the node (runtime failure or warm-up), the
//! record is put back so the next cycle asks again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::board::{BaselineWatch, RestartBoard};
use super::majority::MajoritySnapshot;
use super::state::LagWindow;
use crate::models::node::{NodeIdentity, NodeObservation, StatePair};
use crate::models::restart::{RestartReason, RestartRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LagTier {
    #[default]
    None,
    Minor,
    Major,
}

impl fmt::Display for LagTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LagTier::None => write!(f, "NONE"),
            LagTier::Minor => write!(f, "MINOR"),
            LagTier::Major => write!(f, "MAJOR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLagRecord {
    pub identity: NodeIdentity,
    pub tier: LagTier,
    /// Set while the tier is not `None`
    pub entered_at: Option<DateTime<Utc>>,
    /// Majority the node was last compared against
    pub majority: Option<StatePair>,
}

impl NodeLagRecord {
    fn aligned(identity: NodeIdentity) -> Self {
        Self {
            identity,
            tier: LagTier::None,
            entered_at: None,
            majority: None,
        }
    }

    fn enter(&mut self, tier: LagTier, now: DateTime<Utc>) {
        self.tier = tier;
        self.entered_at = Some(now);
    }
}

pub struct LagDetector {
    minor_grace: Duration,
    major_grace: Duration,
    nodes: Vec<String>,
    records: HashMap<String, NodeLagRecord>,
    /// Records discarded by a restart request that has not been confirmed yet
    pending: HashMap<String, NodeLagRecord>,
    watch: BaselineWatch,
}

impl LagDetector {
    pub fn new<'a>(
        nodes: impl IntoIterator<Item = &'a NodeIdentity>,
        minor_grace: Duration,
        major_grace: Duration,
    ) -> Self {
        Self {
            minor_grace,
            major_grace,
            nodes: nodes.into_iter().map(|n| n.name.clone()).collect(),
            records: HashMap::new(),
            pending: HashMap::new(),
            watch: BaselineWatch::new(),
        }
    }

    pub fn tier(&self, node: &str) -> LagTier {
        self.records
            .get(node)
            .map(|r| r.tier)
            .unwrap_or_default()
    }

    pub fn record(&self, node: &str) -> Option<&NodeLagRecord> {
        self.records.get(node)
    }

    /// Open lag windows, for the state file.
    pub fn windows(&self) -> impl Iterator<Item = (&str, LagWindow)> + '_ {
        self.records
            .iter()
            .filter_map(|(name, record)| match (record.tier, record.entered_at) {
                (LagTier::None, _) | (_, None) => None,
                (tier, Some(entered_at)) => Some((name.as_str(), LagWindow { tier, entered_at })),
            })
    }

    /// Reopen a window saved by a previous run.
    pub fn restore(&mut self, identity: &NodeIdentity, window: LagWindow) {
        if window.tier == LagTier::None || !self.nodes.contains(&identity.name) {
            return;
        }
        let mut record = NodeLagRecord::aligned(identity.clone());
        record.enter(window.tier, window.entered_at);
        self.records.insert(identity.name.clone(), record);
    }

    /// Apply restart outcomes published since the last call.
    pub fn reconcile(&mut self, board: &RestartBoard) {
        for name in &self.nodes {
            let change = self.watch.poll(board, name);
            if change.restarted {
                self.pending.remove(name);
                if let Some(record) = self.records.get_mut(name) {
                    debug!(node = %name, "lag record reset after restart");
                    *record = NodeLagRecord::aligned(record.identity.clone());
                }
            } else if change.not_actuated {
                if let Some(stashed) = self.pending.remove(name) {
                    warn!(
                        node = %name,
                        tier = %stashed.tier,
                        "restart not carried out, restoring lag record"
                    );
                    self.records.insert(name.clone(), stashed);
                }
            }
        }
    }

    /// Compare one observation with the cycle's majority.
    pub fn evaluate(
        &mut self,
        observation: &NodeObservation,
        majority: &MajoritySnapshot,
        now: DateTime<Utc>,
    ) -> Option<RestartRequest> {
        let identity = &observation.identity;
        let name = identity.name.as_str();
        let pair = observation.pair();
        let record = self
            .records
            .entry(name.to_string())
            .or_insert_with(|| NodeLagRecord::aligned(identity.clone()));
        record.majority = Some(majority.pair);

        if pair == majority.pair {
            if record.tier != LagTier::None {
                info!(node = %name, from = %record.tier, "node realigned with majority");
                record.tier = LagTier::None;
                record.entered_at = None;
            }
            self.pending.remove(name);
            return None;
        }

        let session_diverged = observation.session != majority.session();
        match record.tier {
            LagTier::None => {
                let tier = if session_diverged {
                    LagTier::Major
                } else {
                    LagTier::Minor
                };
                info!(node = %name, %tier, node_pair = %pair, majority = %majority.pair, "node diverged");
                record.enter(tier, now);
                return None;
            }
            LagTier::Minor if session_diverged => {
                info!(node = %name, node_pair = %pair, majority = %majority.pair, "session diverged, escalating");
                record.enter(LagTier::Major, now);
                return None;
            }
            LagTier::Minor | LagTier::Major => {}
        }

        let (grace, reason) = match record.tier {
            LagTier::Major => (self.major_grace, RestartReason::LagMajor),
            _ => (self.minor_grace, RestartReason::LagMinor),
        };
        let entered_at = record.entered_at.unwrap_or(now);
        let elapsed = (now - entered_at).to_std().unwrap_or_default();
        if elapsed < grace {
            return None;
        }

        let details = format!(
            "{} tier for {}s: node at {} vs majority {}",
            record.tier,
            elapsed.as_secs(),
            pair,
            majority.pair
        );
        info!(node = %name, %reason, elapsed_secs = elapsed.as_secs(), "lag grace expired");
        let discarded = std::mem::replace(record, NodeLagRecord::aligned(identity.clone()));
        self.pending.insert(name.to_string(), discarded);
        Some(RestartRequest::new(identity.clone(), reason, details, now))
    }
}
