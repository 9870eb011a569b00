//! Outstanding-transaction timers for watched nodes.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::board::{BaselineWatch, RestartBoard};
use crate::models::node::NodeIdentity;
use crate::models::restart::{RestartReason, RestartRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    Submitted { hash: String },
    Completed { hash: String },
}

/// A transaction event seen in a watched node's log.
#[derive(Debug, Clone)]
pub struct TxNotice {
    pub identity: NodeIdentity,
    pub event: TxEvent,
    pub at: DateTime<Utc>,
}

/// Tracks every outstanding transaction independently. Timers are keyed
/// by node and hash; an expiry fires once and drops only that timer.
pub struct TransactionWatchdog {
    timeout: Duration,
    identities: HashMap<String, NodeIdentity>,
    outstanding: HashMap<String, HashMap<String, DateTime<Utc>>>,
    watch: BaselineWatch,
}

impl TransactionWatchdog {
    pub fn new<'a>(watched: impl IntoIterator<Item = &'a NodeIdentity>, timeout: Duration) -> Self {
        Self {
            timeout,
            identities: watched
                .into_iter()
                .map(|n| (n.name.clone(), n.clone()))
                .collect(),
            outstanding: HashMap::new(),
            watch: BaselineWatch::new(),
        }
    }

    pub fn apply(&mut self, notice: TxNotice) {
        let node = notice.identity.name;
        if !self.identities.contains_key(&node) {
            return;
        }
        match notice.event {
            TxEvent::Submitted { hash } => {
                debug!(node = %node, tx = %hash, "transaction submitted");
                // A resubmission keeps the original start time.
                self.outstanding
                    .entry(node)
                    .or_default()
                    .entry(hash)
                    .or_insert(notice.at);
            }
            TxEvent::Completed { hash } => {
                if let Some(timers) = self.outstanding.get_mut(&node) {
                    if timers.remove(&hash).is_some() {
                        debug!(node = %node, tx = %hash, "transaction completed");
                    }
                }
            }
        }
    }

    /// Timers still running for a node.
    pub fn outstanding(&self, node: &str) -> usize {
        self.outstanding.get(node).map_or(0, HashMap::len)
    }

    /// Drop all timers for nodes that were restarted since the last call.
    pub fn reconcile(&mut self, board: &RestartBoard) {
        for name in self.identities.keys() {
            if self.watch.poll(board, name).restarted {
                if let Some(timers) = self.outstanding.remove(name) {
                    if !timers.is_empty() {
                        debug!(node = %name, dropped = timers.len(), "transaction timers cleared after restart");
                    }
                }
            }
        }
    }

    /// Fire every timer that has run for at least the timeout.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<RestartRequest> {
        let mut requests = Vec::new();
        for (node, timers) in &mut self.outstanding {
            let Some(identity) = self.identities.get(node) else {
                continue;
            };
            let mut expired: Vec<(String, DateTime<Utc>)> = timers
                .iter()
                .filter(|(_, since)| (now - **since).to_std().unwrap_or_default() >= self.timeout)
                .map(|(hash, since)| (hash.clone(), *since))
                .collect();
            expired.sort_by_key(|(_, since)| *since);
            for (hash, since) in expired {
                timers.remove(&hash);
                let waited = (now - since).num_seconds();
                warn!(node = %node, tx = %hash, waited_secs = waited, "transaction timed out");
                requests.push(RestartRequest::new(
                    identity.clone(),
                    RestartReason::TxTimeout,
                    format!("transaction {hash} pending for {waited}s"),
                    now,
                ));
            }
        }
        requests
    }
}
