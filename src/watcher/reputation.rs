//! Task-failure health check against the stats endpoint.
//!
//! For each stage the last `window` task timestamps are compared with the
//! success timestamps; anything missing from the success set is a failure.
//! Once failures reach the threshold and at least one of them is new, the
//! node is restarted and those failures become known, so the same history
//! never triggers twice. Known failures are forgotten when the stage is
//! healthy again.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use super::board::{BaselineWatch, RestartBoard};
use crate::config::ReputationSettings;
use crate::models::node::NodeIdentity;
use crate::models::restart::{RestartReason, RestartRequest};

/// Read-only source of per-address task statistics.
pub trait StatsSource: Send {
    fn fetch(&self, address: &str) -> Result<NodeStats>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageStats {
    #[serde(default)]
    pub all_timestamps: Vec<i64>,
    #[serde(default)]
    pub success_timestamps: Vec<i64>,
}

impl StageStats {
    /// Recent tasks with no matching success.
    fn failures(&self, window: usize) -> BTreeSet<i64> {
        let start = self.all_timestamps.len().saturating_sub(window);
        let successes: BTreeSet<i64> = self.success_timestamps.iter().copied().collect();
        self.all_timestamps[start..]
            .iter()
            .copied()
            .filter(|ts| !successes.contains(ts))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStats {
    #[serde(default)]
    pub precommit: StageStats,
    #[serde(default)]
    pub commit: StageStats,
}

const STAGES: [&str; 2] = ["precommit", "commit"];

impl NodeStats {
    fn stages(&self) -> [(&'static str, &StageStats); 2] {
        [(STAGES[0], &self.precommit), (STAGES[1], &self.commit)]
    }
}

type KnownFailures = HashMap<&'static str, BTreeSet<i64>>;

pub struct ReputationCheck {
    settings: ReputationSettings,
    known: HashMap<String, KnownFailures>,
    /// Known sets as they were before the last unconfirmed restart request
    pending: HashMap<String, KnownFailures>,
    watch: BaselineWatch,
}

impl ReputationCheck {
    pub fn new(settings: ReputationSettings) -> Self {
        Self {
            settings,
            known: HashMap::new(),
            pending: HashMap::new(),
            watch: BaselineWatch::new(),
        }
    }

    pub fn known_failures(&self, node: &str, stage: &str) -> usize {
        self.known
            .get(node)
            .and_then(|stages| stages.get(stage))
            .map_or(0, BTreeSet::len)
    }

    /// Known failures for one node keyed by stage name, for the state file.
    pub fn known_snapshot(&self, node: &str) -> BTreeMap<String, BTreeSet<i64>> {
        self.known
            .get(node)
            .map(|stages| {
                stages
                    .iter()
                    .filter(|(_, failures)| !failures.is_empty())
                    .map(|(stage, failures)| (stage.to_string(), failures.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Seed known failures saved by a previous run. Unknown stages are dropped.
    pub fn restore(&mut self, node: &str, saved: &BTreeMap<String, BTreeSet<i64>>) {
        let known = self.known.entry(node.to_string()).or_default();
        for (stage, failures) in saved {
            match STAGES.iter().find(|s| **s == stage.as_str()) {
                Some(&name) => {
                    known.insert(name, failures.clone());
                }
                None => warn!(node, stage = %stage, "ignoring saved failures for unknown stage"),
            }
        }
    }

    /// Roll back known failures recorded by a request that never turned
    /// into a restart.
    pub fn reconcile<'a>(
        &mut self,
        board: &RestartBoard,
        nodes: impl IntoIterator<Item = &'a NodeIdentity>,
    ) {
        for node in nodes {
            let change = self.watch.poll(board, &node.name);
            if change.restarted {
                self.pending.remove(&node.name);
            } else if change.not_actuated {
                if let Some(previous) = self.pending.remove(&node.name) {
                    debug!(node = %node.name, "restart not carried out, known failures rolled back");
                    self.known.insert(node.name.clone(), previous);
                }
            }
        }
    }

    /// Fetch and evaluate one node. Nodes without an address are skipped;
    /// fetch errors are logged and treated as no data.
    pub fn check(
        &mut self,
        source: &dyn StatsSource,
        identity: &NodeIdentity,
        now: DateTime<Utc>,
    ) -> Option<RestartRequest> {
        let address = identity.address.as_deref()?;
        match source.fetch(address) {
            Ok(stats) => self.evaluate(identity, &stats, now),
            Err(e) => {
                warn!(node = %identity.name, error = %format!("{e:#}"), "reputation check skipped");
                None
            }
        }
    }

    pub fn evaluate(
        &mut self,
        identity: &NodeIdentity,
        stats: &NodeStats,
        now: DateTime<Utc>,
    ) -> Option<RestartRequest> {
        let node = identity.name.as_str();
        let known = self.known.entry(node.to_string()).or_default();

        for (stage, data) in stats.stages() {
            if data.all_timestamps.is_empty() {
                continue;
            }
            let failures = data.failures(self.settings.window);
            let count = failures.len();

            if count < self.settings.failure_threshold {
                if known.remove(stage).is_some() {
                    info!(node, stage, "stage healthy again, known failures cleared");
                }
                continue;
            }

            let unseen = match known.get(stage) {
                Some(seen) => failures.difference(seen).count(),
                None => count,
            };
            if unseen == 0 {
                debug!(node, stage, count, "only known failures, not restarting");
                continue;
            }

            let details =
                format!("{count} failed {stage} tasks in the last {}, {unseen} new", self.settings.window);
            info!(node, stage, count, unseen, "reputation threshold reached");
            self.pending.insert(node.to_string(), known.clone());
            known.insert(stage, failures);
            return Some(RestartRequest::new(
                identity.clone(),
                RestartReason::ReputationFailure,
                details,
                now,
            ));
        }
        None
    }
}
