//! Fixed-cadence driver: query, resolve, evaluate.

use chrono::{DateTime, Utc};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::board::RestartBoard;
use super::fleet::FleetState;
use super::lag::LagDetector;
use super::majority::{resolve, MajoritySnapshot, Resolution};
use super::reputation::{ReputationCheck, StatsSource};
use super::stagnation::StagnationDetector;
use super::state::{StateStore, WatcherState};
use crate::config::{SharedSettings, WatcherConfig};
use crate::messaging::{Notice, Notifier};
use crate::models::node::NodeIdentity;
use crate::models::restart::{RestartReason, RestartRequest};
use crate::runtime::{ContainerRuntime, NodeStatus};

const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// What one cycle did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub observed: usize,
    /// `None` when the cycle had no quorum
    pub majority: Option<MajoritySnapshot>,
    pub restarts_requested: usize,
    pub stagnation_alerted: bool,
}

struct Reputation {
    check: ReputationCheck,
    source: Box<dyn StatsSource>,
}

pub struct PollLoop {
    nodes: Vec<NodeIdentity>,
    runtime: Arc<dyn ContainerRuntime>,
    notifier: Arc<dyn Notifier>,
    settings: SharedSettings,
    board: Arc<RestartBoard>,
    restarts: Sender<RestartRequest>,
    query_timeout: Duration,
    min_quorum: usize,
    concluded_state: u64,
    fleet: FleetState,
    previous: Option<MajoritySnapshot>,
    lag: LagDetector,
    stagnation: StagnationDetector,
    reputation: Option<Reputation>,
    store: Option<StateStore>,
}

impl PollLoop {
    pub fn new(
        config: &WatcherConfig,
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Arc<dyn Notifier>,
        settings: SharedSettings,
        board: Arc<RestartBoard>,
        restarts: Sender<RestartRequest>,
    ) -> Self {
        Self {
            nodes: config.nodes.clone(),
            runtime,
            notifier,
            settings,
            board,
            restarts,
            query_timeout: config.state_query_timeout,
            min_quorum: config.min_quorum,
            concluded_state: config.concluded_state,
            fleet: FleetState::new(),
            previous: None,
            lag: LagDetector::new(&config.nodes, config.minor_grace, config.major_grace),
            stagnation: StagnationDetector::new(),
            reputation: None,
            store: None,
        }
    }

    /// Enable the reputation check against `source`.
    pub fn with_reputation(mut self, config: &WatcherConfig, source: Box<dyn StatsSource>) -> Self {
        if config.reputation.enabled {
            let mut check = ReputationCheck::new(config.reputation);
            if let Some(store) = &self.store {
                for identity in &self.nodes {
                    if let Some(saved) = store.state().node(&identity.name) {
                        check.restore(&identity.name, &saved.known_failures);
                    }
                }
            }
            self.reputation = Some(Reputation { check, source });
        }
        self
    }

    /// Persist detector state through `store`, seeding the detectors from
    /// what it already holds.
    pub fn with_state(mut self, store: StateStore) -> Self {
        for identity in &self.nodes {
            let Some(saved) = store.state().node(&identity.name) else {
                continue;
            };
            if let Some(window) = saved.lag {
                info!(node = %identity, tier = %window.tier, since = %window.entered_at, "lag window restored");
                self.lag.restore(identity, window);
            }
            if let Some(reputation) = &mut self.reputation {
                reputation.check.restore(&identity.name, &saved.known_failures);
            }
        }
        self.store = Some(store);
        self
    }

    pub fn lag(&self) -> &LagDetector {
        &self.lag
    }

    /// Run one cycle as of `now`.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let report = self.evaluate_cycle(now);
        self.save_state();
        report
    }

    fn evaluate_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        self.lag.reconcile(&self.board);

        let mut stopped = Vec::new();
        for identity in &self.nodes {
            match self.runtime.get_state(identity, self.query_timeout) {
                Ok(NodeStatus::Running(Some(observation))) => self.fleet.record(observation),
                Ok(NodeStatus::Running(None)) => {
                    debug!(node = %identity, "no state this cycle");
                    self.fleet.clear(&identity.name);
                }
                Ok(NodeStatus::Stopped(status)) => {
                    warn!(node = %identity, status = %status, "node is not running");
                    self.fleet.clear(&identity.name);
                    stopped.push((identity.clone(), status));
                }
                Err(e) => {
                    warn!(node = %identity, error = %format!("{e:#}"), "state query failed");
                    self.fleet.clear(&identity.name);
                }
            }
        }
        report.observed = self.fleet.len();

        if let Some(reputation) = &mut self.reputation {
            reputation.check.reconcile(&self.board, &self.nodes);
            for identity in &self.nodes {
                if let Some(request) =
                    reputation.check.check(reputation.source.as_ref(), identity, now)
                {
                    report.restarts_requested += 1;
                    dispatch(&self.restarts, request);
                }
            }
        }

        if self.fleet.len() < self.min_quorum {
            warn!(
                observed = self.fleet.len(),
                required = self.min_quorum,
                "not enough nodes reporting to determine a majority"
            );
            return report;
        }
        let snapshot = match resolve(self.fleet.observations(), self.previous.as_ref(), now) {
            Resolution::Majority(snapshot) => snapshot,
            Resolution::NoQuorum { reporting } => {
                warn!(reporting, "no quorum this cycle");
                return report;
            }
        };
        info!(
            majority = %snapshot.pair,
            votes = snapshot.votes,
            reporting = snapshot.reporting,
            "network majority"
        );

        let live = self.settings.snapshot();
        if let Some(alert) = self.stagnation.evaluate(&snapshot, &live, now) {
            warn!(majority = %alert.pair, minutes = alert.elapsed_minutes, "network stagnation");
            self.notifier.send(&Notice::StagnationAlert {
                pair: alert.pair,
                elapsed_minutes: alert.elapsed_minutes,
            });
            report.stagnation_alerted = true;
        }

        if snapshot.pair.state == self.concluded_state {
            for (identity, status) in stopped {
                let details = format!(
                    "node status was '{status}' while the majority concluded session {}",
                    snapshot.session()
                );
                info!(node = %identity, majority = %snapshot.pair, "restarting inactive node");
                report.restarts_requested += 1;
                dispatch(
                    &self.restarts,
                    RestartRequest::new(identity, RestartReason::InactiveNode, details, now),
                );
            }
        }

        for observation in self.fleet.observations() {
            if let Some(request) = self.lag.evaluate(observation, &snapshot, now) {
                report.restarts_requested += 1;
                dispatch(&self.restarts, request);
            }
        }

        self.previous = Some(snapshot.clone());
        report.majority = Some(snapshot);
        report
    }

    /// Write known failures and open lag windows if they changed.
    fn save_state(&mut self) {
        let Some(store) = &mut self.store else {
            return;
        };
        let mut state = WatcherState::default();
        for (name, window) in self.lag.windows() {
            state.node_mut(name).lag = Some(window);
        }
        for identity in &self.nodes {
            let known = match &self.reputation {
                Some(reputation) => reputation.check.known_snapshot(&identity.name),
                // Check disabled this run; keep what an earlier run recorded.
                None => store
                    .state()
                    .node(&identity.name)
                    .map(|n| n.known_failures.clone())
                    .unwrap_or_default(),
            };
            if !known.is_empty() {
                state.node_mut(&identity.name).known_failures = known;
            }
        }
        store.persist(state);
    }

    /// Cycle every `interval` until `shutdown` is set. A panicking cycle is
    /// reported and the loop carries on.
    pub fn run(&mut self, shutdown: &AtomicBool, interval: Duration) {
        info!(interval_secs = interval.as_secs(), "poll loop started");
        while !shutdown.load(Ordering::SeqCst) {
            let cycle = panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle(Utc::now())));
            if let Err(payload) = cycle {
                let message = panic_message(payload.as_ref());
                error!(error = %message, "poll cycle panicked");
                self.notifier.send(&Notice::WatcherError { error: message });
            }
            sleep_until_shutdown(shutdown, interval);
        }
        info!("poll loop stopped");
    }
}

fn dispatch(restarts: &Sender<RestartRequest>, request: RestartRequest) {
    let node = request.identity.name.clone();
    if restarts.send(request).is_err() {
        warn!(node = %node, "restart dispatcher gone, request dropped");
    }
}

pub(crate) fn sleep_until_shutdown(shutdown: &AtomicBool, total: Duration) {
    let mut remaining = total;
    while !remaining.is_zero() && !shutdown.load(Ordering::SeqCst) {
        let step = remaining.min(SLEEP_SLICE);
        thread::sleep(step);
        remaining -= step;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
