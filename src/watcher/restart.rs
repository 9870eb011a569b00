//! Restart orchestration.
//!
//! At most one restart per node is in flight. A second request for the same
//! node while one is running is dropped, not queued. Different nodes restart
//! concurrently, each on its own thread.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use super::board::RestartBoard;
use crate::diagnostics::DiagnosticsStore;
use crate::messaging::{Notice, Notifier};
use crate::models::restart::{RestartReason, RestartRequest};
use crate::runtime::ContainerRuntime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,
    /// The runtime refused or failed; reported, never retried here
    Failed(String),
    /// Another restart for the node was already running
    InFlight,
    /// Declined during the warm-up window
    Suppressed,
}

type InFlightSet = Arc<Mutex<HashSet<String>>>;

/// Holds a node's in-flight slot; releases it on drop, including on panic.
struct InFlightGuard {
    set: InFlightSet,
    node: String,
}

impl InFlightGuard {
    fn acquire(set: &InFlightSet, node: &str) -> Option<Self> {
        let mut nodes = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !nodes.insert(node.to_string()) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            node: node.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut nodes = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        nodes.remove(&self.node);
    }
}

pub struct RestartOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    notifier: Arc<dyn Notifier>,
    diagnostics: DiagnosticsStore,
    board: Arc<RestartBoard>,
    tail_lines: usize,
    warmup_until: DateTime<Utc>,
    in_flight: InFlightSet,
}

impl RestartOrchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Arc<dyn Notifier>,
        diagnostics: DiagnosticsStore,
        board: Arc<RestartBoard>,
        tail_lines: usize,
        warmup_until: DateTime<Utc>,
    ) -> Self {
        Self {
            runtime,
            notifier,
            diagnostics,
            board,
            tail_lines,
            warmup_until,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_in_flight(&self, node: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(node)
    }

    /// Handle a request on the calling thread.
    pub fn handle(&self, request: RestartRequest) -> RestartOutcome {
        match self.claim(&request) {
            Ok(guard) => self.execute(request, guard),
            Err(outcome) => outcome,
        }
    }

    /// Claim the node's slot now and run the restart on a new thread.
    ///
    /// Returns `None` when the request was dropped or suppressed.
    pub fn submit(self: &Arc<Self>, request: RestartRequest) -> Option<JoinHandle<RestartOutcome>> {
        let guard = self.claim(&request).ok()?;
        let orchestrator = Arc::clone(self);
        let node = request.identity.name.clone();
        let spawned = thread::Builder::new()
            .name(format!("restart-{node}"))
            .spawn(move || orchestrator.execute(request, guard));
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                // The guard moved into the closure and was dropped with it.
                error!(node = %node, error = %e, "could not spawn restart thread");
                self.board.record_failure(&node);
                None
            }
        }
    }

    fn claim(&self, request: &RestartRequest) -> Result<InFlightGuard, RestartOutcome> {
        let node = request.identity.name.as_str();
        let Some(guard) = InFlightGuard::acquire(&self.in_flight, node) else {
            debug!(node, reason = %request.reason, "restart already in flight, request dropped");
            return Err(RestartOutcome::InFlight);
        };
        if request.reason != RestartReason::Manual && Utc::now() < self.warmup_until {
            info!(
                node,
                reason = %request.reason,
                details = %request.details,
                "restart suppressed during warm-up"
            );
            self.board.record_suppressed(node);
            return Err(RestartOutcome::Suppressed);
        }
        Ok(guard)
    }

    fn execute(&self, request: RestartRequest, _guard: InFlightGuard) -> RestartOutcome {
        let identity = &request.identity;
        let node = identity.name.as_str();
        let now = Utc::now();
        info!(node, reason = %request.reason, details = %request.details, "restarting node");

        match self.runtime.snapshot_logs(identity, self.tail_lines) {
            Ok(logs) => match self
                .diagnostics
                .write_snapshot(node, request.reason, now, &logs)
            {
                Ok(path) => debug!(node, path = %path.display(), "diagnostic snapshot written"),
                Err(e) => warn!(node, error = %format!("{e:#}"), "could not write diagnostic snapshot"),
            },
            Err(e) => warn!(node, error = %format!("{e:#}"), "could not capture logs before restart"),
        }
        if let Err(e) = self
            .diagnostics
            .record_restart(now, node, request.reason, &request.details)
        {
            warn!(node, error = %format!("{e:#}"), "could not append to event journal");
        }

        match self.runtime.restart(identity) {
            Ok(()) => {
                self.board.record_restart(node);
                info!(node, reason = %request.reason, "restart issued");
                self.notifier.send(&Notice::Restarted {
                    node: node.to_string(),
                    reason: request.reason,
                    details: request.details,
                    at: now,
                });
                RestartOutcome::Restarted
            }
            Err(e) => {
                let message = format!("{e:#}");
                self.board.record_failure(node);
                error!(node, reason = %request.reason, error = %message, "restart failed");
                self.notifier.send(&Notice::RestartFailed {
                    node: node.to_string(),
                    reason: request.reason,
                    error: message.clone(),
                });
                RestartOutcome::Failed(message)
            }
        }
    }
}
