//! Per-node restart outcome counters.
//!
//! The restart orchestrator bumps these; each detector compares them with
//! the marks it saw last and resets its own per-node records. No detector
//! ever touches another's records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::node::NodeIdentity;

#[derive(Debug, Default)]
struct NodeCounters {
    restarts: AtomicU64,
    failures: AtomicU64,
    suppressed: AtomicU64,
}

/// Snapshot of one node's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartMarks {
    /// Restarts that completed
    pub restarts: u64,
    /// Restarts the runtime refused or failed
    pub failures: u64,
    /// Requests declined during warm-up
    pub suppressed: u64,
}

/// What changed since a detector last looked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkChange {
    pub restarted: bool,
    /// A request ended without a restart (failure or warm-up)
    pub not_actuated: bool,
}

#[derive(Debug, Default)]
pub struct RestartBoard {
    nodes: HashMap<String, NodeCounters>,
}

impl RestartBoard {
    /// The node set is fixed for the process lifetime.
    pub fn new<'a>(nodes: impl IntoIterator<Item = &'a NodeIdentity>) -> Self {
        Self {
            nodes: nodes
                .into_iter()
                .map(|n| (n.name.clone(), NodeCounters::default()))
                .collect(),
        }
    }

    pub fn marks(&self, node: &str) -> RestartMarks {
        self.nodes
            .get(node)
            .map(|c| RestartMarks {
                restarts: c.restarts.load(Ordering::Acquire),
                failures: c.failures.load(Ordering::Acquire),
                suppressed: c.suppressed.load(Ordering::Acquire),
            })
            .unwrap_or_default()
    }

    pub fn record_restart(&self, node: &str) {
        if let Some(c) = self.nodes.get(node) {
            c.restarts.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn record_failure(&self, node: &str) {
        if let Some(c) = self.nodes.get(node) {
            c.failures.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn record_suppressed(&self, node: &str) {
        if let Some(c) = self.nodes.get(node) {
            c.suppressed.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// Per-detector memory of the marks last seen for each node.
#[derive(Debug, Default)]
pub struct BaselineWatch {
    seen: HashMap<String, RestartMarks>,
}

impl BaselineWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the board with what this detector saw last and remember the
    /// current marks.
    pub fn poll(&mut self, board: &RestartBoard, node: &str) -> MarkChange {
        let current = board.marks(node);
        let previous = self.seen.insert(node.to_string(), current).unwrap_or_default();
        MarkChange {
            restarted: current.restarts > previous.restarts,
            not_actuated: current.failures > previous.failures
                || current.suppressed > previous.suppressed,
        }
    }
}
