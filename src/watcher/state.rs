//! Detector state that survives a watcher restart.
//!
//! Known reputation failures and open lag windows are written to a single
//! JSON document whenever they change, and read back at startup. Without
//! this a restarted watcher would treat old task failures as new and
//! restart the same nodes again. The file is best effort: read and write
//! errors are logged and the watcher carries on with in-memory state.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::lag::LagTier;

/// An open lag window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagWindow {
    pub tier: LagTier,
    pub entered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// Failure timestamps already acted on, by stage
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub known_failures: BTreeMap<String, BTreeSet<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lag: Option<LagWindow>,
}

impl NodeState {
    fn is_empty(&self) -> bool {
        self.known_failures.is_empty() && self.lag.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherState {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeState>,
}

impl WatcherState {
    pub fn node(&self, name: &str) -> Option<&NodeState> {
        self.nodes.get(name)
    }

    pub fn node_mut(&mut self, name: &str) -> &mut NodeState {
        self.nodes.entry(name.to_string()).or_default()
    }

    /// Drop nodes with nothing worth keeping.
    fn compact(&mut self) {
        self.nodes.retain(|_, node| !node.is_empty());
    }
}

/// The state file plus the last document written to it.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    saved: WatcherState,
}

impl StateStore {
    /// Open the store at `path`, loading whatever it holds. A missing file
    /// is a fresh start; an unreadable one is logged and ignored.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let saved = match read_state(&path) {
            Ok(Some(state)) => {
                info!(path = %path.display(), nodes = state.nodes.len(), "loaded watcher state");
                state
            }
            Ok(None) => {
                debug!(path = %path.display(), "no watcher state file, starting fresh");
                WatcherState::default()
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %format!("{e:#}"),
                    "could not load watcher state, starting fresh"
                );
                WatcherState::default()
            }
        };
        Self { path, saved }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// State as of the last load or successful write.
    pub fn state(&self) -> &WatcherState {
        &self.saved
    }

    /// Write `state` if it differs from what is on disk. Returns whether a
    /// write happened. Failures are logged and retried on the next change.
    pub fn persist(&mut self, mut state: WatcherState) -> bool {
        state.compact();
        if state == self.saved {
            return false;
        }
        match write_state(&self.path, &state) {
            Ok(()) => {
                debug!(path = %self.path.display(), nodes = state.nodes.len(), "watcher state saved");
                self.saved = state;
                true
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %format!("{e:#}"),
                    "could not save watcher state"
                );
                false
            }
        }
    }
}

/// Read the state file, or `None` if it doesn't exist.
pub fn read_state(path: &Path) -> Result<Option<WatcherState>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let state = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
    Ok(Some(state))
}

/// Write the state file through a temporary sibling so a crash mid-write
/// leaves the previous document intact.
pub fn write_state(path: &Path, state: &WatcherState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(state).context("Failed to serialize watcher state")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace state file: {}", path.display()))?;
    Ok(())
}
