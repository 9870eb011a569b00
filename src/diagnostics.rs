//! Diagnostic log snapshots and the restart event journal.
//!
//! Snapshots land in `<log_dir>/<node>_<reason>_<YYYYmmddTHHMMSS>.log`; the
//! journal gets one line per restart. Both are best-effort: callers log
//! errors and carry on.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::restart::RestartReason;

#[derive(Debug, Clone)]
pub struct DiagnosticsStore {
    log_dir: PathBuf,
    event_log: PathBuf,
}

impl DiagnosticsStore {
    pub fn new(log_dir: impl Into<PathBuf>, event_log: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            event_log: event_log.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Create the snapshot directory and the journal's parent directory.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.log_dir).with_context(|| {
            format!(
                "Failed to create snapshot directory: {}",
                self.log_dir.display()
            )
        })?;
        if let Some(parent) = self.event_log.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create journal directory: {}", parent.display())
            })?;
        }
        Ok(())
    }

    /// Path a snapshot for this node, reason, and time is written to.
    pub fn snapshot_path(&self, node: &str, reason: RestartReason, at: DateTime<Utc>) -> PathBuf {
        self.log_dir.join(format!(
            "{}_{}_{}.log",
            sanitize(node),
            reason.slug(),
            at.format("%Y%m%dT%H%M%S")
        ))
    }

    /// Write the captured log lines. Appends if a snapshot for the same
    /// second already exists.
    pub fn write_snapshot(
        &self,
        node: &str,
        reason: RestartReason,
        at: DateTime<Utc>,
        content: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.log_dir).with_context(|| {
            format!(
                "Failed to create snapshot directory: {}",
                self.log_dir.display()
            )
        })?;
        let path = self.snapshot_path(node, reason, at);
        append(&path, content)?;
        Ok(path)
    }

    /// Append `<rfc3339> | RESTART | <node> | <reason> | <details>` to the journal.
    pub fn record_restart(
        &self,
        at: DateTime<Utc>,
        node: &str,
        reason: RestartReason,
        details: &str,
    ) -> Result<()> {
        let line = format!(
            "{} | RESTART | {} | {} | {}\n",
            at.to_rfc3339(),
            node,
            reason,
            details.replace('\n', " ")
        );
        append(&self.event_log, &line)
    }
}

fn append(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Keep file names to a safe character set.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
