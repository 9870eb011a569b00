//! Runtime-mutable settings shared between the detectors and remote control.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::models::constants::{
    MAX_STAGNATION_THRESHOLD_MINUTES, MIN_STAGNATION_THRESHOLD_MINUTES,
};

use super::ConfigError;

/// The only configuration fields that may change while the watcher runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSettings {
    pub stagnation_alert_enabled: bool,
    pub stagnation_threshold: Duration,
}

impl LiveSettings {
    pub fn stagnation_threshold_minutes(&self) -> u64 {
        self.stagnation_threshold.as_secs() / 60
    }
}

/// Single-writer, many-reader slot holding [`LiveSettings`].
///
/// Readers copy out a whole snapshot, so no evaluation ever sees a
/// half-applied update.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<LiveSettings>>,
}

impl SharedSettings {
    pub fn new(initial: LiveSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> LiveSettings {
        // A writer cannot leave the value half-written, so a poisoned lock
        // still guards a consistent value.
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_stagnation_enabled(&self, enabled: bool) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.stagnation_alert_enabled = enabled;
    }

    /// Replace the stagnation threshold. Out-of-range values leave the
    /// current threshold untouched.
    pub fn set_stagnation_threshold(&self, threshold: Duration) -> Result<(), ConfigError> {
        validate_stagnation_threshold(threshold)?;
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.stagnation_threshold = threshold;
        Ok(())
    }
}

/// Check a threshold against the accepted minute range.
pub fn validate_stagnation_threshold(threshold: Duration) -> Result<(), ConfigError> {
    let min = Duration::from_secs(MIN_STAGNATION_THRESHOLD_MINUTES * 60);
    let max = Duration::from_secs(MAX_STAGNATION_THRESHOLD_MINUTES * 60);
    if threshold < min || threshold > max {
        return Err(ConfigError::StagnationThresholdOutOfRange {
            minutes: threshold.as_secs() / 60,
            min: MIN_STAGNATION_THRESHOLD_MINUTES,
            max: MAX_STAGNATION_THRESHOLD_MINUTES,
        });
    }
    Ok(())
}
