//! Network-wide stagnation alerting.
//!
//! Watches how long the majority pair has gone without changing. The first
//! evaluation at or past the threshold owns the window: it alerts if alerts
//! are enabled at that moment, and either way no further alert is sent
//! until the majority moves.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::majority::MajoritySnapshot;
use crate::config::LiveSettings;
use crate::models::node::StatePair;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagnationAlert {
    pub pair: StatePair,
    pub elapsed_minutes: u64,
}

#[derive(Debug, Default)]
pub struct StagnationDetector {
    /// `changed_at` of the window that has already been handled
    claimed_window: Option<DateTime<Utc>>,
}

impl StagnationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &mut self,
        snapshot: &MajoritySnapshot,
        settings: &LiveSettings,
        now: DateTime<Utc>,
    ) -> Option<StagnationAlert> {
        if self
            .claimed_window
            .is_some_and(|claimed| claimed != snapshot.changed_at)
        {
            debug!(pair = %snapshot.pair, "majority moved, stagnation window cleared");
            self.claimed_window = None;
        }
        if self.claimed_window.is_some() {
            return None;
        }

        let elapsed = (now - snapshot.changed_at).to_std().unwrap_or_default();
        if elapsed < settings.stagnation_threshold {
            return None;
        }

        self.claimed_window = Some(snapshot.changed_at);
        let elapsed_minutes = elapsed.as_secs() / 60;
        if !settings.stagnation_alert_enabled {
            info!(
                pair = %snapshot.pair,
                elapsed_minutes,
                "majority stagnant but alerts are disabled"
            );
            return None;
        }
        Some(StagnationAlert {
            pair: snapshot.pair,
            elapsed_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as Span;
    use std::time::Duration;

    fn settings(enabled: bool) -> LiveSettings {
        LiveSettings {
            stagnation_alert_enabled: enabled,
            stagnation_threshold: Duration::from_secs(30 * 60),
        }
    }

    fn snapshot(pair: StatePair, changed_at: DateTime<Utc>, now: DateTime<Utc>) -> MajoritySnapshot {
        MajoritySnapshot {
            pair,
            votes: 2,
            reporting: 3,
            computed_at: now,
            changed_at,
        }
    }

    #[test]
    fn test_one_alert_per_window() {
        let mut detector = StagnationDetector::new();
        let t0 = Utc::now();
        let pair = StatePair::new(7, 3);

        let early = t0 + Span::minutes(29);
        assert!(detector.evaluate(&snapshot(pair, t0, early), &settings(true), early).is_none());

        let mut alerts = 0;
        for minute in [30, 31, 45, 90] {
            let now = t0 + Span::minutes(minute) + Span::seconds(1);
            if detector.evaluate(&snapshot(pair, t0, now), &settings(true), now).is_some() {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 1);
    }

    #[test]
    fn test_disabled_at_threshold_spends_the_window() {
        let mut detector = StagnationDetector::new();
        let t0 = Utc::now();
        let pair = StatePair::new(7, 3);

        let t1 = t0 + Span::minutes(31);
        assert!(detector.evaluate(&snapshot(pair, t0, t1), &settings(false), t1).is_none());

        // Re-enabled later in the same window: still silent.
        let t2 = t0 + Span::minutes(40);
        assert!(detector.evaluate(&snapshot(pair, t0, t2), &settings(true), t2).is_none());
    }

    #[test]
    fn test_majority_change_rearms_alert() {
        let mut detector = StagnationDetector::new();
        let t0 = Utc::now();
        let t1 = t0 + Span::minutes(30);
        let first = detector.evaluate(&snapshot(StatePair::new(7, 3), t0, t1), &settings(true), t1);
        assert_eq!(first.unwrap().elapsed_minutes, 30);

        let t2 = t1 + Span::minutes(1);
        let moved = snapshot(StatePair::new(7, 4), t2, t2);
        assert!(detector.evaluate(&moved, &settings(true), t2).is_none());

        let t3 = t2 + Span::minutes(30);
        let again = detector.evaluate(&snapshot(StatePair::new(7, 4), t2, t3), &settings(true), t3);
        assert!(again.is_some());
    }

    #[test]
    fn test_threshold_change_applies_on_next_evaluation() {
        let mut detector = StagnationDetector::new();
        let t0 = Utc::now();
        let now = t0 + Span::minutes(10);
        let pair = StatePair::new(1, 1);
        assert!(detector.evaluate(&snapshot(pair, t0, now), &settings(true), now).is_none());

        let shorter = LiveSettings {
            stagnation_alert_enabled: true,
            stagnation_threshold: Duration::from_secs(5 * 60),
        };
        assert!(detector.evaluate(&snapshot(pair, t0, now), &shorter, now).is_some());
    }
}
