//! Majority resolution over the current observations.
//!
//! Nodes are grouped by their (session, state) pair and the largest group
//! wins. Ties go to the previous cycle's winner when it is among the tied
//! groups, otherwise to the smallest pair, so the result never depends on
//! observation order.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::node::{NodeObservation, StatePair};

/// Consensus for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MajoritySnapshot {
    pub pair: StatePair,
    /// Nodes in the winning group
    pub votes: usize,
    /// Nodes that reported this cycle
    pub reporting: usize,
    pub computed_at: DateTime<Utc>,
    /// Last time the winning pair itself changed
    pub changed_at: DateTime<Utc>,
}

impl MajoritySnapshot {
    pub fn state(&self) -> u64 {
        self.pair.state
    }

    pub fn session(&self) -> u64 {
        self.pair.session
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Not enough observations; lag and stagnation checks must be skipped.
    NoQuorum { reporting: usize },
    Majority(MajoritySnapshot),
}

/// Compute the majority from this cycle's observations.
///
/// `previous` is the last snapshot the caller kept. It breaks ties and
/// carries `changed_at` forward while the winner stays the same.
pub fn resolve<'a, I>(
    observations: I,
    previous: Option<&MajoritySnapshot>,
    now: DateTime<Utc>,
) -> Resolution
where
    I: IntoIterator<Item = &'a NodeObservation>,
{
    let mut groups: HashMap<StatePair, usize> = HashMap::new();
    let mut reporting = 0;
    for obs in observations {
        *groups.entry(obs.pair()).or_default() += 1;
        reporting += 1;
    }

    let Some(top) = groups.values().copied().max() else {
        return Resolution::NoQuorum { reporting: 0 };
    };

    let previous_pair = previous.map(|p| p.pair);
    let pair = match previous_pair.filter(|p| groups.get(p) == Some(&top)) {
        Some(pair) => pair,
        None => groups
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(pair, _)| *pair)
            .min()
            .unwrap_or_default(),
    };

    let changed_at = match previous {
        Some(prev) if prev.pair == pair => prev.changed_at,
        _ => now,
    };

    Resolution::Majority(MajoritySnapshot {
        pair,
        votes: top,
        reporting,
        computed_at: now,
        changed_at,
    })
}
