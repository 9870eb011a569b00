//! Poll-cycle behavior: majority, lag tiers, quorum

use chrono::{DateTime, Duration as Span, Utc};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use tempfile::TempDir;

use node_watcher::config::SharedSettings;
use node_watcher::models::node::{NodeIdentity, NodeObservation, StatePair};
use node_watcher::models::restart::{RestartReason, RestartRequest};
use node_watcher::watcher::{resolve, LagTier, PollLoop, Resolution, RestartBoard};

use super::helpers::*;

struct Cycles {
    poll: PollLoop,
    runtime: Arc<FakeRuntime>,
    requests: Receiver<RestartRequest>,
    t0: DateTime<Utc>,
    _tmp: TempDir,
}

impl Cycles {
    fn new(nodes: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp, nodes, |file| {
            file.grace_period_seconds = 30;
            file.major_grace_period_seconds = 90;
        });
        let runtime = Arc::new(FakeRuntime::new(nodes));
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, requests) = mpsc::channel();
        let poll = PollLoop::new(
            &config,
            runtime.clone(),
            notifier,
            SharedSettings::new(config.live_settings()),
            Arc::new(RestartBoard::new(&config.nodes)),
            tx,
        );
        Self {
            poll,
            runtime,
            requests,
            t0: Utc::now(),
            _tmp: tmp,
        }
    }

    fn at(&mut self, secs: i64) -> Vec<RestartRequest> {
        self.poll.run_cycle(self.t0 + Span::seconds(secs));
        self.requests.try_iter().collect()
    }
}

#[test]
fn test_divergence_shorter_than_grace_never_restarts() {
    let mut c = Cycles::new(&["a", "b", "c"]);
    c.runtime.set_state("a", 4, 10);
    c.runtime.set_state("b", 4, 10);
    c.runtime.set_state("c", 4, 9);

    for secs in [0, 10, 20, 29] {
        assert!(c.at(secs).is_empty());
    }
    c.runtime.set_state("c", 4, 10);
    assert!(c.at(40).is_empty());
    assert_eq!(c.poll.lag().tier("c"), LagTier::None);
}

#[test]
fn test_exactly_one_minor_restart_at_grace() {
    let mut c = Cycles::new(&["a", "b", "c"]);
    c.runtime.set_state("a", 4, 10);
    c.runtime.set_state("b", 4, 10);
    c.runtime.set_state("c", 4, 9);

    assert!(c.at(0).is_empty());
    let fired = c.at(30);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].identity.name, "c");
    assert_eq!(fired[0].reason, RestartReason::LagMinor);
    assert_eq!(c.poll.lag().tier("c"), LagTier::None);

    // The reset starts a new window rather than firing every cycle.
    assert!(c.at(31).is_empty());
    assert!(c.at(45).is_empty());
}

#[test]
fn test_session_divergence_moves_to_major_and_waits_longer() {
    let mut c = Cycles::new(&["a", "b", "c"]);
    c.runtime.set_state("a", 4, 10);
    c.runtime.set_state("b", 4, 10);
    c.runtime.set_state("c", 4, 9);
    c.at(0);
    assert_eq!(c.poll.lag().tier("c"), LagTier::Minor);

    c.runtime.set_state("c", 3, 9);
    assert!(c.at(5).is_empty());
    assert_eq!(c.poll.lag().tier("c"), LagTier::Major);

    // Past the minor grace, short of the major grace.
    assert!(c.at(60).is_empty());
    let fired = c.at(95);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].reason, RestartReason::LagMajor);
}

#[test]
fn test_single_reporter_is_not_a_quorum() {
    let mut c = Cycles::new(&["a", "b", "c"]);
    c.runtime.set_state("a", 4, 10);
    let report = c.poll.run_cycle(c.t0);
    assert!(report.majority.is_none());
}

#[test]
fn test_majority_independent_of_observation_order() {
    let pairs = [(4, 10), (4, 9), (4, 10), (3, 1), (4, 9), (3, 1), (5, 0)];
    let observations: Vec<NodeObservation> = pairs
        .iter()
        .enumerate()
        .map(|(i, (session, state))| {
            NodeObservation::new(
                NodeIdentity::new(format!("n{i}"), None),
                StatePair::new(*session, *state),
                Utc::now(),
            )
        })
        .collect();

    let now = Utc::now();
    let winner = |obs: &[NodeObservation]| match resolve(obs, None, now) {
        Resolution::Majority(snapshot) => snapshot.pair,
        Resolution::NoQuorum { .. } => panic!("expected a majority"),
    };
    let expected = winner(&observations);

    // Deterministic shuffles: every stride coprime with the length.
    let len = observations.len();
    for stride in 1..len {
        for offset in 0..len {
            let shuffled: Vec<NodeObservation> = (0..len)
                .map(|i| observations[(offset + i * stride) % len].clone())
                .collect();
            assert_eq!(winner(&shuffled), expected);
        }
    }
    assert_eq!(expected, StatePair::new(3, 1));
}
