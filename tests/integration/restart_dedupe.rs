//! At most one restart in flight per node

use chrono::Utc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use node_watcher::diagnostics::DiagnosticsStore;
use node_watcher::messaging::Notice;
use node_watcher::models::node::NodeIdentity;
use node_watcher::models::restart::{RestartReason, RestartRequest};
use node_watcher::watcher::{RestartBoard, RestartOrchestrator, RestartOutcome};

use super::helpers::*;

fn orchestrator(
    tmp: &TempDir,
    runtime: Arc<FakeRuntime>,
    notifier: Arc<RecordingNotifier>,
) -> (Arc<RestartOrchestrator>, Arc<RestartBoard>) {
    let nodes = [NodeIdentity::new("a", None), NodeIdentity::new("b", None)];
    let board = Arc::new(RestartBoard::new(nodes.iter()));
    let orchestrator = RestartOrchestrator::new(
        runtime,
        notifier,
        DiagnosticsStore::new(tmp.path().join("restart_logs"), tmp.path().join("watcher.log")),
        Arc::clone(&board),
        100,
        Utc::now(),
    );
    (Arc::new(orchestrator), board)
}

fn request(node: &str, reason: RestartReason) -> RestartRequest {
    RestartRequest::new(NodeIdentity::new(node, None), reason, "test trigger", Utc::now())
}

#[test]
fn test_simultaneous_triggers_actuate_once() {
    let tmp = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::with_restart_delay(&["a", "b"], Duration::from_millis(300)));
    let notifier = Arc::new(RecordingNotifier::default());
    let (orchestrator, board) = orchestrator(&tmp, runtime.clone(), notifier.clone());

    let barrier = Arc::new(Barrier::new(2));
    let triggers: Vec<_> = [RestartReason::LogCritical, RestartReason::LagMajor]
        .into_iter()
        .map(|reason| {
            let orchestrator = Arc::clone(&orchestrator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                orchestrator.handle(request("a", reason))
            })
        })
        .collect();
    let outcomes: Vec<RestartOutcome> = triggers.into_iter().map(|t| t.join().unwrap()).collect();

    assert_eq!(runtime.restarts(), vec!["a".to_string()]);
    assert!(outcomes.contains(&RestartOutcome::Restarted));
    assert!(outcomes.contains(&RestartOutcome::InFlight));
    assert_eq!(board.marks("a").restarts, 1);
    assert_eq!(notifier.count(|n| matches!(n, Notice::Restarted { .. })), 1);
}

#[test]
fn test_different_nodes_restart_concurrently() {
    let tmp = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::with_restart_delay(&["a", "b"], Duration::from_millis(200)));
    let notifier = Arc::new(RecordingNotifier::default());
    let (orchestrator, _board) = orchestrator(&tmp, runtime.clone(), notifier);

    let first = orchestrator.submit(request("a", RestartReason::TxTimeout)).unwrap();
    let second = orchestrator.submit(request("b", RestartReason::TxTimeout)).unwrap();
    assert_eq!(first.join().unwrap(), RestartOutcome::Restarted);
    assert_eq!(second.join().unwrap(), RestartOutcome::Restarted);

    let mut restarted = runtime.restarts();
    restarted.sort();
    assert_eq!(restarted, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_slot_released_after_failure() {
    let tmp = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(&["a", "b"]));
    runtime.fail_restarts(true);
    let notifier = Arc::new(RecordingNotifier::default());
    let (orchestrator, board) = orchestrator(&tmp, runtime.clone(), notifier.clone());

    let outcome = orchestrator.handle(request("a", RestartReason::LogCritical));
    assert!(matches!(outcome, RestartOutcome::Failed(_)));
    assert_eq!(board.marks("a").failures, 1);
    assert_eq!(notifier.count(|n| matches!(n, Notice::RestartFailed { .. })), 1);

    // No automatic retry; the next request is accepted.
    assert_eq!(runtime.restarts().len(), 1);
    runtime.fail_restarts(false);
    assert_eq!(
        orchestrator.handle(request("a", RestartReason::LogCritical)),
        RestartOutcome::Restarted
    );
}

#[test]
fn test_snapshot_and_journal_written_before_restart() {
    let tmp = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(&["a", "b"]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (orchestrator, _board) = orchestrator(&tmp, runtime, notifier);

    orchestrator.handle(request("b", RestartReason::Manual));

    let snapshots: Vec<_> = std::fs::read_dir(tmp.path().join("restart_logs"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].starts_with("b_manual_"));
    let snapshot = std::fs::read_to_string(tmp.path().join("restart_logs").join(&snapshots[0])).unwrap();
    assert_eq!(snapshot, "b last 100 lines\n");

    let journal = std::fs::read_to_string(tmp.path().join("watcher.log")).unwrap();
    assert!(journal.contains("| RESTART | b | MANUAL | test trigger"));
}
