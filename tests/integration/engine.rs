//! Full watcher runs against the fake runtime

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use node_watcher::messaging::Notice;
use node_watcher::models::restart::RestartReason;
use node_watcher::watcher::Watcher;

use super::helpers::*;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_fatal_log_line_restarts_once_and_journals() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp, &["a", "b", "c"], |_| {});
    let runtime = Arc::new(FakeRuntime::new(&["a", "b", "c"]));
    let notifier = Arc::new(RecordingNotifier::default());
    let shutdown = shutdown_flag();

    let watcher = Watcher::new(config, runtime.clone(), notifier.clone());
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watcher.run(flag));

    runtime.emit("b", "starting worker");
    runtime.emit("b", "Traceback (most recent call last):");
    assert!(wait_until(WAIT, || runtime.restarts().len() == 1));

    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    assert_eq!(runtime.restarts(), vec!["b".to_string()]);
    let journal = std::fs::read_to_string(tmp.path().join("watcher.log")).unwrap();
    assert_eq!(journal.lines().count(), 1);
    assert!(journal.contains("| RESTART | b | LOG_CRITICAL |"));
    assert_eq!(
        notifier.count(|n| matches!(n, Notice::Restarted { reason: RestartReason::LogCritical, .. })),
        1
    );
}

#[test]
fn test_start_and_stop_notices_bracket_the_run() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp, &["a", "b"], |_| {});
    let runtime = Arc::new(FakeRuntime::new(&["a", "b"]));
    let notifier = Arc::new(RecordingNotifier::default());
    let shutdown = shutdown_flag();

    let watcher = Watcher::new(config, runtime, notifier.clone());
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watcher.run(flag));

    assert!(wait_until(WAIT, || notifier.count(|n| *n == Notice::WatcherStarted) == 1));
    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    let notices = notifier.notices();
    assert_eq!(notices.first(), Some(&Notice::WatcherStarted));
    assert_eq!(notices.last(), Some(&Notice::WatcherStopped));
}

#[test]
fn test_unfinished_transaction_times_out() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp, &["a", "b"], |file| {
        file.tx_watch_containers = vec!["a".to_string(), "b".to_string()];
        file.tx_timeout_seconds = 1;
    });
    let runtime = Arc::new(FakeRuntime::new(&["a", "b"]));
    let notifier = Arc::new(RecordingNotifier::default());
    let shutdown = shutdown_flag();

    let watcher = Watcher::new(config, runtime.clone(), notifier.clone());
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watcher.run(flag));

    runtime.emit("a", "TX: 0xABC");
    runtime.emit("b", "TX: 0xdef");
    runtime.emit("b", "Transaction confirmed: 0xdef");
    assert!(wait_until(WAIT, || runtime.restarts().len() == 1));
    // Give the completed transaction time to (wrongly) expire.
    thread::sleep(Duration::from_millis(1500));

    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    assert_eq!(runtime.restarts(), vec!["a".to_string()]);
    assert_eq!(
        notifier.count(|n| matches!(n, Notice::Restarted { reason: RestartReason::TxTimeout, .. })),
        1
    );
}

#[test]
fn test_unwatched_node_transactions_ignored() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp, &["a", "b"], |file| {
        file.tx_watch_containers = vec!["b".to_string()];
        file.tx_timeout_seconds = 1;
    });
    let runtime = Arc::new(FakeRuntime::new(&["a", "b"]));
    let notifier = Arc::new(RecordingNotifier::default());
    let shutdown = shutdown_flag();

    let watcher = Watcher::new(config, runtime.clone(), notifier);
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watcher.run(flag));

    runtime.emit("a", "TX: 0xabc");
    thread::sleep(Duration::from_millis(1800));
    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    assert!(runtime.restarts().is_empty());
}

#[test]
fn test_warmup_suppresses_detector_restarts() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp, &["a", "b"], |file| file.warmup_seconds = 600);
    let runtime = Arc::new(FakeRuntime::new(&["a", "b"]));
    let notifier = Arc::new(RecordingNotifier::default());
    let shutdown = shutdown_flag();

    let watcher = Watcher::new(config, runtime.clone(), notifier.clone());
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watcher.run(flag));

    runtime.emit("a", "Traceback (most recent call last):");
    thread::sleep(Duration::from_millis(500));
    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    assert!(runtime.restarts().is_empty());
    assert_eq!(notifier.count(|n| matches!(n, Notice::Restarted { .. })), 0);
}

#[test]
fn test_stopped_node_restarted_after_session_concludes() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp, &["a", "b", "c"], |_| {});
    let runtime = Arc::new(FakeRuntime::new(&["a", "b", "c"]));
    runtime.set_state("a", 40, 6);
    runtime.set_state("b", 40, 6);
    runtime.stop("c");
    let notifier = Arc::new(RecordingNotifier::default());
    let shutdown = shutdown_flag();

    let watcher = Watcher::new(config, runtime.clone(), notifier.clone());
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watcher.run(flag));

    assert!(wait_until(WAIT, || runtime.restarts().len() == 1));
    // Running again after the restart; later cycles leave it be.
    thread::sleep(Duration::from_millis(1500));
    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    assert_eq!(runtime.restarts(), vec!["c".to_string()]);
    let journal = std::fs::read_to_string(tmp.path().join("watcher.log")).unwrap();
    assert!(journal.contains("| RESTART | c | INACTIVE_NODE |"));
}
