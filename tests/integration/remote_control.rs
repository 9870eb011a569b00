//! Operator commands against a running watcher

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use node_watcher::messaging::Notice;
use node_watcher::models::restart::RestartReason;
use node_watcher::watcher::Watcher;

use super::helpers::*;

const WAIT: Duration = Duration::from_secs(5);

fn replies(notifier: &RecordingNotifier) -> usize {
    notifier.count(|n| {
        matches!(
            n,
            Notice::CommandReply { .. }
                | Notice::CommandRejected { .. }
                | Notice::Help
                | Notice::UnknownCommand
        )
    })
}

#[test]
fn test_commands_change_live_settings_and_restart() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp, &["node-1", "node-2"], |_| {});
    let runtime = Arc::new(FakeRuntime::new(&["node-1", "node-2"]));
    let notifier = Arc::new(RecordingNotifier::default());
    let shutdown = shutdown_flag();
    let (commands, inbox) = mpsc::channel();

    let watcher = Watcher::new(config, runtime.clone(), notifier.clone())
        .with_commands(Box::new(ChannelCommands(inbox)));
    let settings = watcher.settings();
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watcher.run(flag));

    commands.send("/stagnation_timer 60".to_string()).unwrap();
    assert!(wait_until(WAIT, || replies(&notifier) == 1));
    assert_eq!(settings.snapshot().stagnation_threshold_minutes(), 60);

    commands.send("/stagnation_timer 0".to_string()).unwrap();
    assert!(wait_until(WAIT, || replies(&notifier) == 2));
    assert_eq!(settings.snapshot().stagnation_threshold_minutes(), 60);

    commands.send("/status".to_string()).unwrap();
    assert!(wait_until(WAIT, || replies(&notifier) == 3));

    commands.send("/stagnation off".to_string()).unwrap();
    assert!(wait_until(WAIT, || replies(&notifier) == 4));
    assert!(!settings.snapshot().stagnation_alert_enabled);

    commands.send("/restart node-2".to_string()).unwrap();
    assert!(wait_until(WAIT, || runtime.restarts().len() == 1));

    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    let notices = notifier.notices();
    assert!(notices.iter().any(|n| matches!(
        n,
        Notice::CommandRejected { text } if text.contains('0')
    )));
    assert!(notices.iter().any(|n| matches!(
        n,
        Notice::CommandReply { text } if text.contains("60 minutes") && text.contains("Monitored nodes")
    )));
    assert_eq!(runtime.restarts(), vec!["node-2".to_string()]);
    assert_eq!(
        notifier.count(|n| matches!(n, Notice::Restarted { reason: RestartReason::Manual, .. })),
        1
    );
}

#[test]
fn test_manual_restart_bypasses_warmup() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp, &["node-1", "node-2"], |file| file.warmup_seconds = 600);
    let runtime = Arc::new(FakeRuntime::new(&["node-1", "node-2"]));
    let notifier = Arc::new(RecordingNotifier::default());
    let shutdown = shutdown_flag();
    let (commands, inbox) = mpsc::channel();

    let watcher = Watcher::new(config, runtime.clone(), notifier)
        .with_commands(Box::new(ChannelCommands(inbox)));
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watcher.run(flag));

    commands.send("/restart node-1".to_string()).unwrap();
    assert!(wait_until(WAIT, || runtime.restarts().len() == 1));

    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap().unwrap();
    assert_eq!(runtime.restarts(), vec!["node-1".to_string()]);
}

#[test]
fn test_unknown_node_rejected_without_restart() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp, &["node-1", "node-2"], |_| {});
    let runtime = Arc::new(FakeRuntime::new(&["node-1", "node-2"]));
    let notifier = Arc::new(RecordingNotifier::default());
    let shutdown = shutdown_flag();
    let (commands, inbox) = mpsc::channel();

    let watcher = Watcher::new(config, runtime.clone(), notifier.clone())
        .with_commands(Box::new(ChannelCommands(inbox)));
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watcher.run(flag));

    commands.send("/restart node-9".to_string()).unwrap();
    assert!(wait_until(WAIT, || replies(&notifier) == 1));
    thread::sleep(Duration::from_millis(300));

    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    assert!(runtime.restarts().is_empty());
    assert_eq!(
        notifier.count(|n| matches!(n, Notice::CommandRejected { text } if text.contains("node-9"))),
        1
    );
}
