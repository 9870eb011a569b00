//! Long-running watcher threads.
//!
//! Each `spawn_*` function starts one task and returns its handle. Tasks
//! poll the shared shutdown flag between units of work.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::board::{BaselineWatch, RestartBoard};
use super::log_scan::{LogScanner, LogSignal};
use super::restart::{RestartOrchestrator, RestartOutcome};
use super::tx_watchdog::{TransactionWatchdog, TxNotice};
use crate::config::LogRules;
use crate::control::RemoteControl;
use crate::messaging::{CommandSource, Notifier};
use crate::models::node::NodeIdentity;
use crate::models::restart::{RestartReason, RestartRequest};
use crate::runtime::ContainerRuntime;

/// How often blocked receivers wake up to check the shutdown flag.
pub(crate) const SHUTDOWN_POLL: Duration = Duration::from_millis(100);
/// Backoff after the command source fails.
const COMMAND_RETRY_DELAY: Duration = Duration::from_secs(15);
const LOG_LINE_BUFFER: usize = 1024;

/// Feed restart requests to the orchestrator until shutdown, then wait for
/// restarts already running.
pub fn spawn_dispatcher(
    orchestrator: Arc<RestartOrchestrator>,
    requests: Receiver<RestartRequest>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut running: Vec<JoinHandle<RestartOutcome>> = Vec::new();
        while !shutdown.load(Ordering::SeqCst) {
            match requests.recv_timeout(SHUTDOWN_POLL) {
                Ok(request) => {
                    if let Some(handle) = orchestrator.submit(request) {
                        running.push(handle);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            running.retain(|h| !h.is_finished());
        }
        for handle in running {
            if handle.join().is_err() {
                warn!("restart thread panicked");
            }
        }
        debug!("restart dispatcher stopped");
    })
}

/// Scan one node's log stream.
///
/// A separate reader thread pulls from the runtime's blocking iterator; it
/// is abandoned at shutdown since the stream never ends on its own.
pub fn spawn_log_scanner(
    identity: NodeIdentity,
    runtime: Arc<dyn ContainerRuntime>,
    rules: Arc<LogRules>,
    board: Arc<RestartBoard>,
    restarts: Sender<RestartRequest>,
    tx_events: Option<Sender<TxNotice>>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let lines = match runtime.tail_logs(&identity) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(node = %identity, error = %format!("{e:#}"), "could not follow logs");
                return;
            }
        };
        let (line_tx, line_rx) = mpsc::sync_channel(LOG_LINE_BUFFER);
        thread::spawn(move || {
            for line in lines {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut scanner = LogScanner::new(rules);
        let mut watch = BaselineWatch::new();
        watch.poll(&board, &identity.name);
        info!(node = %identity, "log scanner started");

        while !shutdown.load(Ordering::SeqCst) {
            let line = match line_rx.recv_timeout(SHUTDOWN_POLL) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(node = %identity, "log stream ended");
                    break;
                }
            };
            if watch.poll(&board, &identity.name).restarted {
                scanner.reset();
            }

            let now = Utc::now();
            match scanner.observe(&line, now) {
                Some(LogSignal::Critical { details }) => {
                    warn!(node = %identity, details = %details, "critical log pattern");
                    let request =
                        RestartRequest::new(identity.clone(), RestartReason::LogCritical, details, now);
                    if restarts.send(request).is_err() {
                        break;
                    }
                }
                Some(LogSignal::Tx(event)) => {
                    if let Some(tx_events) = &tx_events {
                        let notice = TxNotice {
                            identity: identity.clone(),
                            event,
                            at: now,
                        };
                        if tx_events.send(notice).is_err() {
                            break;
                        }
                    }
                }
                None => {}
            }
        }
        debug!(node = %identity, "log scanner stopped");
    })
}

/// Apply transaction events and fire expired timers.
pub fn spawn_tx_watchdog(
    mut watchdog: TransactionWatchdog,
    events: Receiver<TxNotice>,
    board: Arc<RestartBoard>,
    restarts: Sender<RestartRequest>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        watchdog.reconcile(&board);
        while !shutdown.load(Ordering::SeqCst) {
            match events.recv_timeout(SHUTDOWN_POLL) {
                Ok(notice) => watchdog.apply(notice),
                Err(RecvTimeoutError::Timeout) => {}
                // Scanners gone; timers may still expire.
                Err(RecvTimeoutError::Disconnected) => thread::sleep(SHUTDOWN_POLL),
            }
            watchdog.reconcile(&board);
            for request in watchdog.expire(Utc::now()) {
                if restarts.send(request).is_err() {
                    return;
                }
            }
        }
        debug!("transaction watchdog stopped");
    })
}

/// Answer operator commands until shutdown.
pub fn spawn_control_listener(
    control: RemoteControl,
    mut source: Box<dyn CommandSource>,
    notifier: Arc<dyn Notifier>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        info!("remote control listener started");
        control.listen(
            source.as_mut(),
            notifier.as_ref(),
            || !shutdown.load(Ordering::SeqCst),
            COMMAND_RETRY_DELAY,
        );
        debug!("remote control listener stopped");
    })
}
