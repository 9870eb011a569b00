//! Shared fakes and fixtures for integration tests

use anyhow::{bail, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use node_watcher::config::{ConfigFile, Secrets, WatcherConfig};
use node_watcher::messaging::{CommandSource, Notice, Notifier};
use node_watcher::models::node::{NodeIdentity, NodeObservation, StatePair};
use node_watcher::runtime::{ContainerRuntime, LogLines, NodeStatus};

/// In-memory container runtime.
///
/// States are set per node; log lines are pushed with [`FakeRuntime::emit`];
/// restarts are recorded and can be slowed down or made to fail.
pub struct FakeRuntime {
    states: Mutex<HashMap<String, StatePair>>,
    stopped: Mutex<HashSet<String>>,
    log_tx: Mutex<HashMap<String, Sender<String>>>,
    log_rx: Mutex<HashMap<String, Receiver<String>>>,
    restarts: Mutex<Vec<String>>,
    restart_delay: Duration,
    fail_restarts: AtomicBool,
}

impl FakeRuntime {
    pub fn new(nodes: &[&str]) -> Self {
        Self::with_restart_delay(nodes, Duration::ZERO)
    }

    pub fn with_restart_delay(nodes: &[&str], restart_delay: Duration) -> Self {
        let mut log_tx = HashMap::new();
        let mut log_rx = HashMap::new();
        for node in nodes {
            let (tx, rx) = mpsc::channel();
            log_tx.insert(node.to_string(), tx);
            log_rx.insert(node.to_string(), rx);
        }
        Self {
            states: Mutex::new(HashMap::new()),
            stopped: Mutex::new(HashSet::new()),
            log_tx: Mutex::new(log_tx),
            log_rx: Mutex::new(log_rx),
            restarts: Mutex::new(Vec::new()),
            restart_delay,
            fail_restarts: AtomicBool::new(false),
        }
    }

    pub fn set_state(&self, node: &str, session: u64, state: u64) {
        self.states
            .lock()
            .unwrap()
            .insert(node.to_string(), StatePair::new(session, state));
    }

    /// Report the node as an exited container until it is restarted.
    pub fn stop(&self, node: &str) {
        self.stopped.lock().unwrap().insert(node.to_string());
    }

    pub fn emit(&self, node: &str, line: &str) {
        let senders = self.log_tx.lock().unwrap();
        senders[node].send(line.to_string()).unwrap();
    }

    pub fn fail_restarts(&self, fail: bool) {
        self.fail_restarts.store(fail, Ordering::SeqCst);
    }

    pub fn restarts(&self) -> Vec<String> {
        self.restarts.lock().unwrap().clone()
    }
}

impl ContainerRuntime for FakeRuntime {
    fn get_state(&self, node: &NodeIdentity, _: Duration) -> Result<NodeStatus> {
        if self.stopped.lock().unwrap().contains(&node.name) {
            return Ok(NodeStatus::Stopped("exited".to_string()));
        }
        let pair = self.states.lock().unwrap().get(&node.name).copied();
        Ok(NodeStatus::Running(
            pair.map(|pair| NodeObservation::new(node.clone(), pair, Utc::now())),
        ))
    }

    fn tail_logs(&self, node: &NodeIdentity) -> Result<LogLines> {
        match self.log_rx.lock().unwrap().remove(&node.name) {
            Some(rx) => Ok(Box::new(rx.into_iter())),
            None => bail!("logs already followed for {}", node.name),
        }
    }

    fn restart(&self, node: &NodeIdentity) -> Result<()> {
        thread::sleep(self.restart_delay);
        self.restarts.lock().unwrap().push(node.name.clone());
        if self.fail_restarts.load(Ordering::SeqCst) {
            bail!("container {} is gone", node.name);
        }
        self.stopped.lock().unwrap().remove(&node.name);
        Ok(())
    }

    fn snapshot_logs(&self, node: &NodeIdentity, lines: usize) -> Result<String> {
        Ok(format!("{} last {} lines\n", node.name, lines))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Notice) -> bool) -> usize {
        self.sent.lock().unwrap().iter().filter(|n| matches(n)).count()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notice: &Notice) {
        self.sent.lock().unwrap().push(notice.clone());
    }
}

/// Command source fed from a channel.
pub struct ChannelCommands(pub Receiver<String>);

impl CommandSource for ChannelCommands {
    fn poll_commands(&mut self) -> Result<Vec<String>> {
        match self.0.recv_timeout(Duration::from_millis(50)) {
            Ok(text) => Ok(vec![text]),
            Err(_) => Ok(Vec::new()),
        }
    }
}

/// Validated config for `nodes` with diagnostics under `tmp`, no warm-up,
/// and one-second polling. `tweak` adjusts the file before validation.
pub fn config_in(
    tmp: &TempDir,
    nodes: &[&str],
    tweak: impl FnOnce(&mut ConfigFile),
) -> WatcherConfig {
    let mut file = ConfigFile {
        containers: nodes.iter().map(|s| s.to_string()).collect(),
        check_interval_seconds: 1,
        warmup_seconds: 0,
        log_dir: tmp.path().join("restart_logs"),
        event_log: tmp.path().join("watcher.log"),
        state_file: tmp.path().join("state_data").join("watcher_state.json"),
        ..Default::default()
    };
    tweak(&mut file);
    WatcherConfig::from_file(file, Secrets::default()).unwrap()
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

pub fn shutdown_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}
