//! Docker CLI implementation of [`ContainerRuntime`].
//!
//! Every call shells out to `docker` and is bounded by a timeout. Output
//! pipes are drained on reader threads while waiting so a chatty container
//! cannot deadlock the call on a full pipe buffer.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use super::{parse_latest_state, ContainerRuntime, LogLines, NodeStatus};
use crate::models::node::{NodeIdentity, NodeObservation};

/// Timeout for collecting output from child process pipes
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum captured output per stream (10MB)
const MAX_OUTPUT_SIZE: u64 = 10 * 1024 * 1024;

/// Seconds docker waits for a graceful stop before killing the container.
const RESTART_STOP_TIMEOUT_SECS: u64 = 30;

const RESTART_COMMAND_TIMEOUT: Duration = Duration::from_secs(90);
const LOGS_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause before re-attaching a log follower whose stream ended.
const REATTACH_DELAY: Duration = Duration::from_secs(2);

/// Verify the docker binary is installed.
pub fn check_docker_available() -> Result<()> {
    if which::which("docker").is_err() {
        bail!(
            "docker is not installed or not on PATH. The watcher drives containers \
             through the docker CLI."
        );
    }
    Ok(())
}

#[derive(Debug)]
struct CommandOutput {
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    /// `docker logs` splits the container's stdout and stderr; the node
    /// logs to both, so callers want them together.
    fn combined(self) -> String {
        if self.stderr.is_empty() {
            self.stdout
        } else if self.stdout.is_empty() {
            self.stderr
        } else {
            format!("{}\n{}", self.stdout.trim_end(), self.stderr)
        }
    }
}

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    /// Lines inspected when looking for the latest state line
    state_tail_lines: usize,
}

impl DockerCli {
    pub fn new(state_tail_lines: usize) -> Self {
        Self::with_binary("docker", state_tail_lines)
    }

    /// Use a different executable in place of `docker`.
    pub fn with_binary(binary: impl Into<String>, state_tail_lines: usize) -> Self {
        Self {
            binary: binary.into(),
            state_tail_lines,
        }
    }

    /// Run one docker command, killing it if it exceeds `timeout`.
    fn run(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {} {}", self.binary, args.join(" ")))?;

        let (stdout_tx, stdout_rx) = mpsc::channel();
        let (stderr_tx, stderr_rx) = mpsc::channel();
        spawn_collector(child.stdout.take(), stdout_tx);
        spawn_collector(child.stderr.take(), stderr_tx);

        let status = child
            .wait_timeout(timeout)
            .with_context(|| format!("Failed to wait for docker {}", args.join(" ")))?;

        let Some(status) = status else {
            kill_child_process(&mut child);
            bail!(
                "docker {} timed out after {}s",
                args.join(" "),
                timeout.as_secs()
            );
        };

        let stdout = stdout_rx
            .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
            .unwrap_or_default();
        let stderr = stderr_rx
            .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
            .unwrap_or_default();

        if !status.success() {
            bail!(
                "docker {} exited with {}: {}",
                args.join(" "),
                status,
                stderr.trim()
            );
        }

        Ok(CommandOutput { stdout, stderr })
    }

    fn container_status(&self, name: &str, timeout: Duration) -> Result<String> {
        let output = self.run(&["inspect", "-f", "{{.State.Status}}", name], timeout)?;
        Ok(output.stdout.trim().to_string())
    }

    fn logs_tail(&self, name: &str, lines: usize, timeout: Duration) -> Result<String> {
        let tail = lines.to_string();
        let output = self.run(&["logs", "--tail", &tail, name], timeout)?;
        Ok(output.combined())
    }
}

impl ContainerRuntime for DockerCli {
    fn get_state(&self, node: &NodeIdentity, timeout: Duration) -> Result<NodeStatus> {
        let deadline = Instant::now() + timeout;

        let status = self.container_status(&node.name, timeout)?;
        if status != "running" {
            debug!(node = %node, status = %status, "container not running");
            return Ok(NodeStatus::Stopped(status));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("state query for {} timed out", node.name);
        }

        let logs = self.logs_tail(&node.name, self.state_tail_lines, remaining)?;
        Ok(NodeStatus::Running(
            parse_latest_state(logs.lines())
                .map(|pair| NodeObservation::new(node.clone(), pair, Utc::now())),
        ))
    }

    fn tail_logs(&self, node: &NodeIdentity) -> Result<LogLines> {
        let mut follower = DockerLogFollower::new(self.binary.clone(), node.name.clone());
        follower.attach()?;
        Ok(Box::new(follower))
    }

    fn restart(&self, node: &NodeIdentity) -> Result<()> {
        let grace = RESTART_STOP_TIMEOUT_SECS.to_string();
        self.run(&["restart", "-t", &grace, &node.name], RESTART_COMMAND_TIMEOUT)?;
        info!(node = %node, "restart command completed");
        Ok(())
    }

    fn snapshot_logs(&self, node: &NodeIdentity, lines: usize) -> Result<String> {
        self.logs_tail(&node.name, lines, LOGS_COMMAND_TIMEOUT)
    }
}

/// Follows `docker logs -f` and re-attaches whenever the stream ends, so a
/// restarted container keeps feeding the same iterator.
struct DockerLogFollower {
    binary: String,
    name: String,
    child: Option<Child>,
    lines: Option<Receiver<String>>,
    /// RFC 3339 time the previous stream ended; `None` before first attach
    since: Option<String>,
}

impl DockerLogFollower {
    fn new(binary: String, name: String) -> Self {
        Self {
            binary,
            name,
            child: None,
            lines: None,
            since: None,
        }
    }

    fn attach(&mut self) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("logs").arg("-f");
        match &self.since {
            Some(since) => cmd.arg("--since").arg(since),
            None => cmd.arg("--tail").arg("0"),
        };
        let mut child = cmd
            .arg(&self.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to follow logs for {}", self.name))?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_forwarder(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_forwarder(stderr, tx);
        }

        debug!(node = %self.name, "attached log follower");
        self.child = Some(child);
        self.lines = Some(rx);
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(mut child) = self.child.take() {
            kill_child_process(&mut child);
        }
        self.lines = None;
        self.since = Some(Utc::now().to_rfc3339());
    }
}

impl Iterator for DockerLogFollower {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(rx) = &self.lines {
                if let Ok(line) = rx.recv() {
                    return Some(line);
                }
                // Both pipes closed: the container stopped or restarted.
                self.detach();
                thread::sleep(REATTACH_DELAY);
            }

            if let Err(e) = self.attach() {
                warn!(node = %self.name, error = %format!("{e:#}"), "log follower re-attach failed");
                thread::sleep(REATTACH_DELAY);
            }
        }
    }
}

impl Drop for DockerLogFollower {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            kill_child_process(&mut child);
        }
    }
}

fn spawn_collector<R: Read + Send + 'static>(stream: Option<R>, tx: Sender<String>) {
    match stream {
        Some(stream) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stream.take(MAX_OUTPUT_SIZE).read_to_end(&mut buf);
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
            });
        }
        None => {
            let _ = tx.send(String::new());
        }
    }
}

fn spawn_line_forwarder<R: Read + Send + 'static>(stream: R, tx: Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

fn kill_child_process(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
