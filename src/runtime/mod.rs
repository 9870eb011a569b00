//! Container runtime collaborator.
//!
//! The watcher never talks to a supervisor directly; it goes through
//! [`ContainerRuntime`], which the Docker CLI adapter implements and tests
//! replace with in-memory fakes.

pub mod docker;

use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use crate::models::node::{NodeIdentity, NodeObservation, StatePair};

pub use docker::{check_docker_available, DockerCli};

/// Unbounded, non-restartable sequence of log lines.
pub type LogLines = Box<dyn Iterator<Item = String> + Send>;

/// What a state query found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    /// Running. `None` until the node has logged a state line.
    Running(Option<NodeObservation>),
    /// The container exists but is not running; carries the runtime's
    /// status word (`exited`, `created`, ...)
    Stopped(String),
}

impl NodeStatus {
    pub fn observation(self) -> Option<NodeObservation> {
        match self {
            NodeStatus::Running(observation) => observation,
            NodeStatus::Stopped(_) => None,
        }
    }
}

pub trait ContainerRuntime: Send + Sync {
    /// Current state of a node, bounded by `timeout`. A container the
    /// runtime does not know is an error, not [`NodeStatus::Stopped`].
    fn get_state(&self, node: &NodeIdentity, timeout: Duration) -> Result<NodeStatus>;

    /// Follow the node's log output from now on.
    fn tail_logs(&self, node: &NodeIdentity) -> Result<LogLines>;

    fn restart(&self, node: &NodeIdentity) -> Result<()>;

    /// The last `lines` lines of the node's log as one text blob.
    fn snapshot_logs(&self, node: &NodeIdentity, lines: usize) -> Result<String>;
}

fn state_line_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"Latest ID:\s*(\d+)\s*/\s*Latest State:\s*(\d+)").ok())
        .as_ref()
}

/// Parse one `Latest ID: <session> / Latest State: <state>` line.
pub fn parse_state_line(line: &str) -> Option<StatePair> {
    let caps = state_line_pattern()?.captures(line)?;
    let session = caps.get(1)?.as_str().parse().ok()?;
    let state = caps.get(2)?.as_str().parse().ok()?;
    Some(StatePair::new(session, state))
}

/// The most recent state line in a block of log output.
pub fn parse_latest_state<'a, I>(lines: I) -> Option<StatePair>
where
    I: DoubleEndedIterator<Item = &'a str>,
{
    lines.rev().find_map(parse_state_line)
}
