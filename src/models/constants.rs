/// Number of log lines captured into a diagnostic snapshot before a restart.
pub const DEFAULT_TAIL_LINES: usize = 500;

/// Seconds between poll cycles.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;

/// Seconds a node may diverge in the minor tier before it is restarted.
pub const DEFAULT_MINOR_GRACE_SECS: u64 = 30;

/// Seconds a node may diverge in the major tier before it is restarted.
/// Always strictly greater than the minor grace.
pub const DEFAULT_MAJOR_GRACE_SECS: u64 = 120;

/// Upper bound on a single state query to the runtime.
pub const DEFAULT_STATE_QUERY_TIMEOUT_SECS: u64 = 10;

/// Observations needed before a majority is meaningful.
pub const DEFAULT_MIN_QUORUM: usize = 2;

/// Seconds after startup during which detector-issued restarts are suppressed.
pub const DEFAULT_WARMUP_SECS: u64 = 180;

/// Seconds a submitted transaction may stay outstanding.
pub const DEFAULT_TX_TIMEOUT_SECS: u64 = 300;

/// Minutes the majority may stay unchanged before a stagnation alert.
pub const DEFAULT_STAGNATION_THRESHOLD_MINUTES: u64 = 30;

/// Smallest accepted stagnation threshold, in minutes.
pub const MIN_STAGNATION_THRESHOLD_MINUTES: u64 = 1;

/// Largest accepted stagnation threshold, in minutes (one week).
pub const MAX_STAGNATION_THRESHOLD_MINUTES: u64 = 7 * 24 * 60;

/// Majority state value reported once a session has concluded.
pub const DEFAULT_CONCLUDED_STATE: u64 = 6;

/// Where detector state survives watcher restarts.
pub const DEFAULT_STATE_FILE: &str = "state_data/watcher_state.json";

/// Reputation check: how many recent tasks are inspected per stage.
pub const DEFAULT_REPUTATION_WINDOW: usize = 20;

/// Reputation check: failed tasks within the window that trigger a restart.
pub const DEFAULT_REPUTATION_FAILURE_THRESHOLD: usize = 5;

/// Log rule defaults.
pub mod log_rules {
    pub const FATAL_TRACEBACK: &str = r"Traceback \(most recent call last\):";
    pub const PING_FAILURE: &str = r"Pinging network\.\.\.";
    pub const STATE_LINE: &str = r"Latest ID:\s*\d+\s*/\s*Latest State:\s*\d+";
    pub const TX_SUBMITTED: &str = r"TX:\s*(0x[0-9a-fA-F]+)";
    /// Matches the keyword on either side of the hash; the hash is
    /// whichever group participated.
    pub const TX_COMPLETED: &str = r"(?i)\b(?:confirmed|completed|success|failed|reverted)\b.*?(0x[0-9a-fA-F]+)|(0x[0-9a-fA-F]+)\b.*?\b(?:confirmed|completed|success|failed|reverted)\b";

    /// Failures needed inside the window to trigger a restart.
    pub const FAILURE_THRESHOLD: usize = 2;
    pub const FAILURE_WINDOW_SECS: u64 = 120;
    /// A gap this long since the last failure discards the running count.
    pub const QUIET_PERIOD_SECS: u64 = 300;
}

/// Operator `logs` command bounds.
pub mod command_logs {
    pub const DEFAULT_LINES: usize = 20;
    pub const MAX_LINES: usize = 200;
    /// Replies are trimmed to this many trailing characters.
    pub const MAX_REPLY_CHARS: usize = 4000;
}
