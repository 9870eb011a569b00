//! The watcher engine.
//!
//! [`PollLoop`] drives majority resolution, lag and stagnation checks on a
//! fixed cadence. Log scanners and the transaction watchdog run as their
//! own tasks and feed restart requests to the [`RestartOrchestrator`]
//! through a channel. Restart outcomes flow back to the detectors through
//! the [`RestartBoard`].

pub mod board;
pub mod engine;
pub mod fleet;
pub mod lag;
pub mod log_scan;
pub mod majority;
pub mod poll;
pub mod reputation;
pub mod restart;
pub mod stagnation;
pub mod state;
pub mod tasks;
pub mod tx_watchdog;


pub use board::RestartBoard;
pub use engine::Watcher;
pub use lag::{LagDetector, LagTier};
pub use majority::{resolve, MajoritySnapshot, Resolution};
pub use poll::{CycleReport, PollLoop};
pub use restart::{RestartOrchestrator, RestartOutcome};
pub use state::StateStore;
