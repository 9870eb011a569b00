//! Integration tests for the watcher engine
//!
//! These drive the public API with in-memory fakes of the container runtime
//! and the messaging channel.

pub mod engine;
pub mod helpers;
pub mod lag_cycles;
pub mod remote_control;
pub mod restart_dedupe;
