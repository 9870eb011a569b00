pub mod commands;
pub mod config;
pub mod control;
pub mod diagnostics;
pub(crate) mod http;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod runtime;
pub mod stats;
pub mod watcher;
