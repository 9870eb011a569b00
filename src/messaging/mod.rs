//! Messaging channel: outbound operator notifications and inbound commands.

mod notice;
pub mod telegram;

use anyhow::Result;
use tracing::info;

pub use notice::{escape_html, Notice};

/// Outbound notifications. Delivery is best-effort; implementations log
/// failures and never propagate them.
pub trait Notifier: Send + Sync {
    fn send(&self, notice: &Notice);
}

/// Inbound operator commands.
pub trait CommandSource: Send {
    /// Wait (bounded) for new command texts. An empty vector means nothing
    /// arrived before the wait expired.
    fn poll_commands(&mut self) -> Result<Vec<String>>;
}

/// Notifier used when no messaging channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notice: &Notice) {
        info!(notice = %notice.summary(), "notification (no channel configured)");
    }
}
