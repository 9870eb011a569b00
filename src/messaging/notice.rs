//! Operator-facing notification templates.
//!
//! Rendered as Telegram HTML. Dynamic text is escaped before interpolation.

use chrono::{DateTime, Utc};

use crate::models::node::StatePair;
use crate::models::restart::RestartReason;

/// Everything the watcher tells the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    WatcherStarted,
    WatcherStopped,
    WatcherError {
        error: String,
    },
    Restarted {
        node: String,
        reason: RestartReason,
        details: String,
        at: DateTime<Utc>,
    },
    RestartFailed {
        node: String,
        reason: RestartReason,
        error: String,
    },
    StagnationAlert {
        pair: StatePair,
        elapsed_minutes: u64,
    },
    CommandReply {
        text: String,
    },
    CommandRejected {
        text: String,
    },
    Help,
    UnknownCommand,
}

const HELP_TEXT: &str = "<b>Node Watcher Commands</b>

<code>/status</code>
View the current monitoring status and settings.

<code>/stagnation on</code> | <code>/stagnation off</code>
Enable or disable the network stagnation alert.

<code>/stagnation_timer &lt;minutes&gt;</code>
Set the stagnation alert threshold.
<i>Example: /stagnation_timer 60</i>

<code>/restart &lt;node&gt;</code>
Restart a node now (diagnostics are captured first).

<code>/logs &lt;node&gt; [lines]</code>
Show the last lines of a node's log.";

impl Notice {
    /// Telegram HTML body.
    pub fn render(&self) -> String {
        match self {
            Notice::WatcherStarted => "✅ <b>Node Watcher Started</b>\n\
                 Monitoring service is now online. Send /help for commands."
                .to_string(),
            Notice::WatcherStopped => {
                "⏹️ <b>Node Watcher Stopped</b>\nService was shut down.".to_string()
            }
            Notice::WatcherError { error } => format!(
                "🔥 <b>WATCHER ERROR</b> 🔥\n{}\nManual intervention may be required.",
                escape_html(error)
            ),
            Notice::Restarted {
                node,
                reason,
                details,
                at,
            } => format!(
                "🚨 <b>Node Watcher Alert</b> 🚨\n\n\
                 Restarted container: <code>{}</code>\n\
                 <b>Reason</b>: {} ({})\n\
                 <b>Details</b>: {}\n\
                 <b>Timestamp</b>: {}",
                escape_html(node),
                reason.label(),
                reason,
                escape_html(details),
                at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            Notice::RestartFailed {
                node,
                reason,
                error,
            } => format!(
                "🔥 <b>CRITICAL</b> 🔥\nFailed to restart container <code>{}</code> ({}).\n\
                 {}\nManual intervention may be required.",
                escape_html(node),
                reason,
                escape_html(error)
            ),
            Notice::StagnationAlert {
                pair,
                elapsed_minutes,
            } => format!(
                "⚠️ <b>Network Stagnation Alert</b> ⚠️\n\n\
                 Majority state <code>{pair}</code> has not changed for over {elapsed_minutes} minutes.\n\
                 This might indicate an issue with the oracle or RPC."
            ),
            Notice::CommandReply { text } => format!("✅ <b>Command Executed</b>\n\n{text}"),
            Notice::CommandRejected { text } => {
                format!("⚠️ <b>Command Rejected</b>\n\n{}", escape_html(text))
            }
            Notice::Help => HELP_TEXT.to_string(),
            Notice::UnknownCommand => "❓ <b>Unknown Command</b>\n\n\
                 I didn't recognize that command. Send /help to see available commands."
                .to_string(),
        }
    }

    /// One-line plain summary for the local log.
    pub fn summary(&self) -> String {
        match self {
            Notice::WatcherStarted => "watcher started".to_string(),
            Notice::WatcherStopped => "watcher stopped".to_string(),
            Notice::WatcherError { error } => format!("watcher error: {error}"),
            Notice::Restarted { node, reason, .. } => format!("restarted {node} ({reason})"),
            Notice::RestartFailed {
                node,
                reason,
                error,
            } => format!("restart of {node} ({reason}) failed: {error}"),
            Notice::StagnationAlert {
                pair,
                elapsed_minutes,
            } => format!("majority {pair} unchanged for {elapsed_minutes} minutes"),
            Notice::CommandReply { text } => format!("command reply: {text}"),
            Notice::CommandRejected { text } => format!("command rejected: {text}"),
            Notice::Help => "help".to_string(),
            Notice::UnknownCommand => "unknown command".to_string(),
        }
    }
}

/// Escape the three characters Telegram's HTML mode treats specially.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
