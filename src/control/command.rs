//! Operator command grammar.

use crate::models::constants::command_logs;

use super::CommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Stagnation(bool),
    /// Threshold in minutes, already known to be positive
    StagnationTimer(u64),
    Restart(String),
    Logs { node: String, lines: usize },
}

const STAGNATION_USAGE: &str = "Usage: /stagnation on|off";
const TIMER_USAGE: &str = "Usage: /stagnation_timer <minutes>";
const RESTART_USAGE: &str = "Usage: /restart <node>";
const LOGS_USAGE: &str = "Usage: /logs <node> [lines]";

/// Parse a message such as `/stagnation_timer@watcher_bot 60`.
pub fn parse(text: &str) -> Result<Command, CommandError> {
    let mut words = text.split_whitespace();
    let head = words.next().unwrap_or_default();
    let name = head.strip_prefix('/').unwrap_or(head);
    let name = name.split('@').next().unwrap_or(name).to_ascii_lowercase();
    let args: Vec<&str> = words.collect();

    match name.as_str() {
        "help" | "start" => Ok(Command::Help),
        "status" => Ok(Command::Status),
        "stagnation" => match args.as_slice() {
            [flag] if flag.eq_ignore_ascii_case("on") => Ok(Command::Stagnation(true)),
            [flag] if flag.eq_ignore_ascii_case("off") => Ok(Command::Stagnation(false)),
            _ => Err(CommandError::Usage(STAGNATION_USAGE)),
        },
        "stagnation_timer" => match args.as_slice() {
            [minutes] => parse_minutes(minutes).map(Command::StagnationTimer),
            _ => Err(CommandError::Usage(TIMER_USAGE)),
        },
        "restart" => match args.as_slice() {
            [node] => Ok(Command::Restart(node.to_string())),
            _ => Err(CommandError::Usage(RESTART_USAGE)),
        },
        "logs" => match args.as_slice() {
            [node] => Ok(Command::Logs {
                node: node.to_string(),
                lines: command_logs::DEFAULT_LINES,
            }),
            [node, lines] => {
                let lines = lines
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(CommandError::Usage(LOGS_USAGE))?;
                Ok(Command::Logs {
                    node: node.to_string(),
                    lines: lines.min(command_logs::MAX_LINES),
                })
            }
            _ => Err(CommandError::Usage(LOGS_USAGE)),
        },
        _ => Err(CommandError::Unknown(head.to_string())),
    }
}

fn parse_minutes(raw: &str) -> Result<u64, CommandError> {
    match raw.parse::<i64>() {
        Ok(minutes) if minutes > 0 => Ok(minutes.unsigned_abs()),
        _ => Err(CommandError::InvalidMinutes(raw.to_string())),
    }
}
