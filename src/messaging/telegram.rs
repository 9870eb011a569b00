//! Telegram Bot API adapter.
//!
//! Outbound messages use `sendMessage` in HTML mode; inbound commands come
//! from long-polling `getUpdates` with offset tracking.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{CommandSource, Notice, Notifier};
use crate::http::{create_http_client, ensure_success};

const SEND_TIMEOUT_SECS: u64 = 10;
/// Server-side long-poll wait for `getUpdates`.
const LONG_POLL_SECS: u64 = 30;
/// Client timeout for `getUpdates`, a little above the long-poll wait.
const LONG_POLL_CLIENT_TIMEOUT_SECS: u64 = LONG_POLL_SECS + 5;

const API_BASE: &str = "https://api.telegram.org";

/// Build the notifier and the command source for one bot and chat.
pub fn connect(token: &str, chat_id: &str) -> Result<(TelegramNotifier, TelegramUpdates)> {
    connect_with_base(API_BASE, token, chat_id)
}

/// Same as [`connect`] against a custom API host.
pub fn connect_with_base(
    api_base: &str,
    token: &str,
    chat_id: &str,
) -> Result<(TelegramNotifier, TelegramUpdates)> {
    let base_url = format!("{}/bot{}", api_base.trim_end_matches('/'), token);
    let notifier = TelegramNotifier {
        client: create_http_client(Duration::from_secs(SEND_TIMEOUT_SECS))?,
        base_url: base_url.clone(),
        chat_id: chat_id.to_string(),
    };
    let updates = TelegramUpdates {
        client: create_http_client(Duration::from_secs(LONG_POLL_CLIENT_TIMEOUT_SECS))?,
        base_url,
        chat_id: chat_id.to_string(),
        offset: 0,
    };
    Ok((notifier, updates))
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    fn post(&self, text: &str) -> Result<()> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
        };
        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&payload)
            .send()
            .context("Failed to send Telegram message")?;
        ensure_success(&response, "Telegram sendMessage")
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, notice: &Notice) {
        match self.post(&notice.render()) {
            Ok(()) => debug!(notice = %notice.summary(), "sent Telegram notification"),
            Err(e) => error!(error = %format!("{e:#}"), "could not send Telegram notification"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

pub struct TelegramUpdates {
    client: Client,
    base_url: String,
    chat_id: String,
    offset: i64,
}

impl TelegramUpdates {
    /// Pull texts addressed from the configured chat and advance the offset
    /// past every update seen, including ignored ones.
    fn accept(&mut self, updates: Vec<Update>) -> Vec<String> {
        let mut texts = Vec::new();
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id.to_string() != self.chat_id {
                warn!(chat = message.chat.id, "ignoring message from unknown chat");
                continue;
            }
            if let Some(text) = message.text {
                texts.push(text);
            }
        }
        texts
    }
}

impl CommandSource for TelegramUpdates {
    fn poll_commands(&mut self) -> Result<Vec<String>> {
        let url = format!(
            "{}/getUpdates?offset={}&timeout={}",
            self.base_url, self.offset, LONG_POLL_SECS
        );
        let response = self
            .client
            .get(url)
            .send()
            .context("Failed to poll Telegram updates")?;
        ensure_success(&response, "Telegram getUpdates")?;

        let body: UpdatesResponse = response
            .json()
            .context("Failed to decode Telegram updates")?;
        if !body.ok {
            bail!("Telegram getUpdates returned ok=false");
        }
        Ok(self.accept(body.result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updates_for(chat_id: &str) -> TelegramUpdates {
        let (_, updates) = connect_with_base("http://127.0.0.1:9", "token", chat_id).unwrap();
        updates
    }

    fn parse(json: &str) -> Vec<Update> {
        serde_json::from_str::<UpdatesResponse>(json).unwrap().result
    }

    #[test]
    fn test_accept_filters_foreign_chats_and_advances_offset() {
        let mut updates = updates_for("42");
        let batch = parse(
            r#"{"ok": true, "result": [
                {"update_id": 10, "message": {"chat": {"id": 42}, "text": "/status"}},
                {"update_id": 11, "message": {"chat": {"id": 7}, "text": "/stagnation off"}},
                {"update_id": 12, "message": {"chat": {"id": 42}}},
                {"update_id": 13}
            ]}"#,
        );

        let texts = updates.accept(batch);
        assert_eq!(texts, vec!["/status".to_string()]);
        assert_eq!(updates.offset, 14);
    }

    #[test]
    fn test_offset_never_moves_backwards() {
        let mut updates = updates_for("42");
        updates.offset = 100;
        updates.accept(parse(
            r#"{"ok": true, "result": [{"update_id": 5, "message": {"chat": {"id": 42}, "text": "x"}}]}"#,
        ));
        assert_eq!(updates.offset, 100);
    }
}
