//! Shared blocking HTTP helpers.
//!
//! Every client gets a connect timeout and a total request timeout so a
//! slow or unresponsive server can never hang a watcher task.

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::io::Read;
use std::time::Duration;

pub(crate) const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

pub(crate) fn create_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(timeout)
        .user_agent(concat!("node-watcher/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Fail unless `response` carries a 2xx status. `endpoint` names the
/// remote call in the error.
pub(crate) fn ensure_success(response: &Response, endpoint: &str) -> Result<()> {
    check_status(response.status(), endpoint)
}

fn check_status(status: StatusCode, endpoint: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let code = status.as_u16();
    match status.canonical_reason() {
        Some(reason) => bail!("{endpoint} answered {code} {reason}"),
        None => bail!("{endpoint} answered {code}"),
    }
}

/// Read a response body, refusing anything larger than `max_size` bytes.
pub(crate) fn read_body_with_limit(response: Response, max_size: u64, context: &str) -> Result<Vec<u8>> {
    if let Some(content_length) = response.content_length() {
        if content_length > max_size {
            bail!("{context}: Content-Length {content_length} bytes exceeds limit of {max_size} bytes");
        }
    }

    let mut bytes = Vec::new();
    response
        .take(max_size + 1)
        .read_to_end(&mut bytes)
        .with_context(|| format!("{context}: failed to read response body"))?;
    if bytes.len() as u64 > max_size {
        bail!("{context}: response body exceeds limit of {max_size} bytes");
    }
    Ok(bytes)
}
