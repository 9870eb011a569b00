//! HTTP client for the per-address task statistics endpoint.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::time::Duration;

use crate::http::{create_http_client, ensure_success, read_body_with_limit};
use crate::watcher::reputation::{NodeStats, StatsSource};

const STATS_TIMEOUT_SECS: u64 = 10;
/// Stats documents are a few kilobytes; anything far larger is malformed.
const MAX_STATS_BODY_BYTES: u64 = 4 * 1024 * 1024;

pub struct StatsClient {
    client: Client,
    endpoint: String,
}

impl StatsClient {
    /// `endpoint` is the base URL; the address is appended as a path segment.
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: create_http_client(Duration::from_secs(STATS_TIMEOUT_SECS))?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, address: &str) -> String {
        format!("{}/{}", self.endpoint, address)
    }
}

impl StatsSource for StatsClient {
    fn fetch(&self, address: &str) -> Result<NodeStats> {
        let url = self.url_for(address);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("Failed to query stats endpoint: {url}"))?;
        ensure_success(&response, "Stats endpoint")?;
        let body = read_body_with_limit(response, MAX_STATS_BODY_BYTES, "Stats endpoint")?;
        serde_json::from_slice(&body).context("Stats endpoint returned malformed JSON")
    }
}
