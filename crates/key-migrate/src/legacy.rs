//! Client for the legacy key API.
//!
//! Records are returned as raw JSON. Parsing into the legacy model happens
//! in `convert`, after the audit snapshot is on disk.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::config::LegacyConfig;

pub struct LegacyClient {
    http: reqwest::Client,
    api_base: String,
}

impl LegacyClient {
    pub fn new(config: &LegacyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn record_url(&self, key_web: &str) -> String {
        format!("{}/keys/get/{}", self.api_base, key_web)
    }

    /// `GET {api_base}/keys/get/{key_web}`.
    pub async fn fetch(&self, key_web: &str) -> Result<Value> {
        let url = self.record_url(key_web);
        self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()
            .with_context(|| format!("GET {}", url))?
            .json()
            .await
            .with_context(|| format!("Invalid JSON from {}", url))
    }
}
