//! Client for the control plane, for processes that want to trigger scans

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use tracing::trace;

use super::types::{
    CallCollectorsRequest, CallCollectorsResponse, HealthResponse, RequestResponse, ScanHostRequest,
    ScanNetRequest,
};
use crate::actors::messages::{CollectorName, Command};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ControlClient {
    http: Client,
    base_url: String,
}

impl ControlClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:5563`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn scan_net(&self, net: Vec<String>) -> Result<RequestResponse> {
        self.post("/api/v1/scan/net", &ScanNetRequest { net }).await
    }

    pub async fn scan_host(&self, host: Vec<String>) -> Result<RequestResponse> {
        self.post("/api/v1/scan/host", &ScanHostRequest { host })
            .await
    }

    /// Ask the daemon to republish its whole inventory
    pub async fn request_all_entries(&self) -> Result<RequestResponse> {
        self.post("/api/v1/entries/request", &serde_json::json!({}))
            .await
    }

    pub async fn call_collectors(
        &self,
        collectors: Vec<CollectorName>,
        commands: Vec<Command>,
    ) -> Result<CallCollectorsResponse> {
        self.post(
            "/api/v1/collectors/call",
            &CallCollectorsRequest {
                collectors,
                commands,
            },
        )
        .await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/api/v1/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()?;

        response.json().await.context("failed to parse response")
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        trace!(%url, "control request");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()?;

        response.json().await.context("failed to parse response")
    }
}
