//! HTTP client for the analysis agent.
//!
//! Two synchronous RPCs: per-alert analysis when a webhook lands, and the
//! incident-level summary when an operator resolves. Both are called from
//! detached tasks, so the generous timeout never holds up a webhook
//! response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::models::WebhookAlert;

const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(120);

/// Analysis capability consumed by the pipeline and the resolution
/// orchestrator.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Ask the agent to analyse one alert; blocks until the agent answers
    /// or the deadline passes.
    async fn analyze(
        &self,
        alert: &WebhookAlert,
        thread_ref: &str,
        incident_id: Option<&str>,
    ) -> Result<AnalysisResponse>;

    /// Second-stage summary over all of an incident's per-alert analyses.
    async fn summarize(&self, request: &IncidentSummaryRequest) -> Result<IncidentSummaryResponse>;
}

#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    alert: &'a WebhookAlert,
    thread_ts: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    incident_id: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub thread_ts: String,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub analysis_summary: String,
    #[serde(default)]
    pub analysis_detail: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

impl AnalysisResponse {
    /// Summary to persist; falls back to the combined analysis text.
    #[must_use]
    pub fn summary(&self) -> &str {
        if self.analysis_summary.is_empty() {
            &self.analysis
        } else {
            &self.analysis_summary
        }
    }

    /// Detail to persist; falls back to the combined analysis text.
    #[must_use]
    pub fn detail(&self) -> &str {
        if self.analysis_detail.is_empty() {
            &self.analysis
        } else {
            &self.analysis_detail
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentSummaryRequest {
    pub incident_id: String,
    pub title: String,
    pub severity: String,
    pub fired_at: String,
    pub resolved_at: String,
    pub alerts: Vec<AlertSummaryInput>,
}

/// One alert's analysis, handed to the agent for the incident summary.
#[derive(Debug, Clone, Serialize)]
pub struct AlertSummaryInput {
    pub fingerprint: String,
    pub alert_name: String,
    pub severity: String,
    pub status: String,
    pub analysis_summary: String,
    pub analysis_detail: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentSummaryResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detail: String,
}

/// Reqwest-backed analysis client.
pub struct AgentClient {
    base_url: String,
    client: reqwest::Client,
}

impl AgentClient {
    #[must_use]
    pub fn new(cfg: &AgentConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            client: reqwest::Client::builder()
                .timeout(ANALYSIS_TIMEOUT)
                .build()
                .expect("reqwest client"),
        }
    }
}

#[async_trait]
impl AnalysisClient for AgentClient {
    async fn analyze(
        &self,
        alert: &WebhookAlert,
        thread_ref: &str,
        incident_id: Option<&str>,
    ) -> Result<AnalysisResponse> {
        let request = AnalysisRequest {
            alert,
            thread_ts: thread_ref,
            incident_id,
        };

        let resp = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Agent(format!(
                "analyze returned status {}",
                resp.status()
            )));
        }

        Ok(resp.json().await?)
    }

    async fn summarize(&self, request: &IncidentSummaryRequest) -> Result<IncidentSummaryResponse> {
        let resp = self
            .client
            .post(format!("{}/summarize-incident", self.base_url))
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Agent(format!(
                "summarize-incident returned status {status}: {body}"
            )));
        }

        Ok(resp.json().await?)
    }
}
