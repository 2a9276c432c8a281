//! Domain models shared across the pipeline, repository and gateways.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound webhook payload (Alertmanager wire format)
// =============================================================================

/// An Alertmanager webhook delivery: a batch of alerts sharing a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerWebhook {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub group_key: String,
    /// Number of alerts omitted due to `max_alerts`.
    #[serde(default)]
    pub truncated_alerts: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub group_labels: HashMap<String, String>,
    #[serde(default)]
    pub common_labels: HashMap<String, String>,
    #[serde(default)]
    pub common_annotations: HashMap<String, String>,
    #[serde(default, rename = "externalURL")]
    pub external_url: String,
    #[serde(default)]
    pub alerts: Vec<WebhookAlert>,
}

/// One firing or resolving event for a single fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAlert {
    pub status: String,
    /// `alertname`, `severity`, `namespace`, `pod`, ...
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// `summary`, `description`, `runbook_url`, ...
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub starts_at: DateTime<Utc>,
    /// Only meaningful for resolved alerts; firing deliveries carry the
    /// zero timestamp `0001-01-01T00:00:00Z`.
    pub ends_at: DateTime<Utc>,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
    /// Stable hash of the label set; used as the alert's primary key.
    pub fingerprint: String,
}

impl WebhookAlert {
    /// The `alertname` label, or an empty string.
    pub fn alert_name(&self) -> &str {
        self.labels.get("alertname").map_or("", String::as_str)
    }

    /// The raw `severity` label, or an empty string.
    pub fn severity_label(&self) -> &str {
        self.labels.get("severity").map_or("", String::as_str)
    }

    /// Parsed severity, if the label carries a known value.
    pub fn severity(&self) -> Option<Severity> {
        self.severity_label().parse().ok()
    }

    /// Parsed status, if the payload carries a known value.
    pub fn status(&self) -> Option<AlertStatus> {
        self.status.parse().ok()
    }
}

// =============================================================================
// Severity and status
// =============================================================================

/// Severity levels carried by alerts and incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Whether an alert at this severity is forwarded at all. Anything
    /// below warning is dropped before persistence.
    #[must_use]
    pub const fn is_notifiable(&self) -> bool {
        matches!(self, Self::Warning | Self::Critical)
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an alert or incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Resolved => "resolved",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firing" => Ok(Self::Firing),
            "resolved" => Ok(Self::Resolved),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Persisted rows
// =============================================================================

/// A stored alert, keyed by fingerprint.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AlertRecord {
    pub alert_id: String,
    pub incident_id: Option<String>,
    pub alarm_title: String,
    pub severity: String,
    pub status: String,
    pub fired_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub analysis_summary: String,
    pub analysis_detail: String,
    pub thread_ref: String,
    pub labels: serde_json::Value,
    pub annotations: serde_json::Value,
    pub is_flapping: bool,
    pub flap_cycle_count: i32,
    pub flap_window_start: Option<DateTime<Utc>>,
    pub is_enabled: bool,
}

/// A stored incident: a grouping of contemporaneous alerts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct IncidentRecord {
    pub incident_id: String,
    pub title: String,
    pub severity: String,
    pub status: String,
    pub fired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub analysis_summary: String,
    pub analysis_detail: String,
    pub resolved_by: Option<String>,
    pub is_enabled: bool,
}

/// The current cycle window for one fingerprint, as computed by the
/// repository for the flapping detector.
#[derive(Debug, Clone, Copy)]
pub struct FlapWindow {
    /// Resolved transitions observed inside the window, including the one
    /// just recorded.
    pub cycle_count: i64,
    pub window_start: DateTime<Utc>,
    /// True when no window was open (or the previous one expired) and a
    /// fresh window starting now has been handed back.
    pub opened: bool,
}

/// One hit from a similarity search over stored incident summaries.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingMatch {
    pub incident_id: String,
    pub incident_summary: String,
    /// `1 - cosine_distance`, higher is closer.
    pub similarity: f64,
}
