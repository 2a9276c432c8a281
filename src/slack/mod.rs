//! Chat gateway: posts alert cards and threaded replies, and keeps the
//! in-memory fingerprint -> thread map.
//!
//! A bot token is used instead of an incoming webhook because the post
//! response carries the message timestamp, which is what lets resolved
//! alerts, analysis results and clearance notices land in the firing
//! message's thread.

pub mod message;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::{ChatConfig, RefireThreadPolicy};
use crate::error::{Error, Result};
use crate::models::{AlertStatus, WebhookAlert};
use message::{
    color_for, emoji_for, to_chat_markdown, ChatAttachment, ChatField, ChatMessage, ChatResponse,
    FLAPPING_COLOR,
};

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

const CHAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capability set the pipeline and orchestrators depend on; implemented by
/// [`SlackGateway`] and by the in-memory fake in the test suite.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Post an alert card. Firing posts become thread roots; resolved posts
    /// reply into the stored thread when one is known. Returns the
    /// provider's message reference.
    async fn post_alert(
        &self,
        alert: &WebhookAlert,
        status: AlertStatus,
        incident_id: Option<&str>,
    ) -> Result<String>;

    /// Post a reply into an existing thread (analysis results, clearance
    /// notices). Markdown is normalised for the provider.
    async fn post_to_thread(&self, thread_ref: &str, text: &str) -> Result<()>;

    /// Post the one-off flap warning card.
    async fn post_flapping_detected(
        &self,
        alert: &WebhookAlert,
        incident_id: Option<&str>,
        cycle_count: i64,
    ) -> Result<()>;

    fn store_thread_ref(&self, alert_id: &str, thread_ref: &str);

    fn load_thread_ref(&self, alert_id: &str) -> Option<String>;

    fn clear_thread_ref(&self, alert_id: &str);
}

/// Chat gateway backed by the Slack Web API.
pub struct SlackGateway {
    token: String,
    channel_id: String,
    frontend_url: String,
    refire_policy: RefireThreadPolicy,
    client: reqwest::Client,
    base_url: String,

    // fingerprint -> thread root. Best effort; the durable copy lives on
    // the alert row and is repopulated here on read miss.
    thread_map: DashMap<String, String>,
}

impl SlackGateway {
    #[must_use]
    pub fn new(cfg: &ChatConfig, refire_policy: RefireThreadPolicy) -> Self {
        Self {
            token: cfg.token.clone(),
            channel_id: cfg.channel_id.clone(),
            frontend_url: cfg.frontend_url.clone(),
            refire_policy,
            client: reqwest::Client::builder()
                .timeout(CHAT_TIMEOUT)
                .build()
                .expect("reqwest client"),
            base_url: POST_MESSAGE_URL.to_string(),
            thread_map: DashMap::new(),
        }
    }

    /// Override the API endpoint (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Both the token and the channel id are required for posting.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && !self.channel_id.is_empty()
    }

    async fn send(&self, msg: &ChatMessage) -> Result<ChatResponse> {
        if !self.is_configured() {
            return Err(Error::Chat(
                "chat token or channel ID not configured".to_string(),
            ));
        }

        let resp: ChatResponse = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(msg)
            .send()
            .await?
            .json()
            .await?;

        if !resp.ok {
            return Err(Error::Chat(format!("provider error: {}", resp.error)));
        }
        Ok(resp)
    }

    fn incident_field(&self, incident_id: Option<&str>) -> Option<ChatField> {
        let incident_id = incident_id?;
        if self.frontend_url.is_empty() {
            return None;
        }
        Some(ChatField {
            title: "Incident".to_string(),
            value: format!(
                "<{}/incidents/{}|\u{1f50d} Open incident dashboard>",
                self.frontend_url, incident_id
            ),
            short: false,
        })
    }

    fn alert_card(
        &self,
        alert: &WebhookAlert,
        status: AlertStatus,
        incident_id: Option<&str>,
    ) -> ChatAttachment {
        let severity = alert.severity();
        let mut fields = vec![
            ChatField {
                title: "Namespace".to_string(),
                value: alert
                    .labels
                    .get("namespace")
                    .cloned()
                    .unwrap_or_default(),
                short: true,
            },
            ChatField {
                title: "Severity".to_string(),
                value: alert.severity_label().to_string(),
                short: true,
            },
            ChatField {
                title: "Status".to_string(),
                value: status.to_string(),
                short: true,
            },
            ChatField {
                title: "Started".to_string(),
                value: alert.starts_at.to_rfc3339(),
                short: true,
            },
        ];
        if let Some(field) = self.incident_field(incident_id) {
            fields.push(field);
        }

        ChatAttachment {
            color: color_for(status, severity).to_string(),
            title: format!(
                "{} [{}] {}",
                emoji_for(status),
                alert.severity_label(),
                alert.alert_name()
            ),
            text: alert
                .annotations
                .get("description")
                .cloned()
                .unwrap_or_default(),
            footer: Some("incidentd".to_string()),
            footer_icon: Some("https://kubernetes.io/images/favicon.png".to_string()),
            ts: Some(Utc::now().timestamp()),
            fields,
        }
    }
}

#[async_trait]
impl ChatGateway for SlackGateway {
    async fn post_alert(
        &self,
        alert: &WebhookAlert,
        status: AlertStatus,
        incident_id: Option<&str>,
    ) -> Result<String> {
        let mut msg = ChatMessage {
            channel: self.channel_id.clone(),
            text: None,
            attachments: vec![self.alert_card(alert, status, incident_id)],
            thread_ts: None,
        };

        // A re-firing alert keeps replying into its previous thread only
        // under the reply policy; otherwise a firing post starts a fresh
        // root.
        let firing_reply = status == AlertStatus::Firing
            && self.refire_policy == RefireThreadPolicy::Reply
            && self.load_thread_ref(&alert.fingerprint).is_some();

        match status {
            AlertStatus::Resolved => msg.thread_ts = self.load_thread_ref(&alert.fingerprint),
            AlertStatus::Firing if firing_reply => {
                msg.thread_ts = self.load_thread_ref(&alert.fingerprint);
            }
            AlertStatus::Firing => {}
        }

        let resp = self.send(&msg).await?;

        match status {
            AlertStatus::Firing if !firing_reply && !resp.ts.is_empty() => {
                self.store_thread_ref(&alert.fingerprint, &resp.ts);
            }
            AlertStatus::Resolved => self.clear_thread_ref(&alert.fingerprint),
            AlertStatus::Firing => {}
        }

        debug!(
            alert_id = %alert.fingerprint,
            status = %status,
            ts = %resp.ts,
            "posted alert card"
        );
        Ok(resp.ts)
    }

    async fn post_to_thread(&self, thread_ref: &str, text: &str) -> Result<()> {
        let msg = ChatMessage {
            channel: self.channel_id.clone(),
            text: Some(to_chat_markdown(text)),
            attachments: vec![],
            thread_ts: Some(thread_ref.to_string()),
        };
        self.send(&msg).await?;
        Ok(())
    }

    async fn post_flapping_detected(
        &self,
        alert: &WebhookAlert,
        incident_id: Option<&str>,
        cycle_count: i64,
    ) -> Result<()> {
        let mut fields = vec![
            ChatField {
                title: "Cycles".to_string(),
                value: cycle_count.to_string(),
                short: true,
            },
            ChatField {
                title: "Severity".to_string(),
                value: alert.severity_label().to_string(),
                short: true,
            },
            ChatField {
                title: "Namespace".to_string(),
                value: alert
                    .labels
                    .get("namespace")
                    .cloned()
                    .unwrap_or_default(),
                short: true,
            },
        ];
        if let Some(field) = self.incident_field(incident_id) {
            fields.push(field);
        }

        let msg = ChatMessage {
            channel: self.channel_id.clone(),
            text: None,
            attachments: vec![ChatAttachment {
                color: FLAPPING_COLOR.to_string(),
                title: format!("\u{26a0}\u{fe0f} Flapping detected: {}", alert.alert_name()),
                text: format!(
                    "Alert completed {cycle_count} firing/resolved cycles inside the \
                     detection window. Further notifications for this alert are \
                     suppressed until it stabilises."
                ),
                footer: Some("incidentd".to_string()),
                footer_icon: None,
                ts: Some(Utc::now().timestamp()),
                fields,
            }],
            thread_ts: None,
        };
        self.send(&msg).await?;
        Ok(())
    }

    fn store_thread_ref(&self, alert_id: &str, thread_ref: &str) {
        self.thread_map
            .insert(alert_id.to_string(), thread_ref.to_string());
    }

    fn load_thread_ref(&self, alert_id: &str) -> Option<String> {
        self.thread_map.get(alert_id).map(|r| r.value().clone())
    }

    fn clear_thread_ref(&self, alert_id: &str) {
        self.thread_map.remove(alert_id);
    }
}
