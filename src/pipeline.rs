//! The alert pipeline: one webhook batch in, per-alert filter → correlate →
//! persist → flap-classify → chat fanout → detached analysis.
//!
//! Persistence and notification are independent best-effort concerns: a
//! database hiccup is logged and must not drop a notification, and a chat
//! failure never rolls back a stored alert. No per-alert failure fails the
//! batch; the aggregated counters are the only signal back to the caller.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::agent::AnalysisClient;
use crate::config::RefireThreadPolicy;
use crate::correlator::IncidentCorrelator;
use crate::flapping::{FlapState, FlappingDetector};
use crate::models::{AlertStatus, AlertmanagerWebhook, WebhookAlert};
use crate::repository::AlertStore;
use crate::slack::ChatGateway;

enum Outcome {
    Sent,
    Failed,
    Skipped,
}

pub struct AlertPipeline {
    alerts: Arc<dyn AlertStore>,
    chat: Arc<dyn ChatGateway>,
    agent: Arc<dyn AnalysisClient>,
    correlator: Arc<IncidentCorrelator>,
    flapping: Arc<FlappingDetector>,
    refire_policy: RefireThreadPolicy,
}

impl AlertPipeline {
    #[must_use]
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        chat: Arc<dyn ChatGateway>,
        agent: Arc<dyn AnalysisClient>,
        correlator: Arc<IncidentCorrelator>,
        flapping: Arc<FlappingDetector>,
        refire_policy: RefireThreadPolicy,
    ) -> Self {
        Self {
            alerts,
            chat,
            agent,
            correlator,
            flapping,
            refire_policy,
        }
    }

    /// Process one webhook batch, returning `(sent, failed)` chat counters.
    /// Alerts inside a batch are handled sequentially; ordering across
    /// fingerprints is not observable externally.
    pub async fn process_webhook(&self, webhook: &AlertmanagerWebhook) -> (usize, usize) {
        let mut sent = 0;
        let mut failed = 0;

        for alert in &webhook.alerts {
            match self.process_alert(alert).await {
                Outcome::Sent => sent += 1,
                Outcome::Failed => failed += 1,
                Outcome::Skipped => {}
            }
        }

        (sent, failed)
    }

    async fn process_alert(&self, alert: &WebhookAlert) -> Outcome {
        // (a) Severity filter: anything below warning is dropped before it
        // touches persistence or the transition log.
        let Some(severity) = alert.severity() else {
            debug!(
                alert_id = %alert.fingerprint,
                severity = %alert.severity_label(),
                "dropping alert with unknown severity"
            );
            return Outcome::Skipped;
        };
        if !severity.is_notifiable() {
            debug!(
                alert_id = %alert.fingerprint,
                severity = %severity,
                "dropping alert below notification threshold"
            );
            return Outcome::Skipped;
        }
        let Some(status) = alert.status() else {
            warn!(
                alert_id = %alert.fingerprint,
                status = %alert.status,
                "skipping alert with unknown status"
            );
            return Outcome::Skipped;
        };
        if alert.fingerprint.is_empty() {
            warn!("skipping alert without fingerprint");
            return Outcome::Skipped;
        }
        let alert_id = alert.fingerprint.as_str();

        // Captured before the upsert; drives transition logging in the
        // flapping classifier.
        let prev_status = match self.alerts.alert_status(alert_id).await {
            Ok(prev) => prev,
            Err(e) => {
                error!(alert_id = %alert_id, error = %e, "failed to read stored alert status");
                None
            }
        };

        // (b) Correlate. On repository failure the alert is still saved,
        // just without a parent.
        let incident_id = match self.correlator.get_or_create(alert).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(alert_id = %alert_id, error = %e, "failed to correlate incident");
                None
            }
        };

        // (c) Persist.
        if let Err(e) = self.alerts.save_alert(alert, incident_id.as_deref()).await {
            error!(alert_id = %alert_id, error = %e, "failed to save alert");
        }

        // (d) Resolved bookkeeping, with the duplicate-delivery guard.
        if status == AlertStatus::Resolved {
            match self
                .alerts
                .is_alert_already_resolved(alert_id, alert.ends_at)
                .await
            {
                Ok(true) => {
                    debug!(alert_id = %alert_id, "duplicate resolved delivery, skipping");
                    return Outcome::Skipped;
                }
                Ok(false) => {
                    if let Err(e) = self
                        .alerts
                        .update_alert_resolved(alert_id, alert.ends_at)
                        .await
                    {
                        error!(alert_id = %alert_id, error = %e, "failed to update resolved state");
                    }
                }
                Err(e) => {
                    error!(alert_id = %alert_id, error = %e, "failed to check resolved state");
                }
            }
        }

        // Re-notification of an already-firing alert: the upsert refreshed
        // updated_at, nothing else to do.
        if status == AlertStatus::Firing && prev_status == Some(AlertStatus::Firing) {
            debug!(alert_id = %alert_id, "alert already firing, skipping re-notification");
            return Outcome::Skipped;
        }

        // (e) Flapping classification.
        let flap = match self.flapping.classify(alert, status, prev_status).await {
            Ok(state) => state,
            Err(e) => {
                error!(alert_id = %alert_id, error = %e, "flapping classification failed");
                FlapState::default()
            }
        };

        // (f) Fanout decision.
        if flap.is_new_flapping {
            return match self
                .chat
                .post_flapping_detected(alert, incident_id.as_deref(), flap.cycle_count)
                .await
            {
                Ok(()) => {
                    info!(
                        alert_id = %alert_id,
                        cycle_count = flap.cycle_count,
                        "posted flapping warning"
                    );
                    Outcome::Sent
                }
                Err(e) => {
                    error!(alert_id = %alert_id, error = %e, "failed to post flapping warning");
                    Outcome::Failed
                }
            };
        }
        if flap.is_flapping {
            debug!(alert_id = %alert_id, "alert is flapping, suppressing notification");
            return Outcome::Sent;
        }

        // Cold start: the thread map is empty after a restart, the durable
        // ref lives on the alert row. Re-fires only consult it under the
        // reply policy.
        let needs_thread = status == AlertStatus::Resolved
            || self.refire_policy == RefireThreadPolicy::Reply;
        if needs_thread && self.chat.load_thread_ref(alert_id).is_none() {
            if let Ok(Some(thread_ref)) = self.alerts.alert_thread_ref(alert_id).await {
                self.chat.store_thread_ref(alert_id, &thread_ref);
            }
        }

        if let Err(e) = self
            .chat
            .post_alert(alert, status, incident_id.as_deref())
            .await
        {
            error!(alert_id = %alert_id, status = %status, error = %e, "failed to post alert");
            return Outcome::Failed;
        }
        info!(alert_id = %alert_id, status = %status, "sent alert notification");

        // (g) Persist the thread root, (h) schedule analysis.
        if status == AlertStatus::Firing {
            if let Some(thread_ref) = self.chat.load_thread_ref(alert_id) {
                if let Err(e) = self
                    .alerts
                    .update_alert_thread_ref(alert_id, &thread_ref)
                    .await
                {
                    error!(alert_id = %alert_id, error = %e, "failed to persist thread ref");
                }
            }
            self.schedule_analysis(alert.clone(), incident_id);
        }

        Outcome::Sent
    }

    /// Detached analysis task. It outlives the webhook request, never
    /// reports back to it, and the last completion wins on the stored
    /// analysis fields.
    fn schedule_analysis(&self, alert: WebhookAlert, incident_id: Option<String>) {
        let alerts = Arc::clone(&self.alerts);
        let chat = Arc::clone(&self.chat);
        let agent = Arc::clone(&self.agent);

        tokio::spawn(async move {
            let alert_id = alert.fingerprint.clone();

            let thread_ref = match alerts.alert_thread_ref(&alert_id).await {
                Ok(Some(thread_ref)) => thread_ref,
                Ok(None) => {
                    debug!(alert_id = %alert_id, "no thread ref, skipping analysis request");
                    return;
                }
                Err(e) => {
                    error!(alert_id = %alert_id, error = %e, "failed to read thread ref for analysis");
                    return;
                }
            };

            info!(alert_id = %alert_id, thread_ref = %thread_ref, "requesting analysis");
            let response = match agent
                .analyze(&alert, &thread_ref, incident_id.as_deref())
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    error!(alert_id = %alert_id, error = %e, "analysis request failed");
                    return;
                }
            };

            if let Err(e) = alerts
                .update_alert_analysis(&alert_id, response.summary(), response.detail())
                .await
            {
                error!(alert_id = %alert_id, error = %e, "failed to persist analysis");
            }

            let text = if response.analysis.is_empty() {
                response.detail().to_string()
            } else {
                response.analysis.clone()
            };
            if text.is_empty() {
                return;
            }
            if let Err(e) = chat.post_to_thread(&thread_ref, &text).await {
                error!(alert_id = %alert_id, error = %e, "failed to post analysis to thread");
            }
        });
    }
}
