//! Flapping detection: a fingerprint completing too many firing/resolved
//! cycles inside a sliding window is marked flapping and its notifications
//! are suppressed until it stays quiet long enough.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::FlapConfig;
use crate::error::Result;
use crate::models::{AlertStatus, WebhookAlert};
use crate::repository::AlertStore;
use crate::slack::ChatGateway;

/// Outcome of classifying one webhook delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlapState {
    pub is_flapping: bool,
    /// True exactly once per window: the transition that crossed the
    /// threshold.
    pub is_new_flapping: bool,
    pub cycle_count: i64,
}

/// Per-fingerprint cycle counter over the transition log. Owns the flapping
/// state machine; every transition is persisted through the repository.
pub struct FlappingDetector {
    alerts: Arc<dyn AlertStore>,
    chat: Arc<dyn ChatGateway>,
    config: FlapConfig,
}

impl FlappingDetector {
    #[must_use]
    pub fn new(alerts: Arc<dyn AlertStore>, chat: Arc<dyn ChatGateway>, config: FlapConfig) -> Self {
        Self {
            alerts,
            chat,
            config,
        }
    }

    /// Classify one delivery. `prev_status` is the stored status captured
    /// before the upsert; `None` means the alert is new.
    ///
    /// Cycles are counted on the falling edge (the resolved transition).
    /// A resolved transition for a flapping alert also schedules the
    /// deferred clearance check.
    pub async fn classify(
        &self,
        alert: &WebhookAlert,
        status: AlertStatus,
        prev_status: Option<AlertStatus>,
    ) -> Result<FlapState> {
        let alert_id = &alert.fingerprint;
        let stored = self.alerts.is_alert_flapping(alert_id).await?;

        // No observable transition: new alert, or a repeat of the current
        // status.
        let Some(prev) = prev_status else {
            return Ok(FlapState {
                is_flapping: stored,
                ..FlapState::default()
            });
        };
        if prev == status {
            return Ok(FlapState {
                is_flapping: stored,
                ..FlapState::default()
            });
        }

        let transitioned_at = match status {
            AlertStatus::Firing => alert.starts_at,
            AlertStatus::Resolved => alert.ends_at,
        };
        self.alerts
            .record_state_transition(alert_id, prev, status, transitioned_at)
            .await?;

        if status != AlertStatus::Resolved {
            return Ok(FlapState {
                is_flapping: stored,
                ..FlapState::default()
            });
        }

        let window = self
            .alerts
            .count_flapping_cycles(alert_id, self.config.window)
            .await?;

        let state = if window.opened {
            // First cycle of a fresh window never trips. The window is
            // anchored to the transition's own timestamp so that this
            // cycle is counted by the ones that follow.
            self.alerts
                .open_flap_window(alert_id, transitioned_at)
                .await?;
            FlapState {
                is_flapping: false,
                is_new_flapping: false,
                cycle_count: 1,
            }
        } else if stored {
            self.alerts
                .update_flap_cycle_count(alert_id, window.cycle_count)
                .await?;
            FlapState {
                is_flapping: true,
                is_new_flapping: false,
                cycle_count: window.cycle_count,
            }
        } else if window.cycle_count >= self.config.cycle_threshold {
            self.alerts
                .mark_alert_flapping(alert_id, window.cycle_count, window.window_start)
                .await?;
            info!(
                alert_id = %alert_id,
                cycle_count = window.cycle_count,
                "alert is flapping"
            );
            FlapState {
                is_flapping: true,
                is_new_flapping: true,
                cycle_count: window.cycle_count,
            }
        } else {
            self.alerts
                .update_flap_cycle_count(alert_id, window.cycle_count)
                .await?;
            FlapState {
                is_flapping: false,
                is_new_flapping: false,
                cycle_count: window.cycle_count,
            }
        };

        // The stored flag may still be set even when this classification
        // came back clean (expired window); the deferred check is what
        // clears it.
        if stored || state.is_flapping {
            self.schedule_clearance(alert_id.clone(), alert.ends_at);
        }

        Ok(state)
    }

    /// Timer-driven detached task: once the alert has been quiet for the
    /// clearance period after `resolved_at`, demote it back to normal.
    /// Lost on shutdown, which is fine: the next transition re-evaluates.
    fn schedule_clearance(&self, alert_id: String, resolved_at: DateTime<Utc>) {
        let alerts = Arc::clone(&self.alerts);
        let chat = Arc::clone(&self.chat);
        let clearance = self.config.clearance;

        tokio::spawn(async move {
            let due = resolved_at + clearance;
            let wait = (due - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = run_clearance_check(&*alerts, &*chat, &alert_id, resolved_at).await {
                error!(alert_id = %alert_id, error = %e, "flapping clearance check failed");
            }
        });
    }
}

async fn run_clearance_check(
    alerts: &dyn AlertStore,
    chat: &dyn ChatGateway,
    alert_id: &str,
    resolved_at: DateTime<Utc>,
) -> Result<()> {
    let Some(record) = alerts.get_alert(alert_id).await? else {
        return Ok(());
    };

    if !record.is_flapping {
        return Ok(());
    }
    // Still resolved, and not re-resolved later than what we scheduled on.
    if record.status != AlertStatus::Resolved.as_str() {
        debug!(alert_id = %alert_id, "alert fired again, keeping flapping state");
        return Ok(());
    }
    match record.resolved_at {
        Some(stored) if stored <= resolved_at => {}
        _ => {
            debug!(alert_id = %alert_id, "resolved_at moved forward, keeping flapping state");
            return Ok(());
        }
    }
    if alerts.has_transitions_since(alert_id, resolved_at).await? {
        debug!(alert_id = %alert_id, "new transitions observed, keeping flapping state");
        return Ok(());
    }

    alerts.clear_alert_flapping(alert_id).await?;
    info!(alert_id = %alert_id, "flapping cleared");

    if let Some(thread_ref) = alerts.alert_thread_ref(alert_id).await? {
        let notice = format!(
            "\u{2705} Flapping cleared: `{alert_id}` has been quiet for the \
             clearance window. Notifications resume."
        );
        if let Err(e) = chat.post_to_thread(&thread_ref, &notice).await {
            warn!(alert_id = %alert_id, error = %e, "failed to post clearance notice");
        }
    }

    Ok(())
}
