//! Alert rows, the state-transition log and the flapping columns.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;

use super::{AlertStore, PgRepository};
use crate::error::Result;
use crate::models::{AlertRecord, AlertStatus, FlapWindow, WebhookAlert};

const ALERT_COLUMNS: &str = r#"
    alert_id, incident_id, alarm_title, severity, status,
    fired_at, resolved_at, analysis_summary, analysis_detail,
    thread_ref, labels, annotations,
    is_flapping, flap_cycle_count, flap_window_start, is_enabled
"#;

#[async_trait]
impl AlertStore for PgRepository {
    async fn save_alert(&self, alert: &WebhookAlert, incident_id: Option<&str>) -> Result<()> {
        let severity = match alert.severity_label() {
            "" => "warning",
            s => s,
        };

        sqlx::query(
            r#"
            INSERT INTO alerts (
                alert_id, incident_id, alarm_title, severity, status, fired_at,
                fingerprint, labels, annotations, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (alert_id) DO UPDATE SET
                incident_id = COALESCE(EXCLUDED.incident_id, alerts.incident_id),
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(&alert.fingerprint)
        .bind(incident_id)
        .bind(alert.alert_name())
        .bind(severity)
        .bind(&alert.status)
        .bind(alert.starts_at)
        .bind(&alert.fingerprint)
        .bind(Json(&alert.labels))
        .bind(Json(&alert.annotations))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn alert_status(&self, alert_id: &str) -> Result<Option<AlertStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM alerts WHERE alert_id = $1")
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status.and_then(|s| s.parse().ok()))
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<AlertRecord>> {
        let row = sqlx::query_as::<_, AlertRecord>(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE alert_id = $1"
        ))
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_alert_resolved(
        &self,
        alert_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE alerts
            SET status = 'resolved', resolved_at = $2, updated_at = NOW()
            WHERE alert_id = $1
            "#,
        )
        .bind(alert_id)
        .bind(resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_alert_already_resolved(
        &self,
        alert_id: &str,
        ends_at: DateTime<Utc>,
    ) -> Result<bool> {
        let resolved_at: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT resolved_at FROM alerts WHERE alert_id = $1")
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?;

        // Same or earlier ends_at counts as a duplicate delivery.
        Ok(matches!(resolved_at, Some(Some(stored)) if stored >= ends_at))
    }

    async fn update_alert_thread_ref(&self, alert_id: &str, thread_ref: &str) -> Result<()> {
        sqlx::query("UPDATE alerts SET thread_ref = $2, updated_at = NOW() WHERE alert_id = $1")
            .bind(alert_id)
            .bind(thread_ref)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn alert_thread_ref(&self, alert_id: &str) -> Result<Option<String>> {
        let thread_ref: Option<String> = sqlx::query_scalar(
            "SELECT thread_ref FROM alerts WHERE alert_id = $1 AND thread_ref != ''",
        )
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(thread_ref.filter(|t| !t.is_empty()))
    }

    async fn update_alert_analysis(
        &self,
        alert_id: &str,
        summary: &str,
        detail: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE alerts
            SET analysis_summary = $2, analysis_detail = $3, updated_at = NOW()
            WHERE alert_id = $1
            "#,
        )
        .bind(alert_id)
        .bind(summary)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_state_transition(
        &self,
        alert_id: &str,
        from: AlertStatus,
        to: AlertStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_state_transitions (alert_id, from_status, to_status, transitioned_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(alert_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_alert_flapping(&self, alert_id: &str) -> Result<bool> {
        let flapping: Option<bool> =
            sqlx::query_scalar("SELECT is_flapping FROM alerts WHERE alert_id = $1")
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(flapping.unwrap_or(false))
    }

    async fn count_flapping_cycles(&self, alert_id: &str, window: Duration) -> Result<FlapWindow> {
        let window_start: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT flap_window_start FROM alerts WHERE alert_id = $1")
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?;

        let now = Utc::now();
        let fresh = FlapWindow {
            cycle_count: 1,
            window_start: now,
            opened: true,
        };

        let start = match window_start.flatten() {
            None => return Ok(fresh),
            // Expired window: the next cycle starts a new one.
            Some(start) if start < now - window => return Ok(fresh),
            Some(start) => start,
        };

        let cycle_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM alert_state_transitions
            WHERE alert_id = $1
              AND to_status = 'resolved'
              AND transitioned_at >= $2
            "#,
        )
        .bind(alert_id)
        .bind(start)
        .fetch_one(&self.pool)
        .await?;

        Ok(FlapWindow {
            cycle_count,
            window_start: start,
            opened: false,
        })
    }

    async fn open_flap_window(&self, alert_id: &str, window_start: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE alerts
            SET flap_window_start = $2, flap_cycle_count = 1, updated_at = NOW()
            WHERE alert_id = $1
            "#,
        )
        .bind(alert_id)
        .bind(window_start)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_alert_flapping(
        &self,
        alert_id: &str,
        cycle_count: i64,
        window_start: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE alerts
            SET is_flapping = TRUE,
                flap_cycle_count = $2,
                flap_window_start = $3,
                last_flap_notification_at = NOW(),
                updated_at = NOW()
            WHERE alert_id = $1
            "#,
        )
        .bind(alert_id)
        .bind(cycle_count)
        .bind(window_start)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_alert_flapping(&self, alert_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE alerts
            SET is_flapping = FALSE,
                flap_cycle_count = 0,
                flap_window_start = NULL,
                updated_at = NOW()
            WHERE alert_id = $1
            "#,
        )
        .bind(alert_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_flap_cycle_count(&self, alert_id: &str, cycle_count: i64) -> Result<()> {
        sqlx::query("UPDATE alerts SET flap_cycle_count = $2, updated_at = NOW() WHERE alert_id = $1")
            .bind(alert_id)
            .bind(cycle_count)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn has_transitions_since(&self, alert_id: &str, since: DateTime<Utc>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM alert_state_transitions WHERE alert_id = $1 AND transitioned_at > $2",
        )
        .bind(alert_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn alerts_with_analysis_by_incident(
        &self,
        incident_id: &str,
    ) -> Result<Vec<AlertRecord>> {
        let rows = sqlx::query_as::<_, AlertRecord>(&format!(
            r#"
            SELECT {ALERT_COLUMNS}
            FROM alerts
            WHERE incident_id = $1 AND is_enabled = TRUE
            ORDER BY fired_at DESC
            "#
        ))
        .bind(incident_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
