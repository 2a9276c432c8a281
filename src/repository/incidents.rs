//! Incident rows: the firing singleton, severity escalation and resolution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{IncidentStore, PgRepository};
use crate::error::{Error, Result};
use crate::models::{IncidentRecord, Severity};

const INCIDENT_COLUMNS: &str = r#"
    incident_id, title, severity, status, fired_at, resolved_at,
    analysis_summary, analysis_detail, resolved_by, is_enabled
"#;

#[async_trait]
impl IncidentStore for PgRepository {
    async fn get_firing_incident(&self) -> Result<Option<IncidentRecord>> {
        let row = sqlx::query_as::<_, IncidentRecord>(&format!(
            r#"
            SELECT {INCIDENT_COLUMNS}
            FROM incidents
            WHERE status = 'firing' AND is_enabled = TRUE
            ORDER BY fired_at DESC
            LIMIT 1
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_incident(&self, incident_id: &str) -> Result<Option<IncidentRecord>> {
        let row = sqlx::query_as::<_, IncidentRecord>(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE incident_id = $1"
        ))
        .bind(incident_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_incident(
        &self,
        title: &str,
        severity: &str,
        fired_at: DateTime<Utc>,
    ) -> Result<String> {
        let incident_id = format!("INC-{}", &Uuid::new_v4().simple().to_string()[..8]);

        let result = sqlx::query(
            r#"
            INSERT INTO incidents (incident_id, title, severity, status, fired_at, created_at, updated_at)
            VALUES ($1, $2, $3, 'firing', $4, NOW(), NOW())
            "#,
        )
        .bind(&incident_id)
        .bind(title)
        .bind(severity)
        .bind(fired_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(incident_id),
            // The partial unique index on firing incidents lost the race;
            // the caller re-reads the winner.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(Error::Conflict(
                "another firing incident already exists".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn update_incident_severity(&self, incident_id: &str, severity: Severity) -> Result<()> {
        // Monotone along TBD < info < warning < critical.
        sqlx::query(
            r#"
            UPDATE incidents
            SET severity = $2, updated_at = NOW()
            WHERE incident_id = $1
              AND (
                  severity = 'TBD'
                  OR (severity = 'info' AND $2 IN ('warning', 'critical'))
                  OR (severity = 'warning' AND $2 = 'critical')
              )
            "#,
        )
        .bind(incident_id)
        .bind(severity.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resolve_incident(&self, incident_id: &str, resolved_by: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE incidents
            SET status = 'resolved', resolved_at = NOW(), resolved_by = $2, updated_at = NOW()
            WHERE incident_id = $1 AND status = 'firing'
            "#,
        )
        .bind(incident_id)
        .bind(resolved_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM incidents WHERE incident_id = $1")
                .bind(incident_id)
                .fetch_one(&self.pool)
                .await?;

        if exists > 0 {
            Err(Error::Conflict(format!(
                "incident {incident_id} is not firing"
            )))
        } else {
            Err(Error::NotFound(format!("incident {incident_id}")))
        }
    }

    async fn update_incident_analysis(
        &self,
        incident_id: &str,
        title: &str,
        summary: &str,
        detail: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE incidents
            SET title = COALESCE(NULLIF($2, ''), title),
                analysis_summary = $3,
                analysis_detail = $4,
                updated_at = NOW()
            WHERE incident_id = $1
            "#,
        )
        .bind(incident_id)
        .bind(title)
        .bind(summary)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
