//! Durable state: alerts, incidents, state transitions and embeddings.
//!
//! The capability traits below are the seams the pipeline and orchestrators
//! depend on; [`PgRepository`] is the Postgres implementation and the test
//! suite substitutes in-memory fakes.

mod alerts;
mod embeddings;
mod incidents;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::{
    AlertRecord, AlertStatus, EmbeddingMatch, FlapWindow, IncidentRecord, Severity, WebhookAlert,
};

/// Alert persistence consumed by the pipeline and the flapping detector.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Upsert by `alert_id`. On conflict the status moves and an already
    /// assigned `incident_id` is preserved.
    async fn save_alert(&self, alert: &WebhookAlert, incident_id: Option<&str>) -> Result<()>;

    /// Stored status for a fingerprint, `None` when the alert is new.
    async fn alert_status(&self, alert_id: &str) -> Result<Option<AlertStatus>>;

    async fn get_alert(&self, alert_id: &str) -> Result<Option<AlertRecord>>;

    async fn update_alert_resolved(
        &self,
        alert_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<()>;

    /// True iff the stored `resolved_at` is set and not older than `ends_at`,
    /// i.e. this delivery is a duplicate.
    async fn is_alert_already_resolved(
        &self,
        alert_id: &str,
        ends_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn update_alert_thread_ref(&self, alert_id: &str, thread_ref: &str) -> Result<()>;

    async fn alert_thread_ref(&self, alert_id: &str) -> Result<Option<String>>;

    async fn update_alert_analysis(
        &self,
        alert_id: &str,
        summary: &str,
        detail: &str,
    ) -> Result<()>;

    /// Append one row to the transition log.
    async fn record_state_transition(
        &self,
        alert_id: &str,
        from: AlertStatus,
        to: AlertStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn is_alert_flapping(&self, alert_id: &str) -> Result<bool>;

    /// Resolved-edge cycles inside the current window, or a fresh window
    /// when none is open (or the open one expired).
    async fn count_flapping_cycles(&self, alert_id: &str, window: Duration) -> Result<FlapWindow>;

    /// Start a new cycle window at `window_start` with a count of one.
    async fn open_flap_window(&self, alert_id: &str, window_start: DateTime<Utc>) -> Result<()>;

    async fn mark_alert_flapping(
        &self,
        alert_id: &str,
        cycle_count: i64,
        window_start: DateTime<Utc>,
    ) -> Result<()>;

    async fn clear_alert_flapping(&self, alert_id: &str) -> Result<()>;

    async fn update_flap_cycle_count(&self, alert_id: &str, cycle_count: i64) -> Result<()>;

    async fn has_transitions_since(&self, alert_id: &str, since: DateTime<Utc>) -> Result<bool>;

    async fn alerts_with_analysis_by_incident(
        &self,
        incident_id: &str,
    ) -> Result<Vec<AlertRecord>>;
}

/// Incident persistence consumed by the correlator and the resolution
/// orchestrator.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// The unique firing, enabled incident, or `None`.
    async fn get_firing_incident(&self) -> Result<Option<IncidentRecord>>;

    async fn get_incident(&self, incident_id: &str) -> Result<Option<IncidentRecord>>;

    /// Insert a new incident and return its id. Errors with
    /// [`crate::error::Error::Conflict`] when another firing incident
    /// already exists.
    async fn create_incident(
        &self,
        title: &str,
        severity: &str,
        fired_at: DateTime<Utc>,
    ) -> Result<String>;

    /// Conditional monotone bump: TBD < info < warning < critical.
    async fn update_incident_severity(&self, incident_id: &str, severity: Severity) -> Result<()>;

    /// Guarded transition firing -> resolved. Errors with `Conflict` when
    /// the incident exists but is not firing, `NotFound` when it does not
    /// exist.
    async fn resolve_incident(&self, incident_id: &str, resolved_by: &str) -> Result<()>;

    async fn update_incident_analysis(
        &self,
        incident_id: &str,
        title: &str,
        summary: &str,
        detail: &str,
    ) -> Result<()>;
}

/// Embedding persistence and similarity retrieval.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn insert_embedding(
        &self,
        incident_id: &str,
        summary: &str,
        model: &str,
        vector: &[f32],
    ) -> Result<i64>;

    /// Nearest stored summaries by cosine similarity, descending.
    async fn search_embeddings(&self, vector: &[f32], limit: i64) -> Result<Vec<EmbeddingMatch>>;
}

/// Postgres-backed repository over a bounded connection pool.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Connect and ping the database.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.url)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        for query in SCHEMA {
            sqlx::query(query).execute(&self.pool).await?;
        }
        info!("database schema ensured");
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS incidents (
        incident_id TEXT PRIMARY KEY,
        title TEXT NOT NULL DEFAULT '',
        severity TEXT NOT NULL DEFAULT 'TBD',
        status TEXT NOT NULL DEFAULT 'firing',
        fired_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        resolved_at TIMESTAMPTZ,
        analysis_summary TEXT NOT NULL DEFAULT '',
        analysis_detail TEXT NOT NULL DEFAULT '',
        created_by TEXT NOT NULL DEFAULT 'system',
        resolved_by TEXT,
        is_enabled BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS incidents_status_idx ON incidents(status)",
    "CREATE INDEX IF NOT EXISTS incidents_fired_at_idx ON incidents(fired_at DESC)",
    // At most one firing, enabled incident at any time.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS incidents_single_firing_idx
        ON incidents(status) WHERE status = 'firing' AND is_enabled = TRUE
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alerts (
        alert_id TEXT PRIMARY KEY,
        incident_id TEXT,
        alarm_title TEXT NOT NULL DEFAULT '',
        severity TEXT NOT NULL DEFAULT 'warning',
        status TEXT NOT NULL DEFAULT 'firing',
        fired_at TIMESTAMPTZ,
        resolved_at TIMESTAMPTZ,
        analysis_summary TEXT NOT NULL DEFAULT '',
        analysis_detail TEXT NOT NULL DEFAULT '',
        fingerprint TEXT NOT NULL DEFAULT '',
        thread_ref TEXT NOT NULL DEFAULT '',
        labels JSONB NOT NULL DEFAULT '{}',
        annotations JSONB NOT NULL DEFAULT '{}',
        is_flapping BOOLEAN NOT NULL DEFAULT FALSE,
        flap_cycle_count INT NOT NULL DEFAULT 0,
        flap_window_start TIMESTAMPTZ,
        last_flap_notification_at TIMESTAMPTZ,
        is_enabled BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS alerts_incident_id_idx ON alerts(incident_id) WHERE incident_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS alerts_fingerprint_idx ON alerts(fingerprint) WHERE fingerprint != ''",
    "CREATE INDEX IF NOT EXISTS alerts_thread_ref_idx ON alerts(thread_ref) WHERE thread_ref != ''",
    "CREATE INDEX IF NOT EXISTS alerts_status_idx ON alerts(status)",
    "CREATE INDEX IF NOT EXISTS alerts_fired_at_idx ON alerts(fired_at DESC)",
    "CREATE INDEX IF NOT EXISTS alerts_is_flapping_idx ON alerts(is_flapping) WHERE is_flapping = TRUE",
    r#"
    CREATE TABLE IF NOT EXISTS alert_state_transitions (
        transition_id BIGSERIAL PRIMARY KEY,
        alert_id TEXT NOT NULL,
        from_status TEXT NOT NULL,
        to_status TEXT NOT NULL,
        transitioned_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS alert_state_transitions_alert_id_idx ON alert_state_transitions(alert_id, transitioned_at DESC)",
    "CREATE INDEX IF NOT EXISTS alert_state_transitions_time_idx ON alert_state_transitions(transitioned_at DESC)",
    "CREATE EXTENSION IF NOT EXISTS vector",
    r#"
    CREATE TABLE IF NOT EXISTS embeddings (
        id BIGSERIAL PRIMARY KEY,
        incident_id TEXT NOT NULL,
        incident_summary TEXT NOT NULL,
        embedding vector(3072),
        model TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS embeddings_incident_id_idx ON embeddings(incident_id)",
    // 3072-dim vectors exceed the plain vector index limit; index the
    // halfvec cast with cosine ops instead.
    r#"
    CREATE INDEX IF NOT EXISTS embeddings_embedding_idx
        ON embeddings USING hnsw ((embedding::halfvec(3072)) halfvec_cosine_ops)
    "#,
];
