//! Resolution orchestration: the operator-facing resolve plus the detached
//! second-stage summary and embedding.

use std::sync::Arc;

use chrono::SecondsFormat;
use tracing::{error, info};

use crate::agent::{AlertSummaryInput, AnalysisClient, IncidentSummaryRequest};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::repository::{AlertStore, EmbeddingStore, IncidentStore};

#[derive(Clone)]
pub struct ResolutionOrchestrator {
    alerts: Arc<dyn AlertStore>,
    incidents: Arc<dyn IncidentStore>,
    embeddings: Arc<dyn EmbeddingStore>,
    agent: Arc<dyn AnalysisClient>,
    embedder: Arc<dyn Embedder>,
}

impl ResolutionOrchestrator {
    #[must_use]
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        incidents: Arc<dyn IncidentStore>,
        embeddings: Arc<dyn EmbeddingStore>,
        agent: Arc<dyn AnalysisClient>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            alerts,
            incidents,
            embeddings,
            agent,
            embedder,
        }
    }

    /// Resolve an incident on behalf of an operator. Returns once the
    /// guarded state transition lands; the summary and embedding run in a
    /// detached task and never affect this response.
    pub async fn resolve(&self, incident_id: &str, resolved_by: &str) -> Result<()> {
        self.incidents
            .resolve_incident(incident_id, resolved_by)
            .await?;
        info!(
            incident_id = %incident_id,
            resolved_by = %resolved_by,
            "incident resolved"
        );

        let this = self.clone();
        let incident_id = incident_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.run_summary(&incident_id).await {
                error!(incident_id = %incident_id, error = %e, "incident summary failed");
            }
        });

        Ok(())
    }

    async fn run_summary(&self, incident_id: &str) -> Result<()> {
        let incident = self
            .incidents
            .get_incident(incident_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("incident {incident_id}")))?;

        let alert_rows = self
            .alerts
            .alerts_with_analysis_by_incident(incident_id)
            .await?;

        let request = IncidentSummaryRequest {
            incident_id: incident.incident_id.clone(),
            title: incident.title.clone(),
            severity: incident.severity.clone(),
            fired_at: incident
                .fired_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            resolved_at: incident
                .resolved_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            alerts: alert_rows
                .iter()
                .map(|a| AlertSummaryInput {
                    fingerprint: a.alert_id.clone(),
                    alert_name: a.alarm_title.clone(),
                    severity: a.severity.clone(),
                    status: a.status.clone(),
                    analysis_summary: a.analysis_summary.clone(),
                    analysis_detail: a.analysis_detail.clone(),
                })
                .collect(),
        };

        info!(
            incident_id = %incident_id,
            alert_count = request.alerts.len(),
            "requesting incident summary"
        );
        let response = self.agent.summarize(&request).await?;

        self.incidents
            .update_incident_analysis(
                incident_id,
                &response.title,
                &response.summary,
                &response.detail,
            )
            .await?;
        info!(incident_id = %incident_id, "incident summary saved");

        if response.summary.is_empty() {
            return Ok(());
        }

        let (vector, model) = self.embedder.embed(&response.summary).await?;
        let embedding_id = self
            .embeddings
            .insert_embedding(incident_id, &response.summary, &model, &vector)
            .await?;
        info!(
            incident_id = %incident_id,
            embedding_id,
            model = %model,
            "embedding stored"
        );

        Ok(())
    }
}
