//! Incident correlation: every firing alert attaches to the single ongoing
//! incident, creating it when none exists.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{Severity, WebhookAlert};
use crate::repository::IncidentStore;

/// Initial title for an incident the pipeline opens on its own.
const ONGOING_TITLE: &str = "Ongoing";

/// Severity placeholder until the first concrete value arrives.
const SEVERITY_UNSET: &str = "TBD";

pub struct IncidentCorrelator {
    incidents: Arc<dyn IncidentStore>,
}

impl IncidentCorrelator {
    #[must_use]
    pub fn new(incidents: Arc<dyn IncidentStore>) -> Self {
        Self { incidents }
    }

    /// Return the current firing incident's id, creating the incident when
    /// none exists. The incident's severity is bumped monotonically towards
    /// the alert's severity either way.
    pub async fn get_or_create(&self, alert: &WebhookAlert) -> Result<String> {
        if let Some(incident) = self.incidents.get_firing_incident().await? {
            self.bump_severity(&incident.incident_id, alert.severity())
                .await;
            return Ok(incident.incident_id);
        }

        match self
            .incidents
            .create_incident(ONGOING_TITLE, SEVERITY_UNSET, alert.starts_at)
            .await
        {
            Ok(incident_id) => {
                info!(incident_id = %incident_id, "created incident");
                self.bump_severity(&incident_id, alert.severity()).await;
                Ok(incident_id)
            }
            Err(Error::Conflict(_)) => {
                // Lost the create race; the winner is the incident to join.
                let incident = self
                    .incidents
                    .get_firing_incident()
                    .await?
                    .ok_or_else(|| Error::NotFound("firing incident".to_string()))?;
                self.bump_severity(&incident.incident_id, alert.severity())
                    .await;
                Ok(incident.incident_id)
            }
            Err(err) => Err(err),
        }
    }

    /// Best effort: a failed bump must not lose the incident assignment.
    async fn bump_severity(&self, incident_id: &str, severity: Option<Severity>) {
        let Some(severity) = severity else { return };
        if let Err(e) = self
            .incidents
            .update_incident_severity(incident_id, severity)
            .await
        {
            warn!(
                incident_id = %incident_id,
                severity = %severity,
                error = %e,
                "failed to bump incident severity"
            );
        }
    }
}
