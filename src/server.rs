//! HTTP surface: the Alertmanager webhook, the operator resolve action and
//! similarity search.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::AlertmanagerWebhook;
use crate::pipeline::AlertPipeline;
use crate::repository::EmbeddingStore;
use crate::resolution::ResolutionOrchestrator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AlertPipeline>,
    pub resolution: Arc<ResolutionOrchestrator>,
    pub embeddings: Arc<dyn EmbeddingStore>,
    pub embedder: Arc<dyn Embedder>,
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/alertmanager", post(alertmanager_webhook))
        .route(
            "/api/v1/incidents/:id/resolve",
            post(resolve_incident),
        )
        .route("/api/v1/embeddings/search", post(search_embeddings))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Receive an Alertmanager webhook batch.
///
/// Parse failures are a 400; everything past parsing is best-effort and the
/// response only carries the aggregated counters.
async fn alertmanager_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let webhook: AlertmanagerWebhook = match serde_json::from_slice(&body) {
        Ok(webhook) => webhook,
        Err(e) => {
            warn!(error = %e, "failed to parse webhook payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid payload" })),
            )
                .into_response();
        }
    };

    info!(
        status = %webhook.status,
        alert_count = webhook.alerts.len(),
        receiver = %webhook.receiver,
        "received alert webhook"
    );

    let (sent, failed) = state.pipeline.process_webhook(&webhook).await;

    Json(json!({
        "status": "received",
        "alertCount": webhook.alerts.len(),
        "slackSent": sent,
        "slackFailed": failed,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    #[serde(default)]
    resolved_by: String,
}

/// Operator action: close the incident and kick off the summary.
async fn resolve_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<Value>> {
    let resolved_by = if request.resolved_by.is_empty() {
        "operator"
    } else {
        request.resolved_by.as_str()
    };

    state.resolution.resolve(&incident_id, resolved_by).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "incident resolved",
        "incident_id": incident_id,
    })))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    limit: Option<i64>,
}

/// Embed a free-text query and return the nearest incident summaries.
async fn search_embeddings(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Value>> {
    if request.query.trim().is_empty() {
        return Err(Error::InvalidInput("query is required".to_string()));
    }
    let limit = request.limit.unwrap_or(10).clamp(1, 50);

    let (vector, model) = state.embedder.embed(&request.query).await?;
    let results = state.embeddings.search_embeddings(&vector, limit).await?;

    Ok(Json(json!({
        "status": "success",
        "model": model,
        "results": results,
    })))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "incidentd",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
