//! Service entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use incidentd::agent::{AgentClient, AnalysisClient};
use incidentd::config::Config;
use incidentd::correlator::IncidentCorrelator;
use incidentd::embedding::{Embedder, EmbeddingClient};
use incidentd::flapping::FlappingDetector;
use incidentd::pipeline::AlertPipeline;
use incidentd::repository::{AlertStore, EmbeddingStore, IncidentStore, PgRepository};
use incidentd::resolution::ResolutionOrchestrator;
use incidentd::server::{build_router, AppState};
use incidentd::slack::{ChatGateway, SlackGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let repo = PgRepository::connect(&config.database)
        .await
        .context("failed to connect to postgres")?;
    repo.ensure_schema()
        .await
        .context("failed to ensure database schema")?;
    let repo = Arc::new(repo);

    let alerts: Arc<dyn AlertStore> = repo.clone();
    let incidents: Arc<dyn IncidentStore> = repo.clone();
    let embeddings: Arc<dyn EmbeddingStore> = repo.clone();

    let slack = SlackGateway::new(&config.chat, config.refire_thread_policy);
    if !slack.is_configured() {
        warn!("chat gateway not configured; alert notifications will fail until CHAT_TOKEN and CHAT_CHANNEL_ID are set");
    }
    let chat: Arc<dyn ChatGateway> = Arc::new(slack);

    let agent: Arc<dyn AnalysisClient> = Arc::new(AgentClient::new(&config.agent));
    let embedder: Arc<dyn Embedder> = Arc::new(
        EmbeddingClient::new(&config.embedding).context("failed to initialize embedding client")?,
    );

    let correlator = Arc::new(IncidentCorrelator::new(incidents.clone()));
    let flapping = Arc::new(FlappingDetector::new(
        alerts.clone(),
        chat.clone(),
        config.flapping,
    ));
    let pipeline = Arc::new(AlertPipeline::new(
        alerts.clone(),
        chat.clone(),
        agent.clone(),
        correlator,
        flapping,
        config.refire_thread_policy,
    ));
    let resolution = Arc::new(ResolutionOrchestrator::new(
        alerts,
        incidents,
        embeddings.clone(),
        agent,
        embedder.clone(),
    ));

    let state = AppState {
        pipeline,
        resolution,
        embeddings,
        embedder,
    };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("incidentd listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
