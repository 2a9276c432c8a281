//! Ingestion and correlation core for Kubernetes alerting pipelines.
//!
//! Alertmanager webhooks come in, get grouped into incidents, flap-noisy
//! fingerprints are suppressed, notifications fan out to chat with one
//! thread per fingerprint, and AI analysis runs asynchronously with its
//! results threaded back into the same conversation. Resolving an incident
//! triggers a second-stage summary whose embedding is stored for
//! similarity retrieval.

/// Analysis agent client
pub mod agent;

/// Configuration management
pub mod config;

/// Incident correlation
pub mod correlator;

/// Embedding client
pub mod embedding;

/// Error handling
pub mod error;

/// Flapping detection
pub mod flapping;

/// Domain models
pub mod models;

/// Webhook processing pipeline
pub mod pipeline;

/// Durable state
pub mod repository;

/// Resolution orchestration
pub mod resolution;

/// HTTP server
pub mod server;

/// Chat gateway
pub mod slack;

pub use agent::{AgentClient, AnalysisClient};
pub use config::Config;
pub use correlator::IncidentCorrelator;
pub use embedding::{Embedder, EmbeddingClient};
pub use error::{Error, Result};
pub use flapping::{FlapState, FlappingDetector};
pub use pipeline::AlertPipeline;
pub use repository::{AlertStore, EmbeddingStore, IncidentStore, PgRepository};
pub use resolution::ResolutionOrchestrator;
pub use server::{build_router, AppState};
pub use slack::{ChatGateway, SlackGateway};

/// Service name
pub const SERVICE_NAME: &str = "incidentd";
