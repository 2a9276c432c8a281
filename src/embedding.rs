//! HTTP client for the embedding backend: text in, float vector plus the
//! producing model tag out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const EMBED_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Embedding capability consumed by the resolution orchestrator and the
/// similarity search endpoint.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`, returning the vector and the model that produced it.
    async fn embed(&self, text: &str) -> Result<(Vec<f32>, String)>;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    content: EmbedContent<'a>,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embedding: Option<EmbedValues>,
}

#[derive(Debug, Deserialize)]
struct EmbedValues {
    #[serde(default)]
    values: Vec<f32>,
}

/// Reqwest-backed embedding client (Gemini-style `embedContent` endpoint).
pub struct EmbeddingClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self> {
        if cfg.api_key.is_empty() {
            return Err(Error::Config("missing EMBED_API_KEY".to_string()));
        }
        Ok(Self {
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::builder()
                .timeout(EMBED_TIMEOUT)
                .build()
                .expect("reqwest client"),
        })
    }

    /// Override the API endpoint (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<(Vec<f32>, String)> {
        let request = EmbedRequest {
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
        };

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:embedContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Embedding(format!(
                "embedContent returned status {}",
                resp.status()
            )));
        }

        let body: EmbedResponse = resp.json().await?;
        let values = body
            .embedding
            .map(|e| e.values)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Embedding("empty embedding result".to_string()))?;

        Ok((values, self.model.clone()))
    }
}
