//! OpenAI-compatible embedding client and dimension discovery.
//!
//! [`OpenAiEmbedder`] calls `POST {base_url}/embeddings` with
//! `{"input": [...], "model": "..."}` and reads `data[].embedding` back in
//! input order. Any OpenAI-compatible server works (vLLM, TEI, Ollama's
//! `/v1`, LiteLLM).
//!
//! # Retry Strategy
//!
//! With `embedding.max_retries > 0`, transient failures are retried with
//! exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other non-2xx → fail immediately
//! - transport errors → retry
//! - backoff: 1s, 2s, 4s, ... (capped at 32s)
//!
//! The default is no retry: the first failure surfaces as a
//! [`ProviderError`].

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use ragline_core::embedding::Embedder;
use ragline_core::error::ProviderError;

use crate::config::{env_secret, EmbeddingConfig, EMBEDDER_API_KEY_ENV};

/// Embedding provider speaking the OpenAI `/embeddings` protocol.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: env_secret(EMBEDDER_API_KEY_ENV),
            max_retries: config.max_retries,
        })
    }

    async fn send_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "input": texts,
            "model": self.model,
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("embedding response: {}", e)))?;
        parse_embedding_response(&json, texts.len())
    }
}

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport(e.to_string())
}

fn should_retry(err: &ProviderError) -> bool {
    match err {
        ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
        ProviderError::Transport(_) => true,
        ProviderError::Malformed(_) => false,
    }
}

/// Parse `{"data": [{"embedding": [...]}, ...]}`.
///
/// A missing `data` array, a missing or non-numeric `embedding`, or a count
/// that differs from the request is an error; vectors are never padded.
pub fn parse_embedding_response(
    json: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProviderError::Malformed("missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let values = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ProviderError::Malformed("missing embedding".to_string()))?;
        let vec = values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| ProviderError::Malformed("non-numeric embedding value".to_string()))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        embeddings.push(vec);
    }

    if embeddings.len() != expected {
        return Err(ProviderError::Malformed(format!(
            "expected {} embeddings, got {}",
            expected,
            embeddings.len()
        )));
    }
    Ok(embeddings)
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0u32;
        loop {
            match self.send_once(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt < self.max_retries && should_retry(&e) => {
                    attempt += 1;
                    let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                    debug!(attempt, ?delay, error = %e, "retrying embedding request");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Process-wide dense dimension, discovered once.
///
/// The first caller embeds the probe text and caches the vector length.
/// Concurrent first callers wait on the same discovery; a failed discovery
/// leaves the cache empty so a later call can try again.
pub struct DimensionProbe {
    probe_text: String,
    dims: OnceCell<usize>,
}

impl DimensionProbe {
    pub fn new(probe_text: impl Into<String>) -> Self {
        Self {
            probe_text: probe_text.into(),
            dims: OnceCell::new(),
        }
    }

    /// Cached dimension, if discovery already ran.
    pub fn cached(&self) -> Option<usize> {
        self.dims.get().copied()
    }

    pub async fn get_or_discover(&self, embedder: &dyn Embedder) -> Result<usize, ProviderError> {
        self.dims
            .get_or_try_init(|| async {
                let vector = embedder.embed_one(&self.probe_text).await?;
                if vector.is_empty() {
                    return Err(ProviderError::Malformed(
                        "probe embedding is empty".to_string(),
                    ));
                }
                info!(
                    model = embedder.model_name(),
                    dims = vector.len(),
                    "discovered embedding dimension"
                );
                Ok(vector.len())
            })
            .await
            .copied()
    }
}
