//! Embedding provider abstraction, OpenAI-compatible adapter, and retry policy.
//!
//! The provider trait performs exactly one network call; [`EmbeddingService`] layers the
//! bounded retry, the per-failure retry report, and the global post-success throttle on top.

use crate::config::get_config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers and the retry wrapper.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// HTTP layer failed before receiving a response.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("Unexpected provider response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned a well-formed response with no embedding in it.
    #[error("Provider returned no embedding for the input")]
    EmptyResponse,
    /// All attempts failed; the chunk's ingestion is abandoned.
    #[error("Embedding failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Message of the final attempt's error.
        last_error: String,
    },
}

/// Interface implemented by embedding backends. One call, one attempt.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Produce an embedding vector for the supplied text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Side channel notified before each retry so callers can record the attempt externally.
#[async_trait]
pub trait RetryObserver: Send + Sync {
    /// Called after each failed attempt, before the next one starts.
    async fn on_retry(&self, attempt: u32);
}

/// Observer for callers with no status record to update, such as query-side embeddings.
pub struct NoopRetryObserver;

#[async_trait]
impl RetryObserver for NoopRetryObserver {
    async fn on_retry(&self, _attempt: u32) {}
}

/// OpenAI-compatible embeddings client speaking to `POST {base}/embeddings`.
pub struct OpenAiEmbeddingClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) model: String,
}

impl OpenAiEmbeddingClient {
    /// Construct a client from the loaded configuration.
    pub fn new() -> Self {
        let config = get_config();
        Self {
            http: Client::builder()
                .user_agent("paperstream/0.1")
                .build()
                .expect("Failed to construct reqwest::Client for embeddings"),
            base_url: config.openai_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.embedding_model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    total_tokens: u64,
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let payload = json!({
            "model": self.model,
            "input": [text],
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::UnexpectedStatus { status, body });
        }

        let body: EmbeddingResponse = response.json().await?;
        if let Some(usage) = &body.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                total_tokens = usage.total_tokens,
                "Embedding call token usage"
            );
        }

        body.data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or(EmbeddingError::EmptyResponse)
    }
}

/// Retry wrapper around an embedding backend.
///
/// Each failure is reported to the observer before the next attempt; after the final failure
/// the error is surfaced as [`EmbeddingError::Exhausted`] rather than an empty vector. Every
/// successful call is followed by a fixed pacing delay so bursts of chunks do not overload
/// the provider.
pub struct EmbeddingService {
    backend: Box<dyn EmbeddingBackend>,
    retry_limit: u32,
    retry_backoff: Duration,
    pacing: Duration,
}

impl EmbeddingService {
    /// Build a service over an explicit backend and timing parameters.
    pub fn new(
        backend: Box<dyn EmbeddingBackend>,
        retry_limit: u32,
        retry_backoff: Duration,
        pacing: Duration,
    ) -> Self {
        Self {
            backend,
            retry_limit: retry_limit.max(1),
            retry_backoff,
            pacing,
        }
    }

    /// Build a service over the OpenAI-compatible client using configured timing.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            Box::new(OpenAiEmbeddingClient::new()),
            config.embed_retry_limit,
            Duration::from_secs(config.embed_retry_backoff_secs),
            Duration::from_millis(config.embed_pacing_ms),
        )
    }

    /// Embed the text, retrying up to the configured bound.
    pub async fn embed_with_retry(
        &self,
        text: &str,
        observer: &dyn RetryObserver,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.backend.embed(text).await {
                Ok(embedding) => {
                    tokio::time::sleep(self.pacing).await;
                    return Ok(embedding);
                }
                Err(error) => {
                    tracing::warn!(attempt, error = %error, "Embedding attempt failed");
                    observer.on_retry(attempt).await;
                    if attempt >= self.retry_limit {
                        return Err(EmbeddingError::Exhausted {
                            attempts: attempt,
                            last_error: error.to_string(),
                        });
                    }
                    tokio::time::sleep(self.retry_backoff).await;
                }
            }
        }
    }
}
