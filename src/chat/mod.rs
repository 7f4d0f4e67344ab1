//! Streaming chat-completion client for the OpenAI-compatible provider.
//!
//! The provider answers `POST {base}/chat/completions` with `stream: true` as a sequence of
//! `data: {json}` frames terminated by `data: [DONE]`. This module turns the raw byte stream
//! into a stream of content fragments, one item per non-empty delta.

use crate::config::get_config;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised while opening or consuming a streamed completion.
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP layer failed before or while receiving the response.
    #[error("Chat request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("Unexpected provider response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A data frame could not be parsed as a completion chunk.
    #[error("Malformed stream frame: {0}")]
    InvalidFrame(String),
}

/// Stream of incremental content fragments produced by one completion.
pub type TokenStream = BoxStream<'static, Result<String, ChatError>>;

/// Interface for providers able to stream chat completions.
#[async_trait]
pub trait ChatStream: Send + Sync {
    /// Open a streaming completion seeded with a system instruction and a user prompt.
    async fn stream_completion(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<TokenStream, ChatError>;
}

/// OpenAI-compatible chat client.
pub struct OpenAiChatClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) model: String,
}

impl OpenAiChatClient {
    /// Construct a client from the loaded configuration.
    pub fn new() -> Self {
        let config = get_config();
        Self {
            http: Client::builder()
                .user_agent("paperstream/0.1")
                .build()
                .expect("Failed to construct reqwest::Client for chat"),
            base_url: config.openai_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.chat_model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatStream for OpenAiChatClient {
    async fn stream_completion(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<TokenStream, ChatError> {
        let payload = json!({
            "model": self.model,
            "stream": true,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
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
            return Err(ChatError::UnexpectedStatus { status, body });
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut buffer = String::new();
            'receive: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(ChatError::Http)?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline).collect();
                    let line = line.trim();
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload == "[DONE]" {
                        break 'receive;
                    }
                    let parsed: CompletionChunk = serde_json::from_str(payload)
                        .map_err(|error| ChatError::InvalidFrame(error.to_string()))?;
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content
                            && !content.is_empty()
                        {
                            yield content;
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}
