//! Record and error types shared by the status store client and its consumers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of one chunk's ingestion.
///
/// The externally visible status never regresses except into
/// [`ChunkStatus::RetryOaiInvocation`], and every chunk that terminates normally ends in
/// exactly one of [`ChunkStatus::Completed`] or [`ChunkStatus::FailedDbInsertion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// The chunk was cut out of its page and its record created.
    PageSeparateFinished,
    /// An embedding attempt failed; another attempt may follow.
    RetryOaiInvocation,
    /// The embedding provider returned a vector for the chunk.
    FinishOaiInvocation,
    /// The vector row was written to the vector store.
    FinishDbInsertion,
    /// The vector store rejected the row; terminal failure.
    FailedDbInsertion,
    /// The chunk finished the full pipeline; terminal success.
    Completed,
}

impl ChunkStatus {
    /// Wire representation used in status-store queries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageSeparateFinished => "page_separate_finished",
            Self::RetryOaiInvocation => "retry_oai_invocation",
            Self::FinishOaiInvocation => "finish_oai_invocation",
            Self::FinishDbInsertion => "finish_db_insertion",
            Self::FailedDbInsertion => "failed_db_insertion",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally persisted lifecycle marker for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    /// Caller-generated unique chunk id.
    pub id: Uuid,
    /// Source file the chunk was extracted from.
    pub file_name: String,
    /// Current lifecycle status.
    pub status: ChunkStatus,
    /// 1-based page number the chunk came from.
    pub page_number: u32,
}

/// Predicate accepted by [`crate::status::StatusStore::query_by_status`].
#[derive(Debug, Clone, Copy)]
pub enum StatusPredicate {
    /// Records whose status equals the given value.
    Is(ChunkStatus),
    /// Records whose status differs from the given value.
    IsNot(ChunkStatus),
}

/// Errors returned while interacting with the status store.
#[derive(Debug, Error)]
pub enum StatusStoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid status store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Store responded with an unexpected status code.
    #[error("Unexpected status store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// No record exists for the requested id.
    #[error("Status record {0} not found")]
    NotFound(Uuid),
}
