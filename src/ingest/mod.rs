//! Document ingestion: extraction, chunking, embedding, and persistence.
//!
//! [`IngestionPipeline`] drives one uploaded file through the full chunk lifecycle. Chunks
//! belonging to one file are processed strictly sequentially in page order, and each chunk
//! is isolated: a failed chunk records its terminal status and processing moves on to the
//! next one. Every lifecycle transition is mirrored into the status store.

pub mod extract;
pub mod split;

pub use extract::{ExtractError, PageText, PdfTextExtractor, TextExtractor};
pub use split::split_text;

use crate::embedding::{EmbeddingService, RetryObserver};
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::status::{ChunkStatus, StatusRecord, StatusStore};
use crate::vector::{VectorRow, VectorStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Errors that abort ingestion of a whole file before any chunk is processed.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Uploaded file is not a PDF; nothing was ingested.
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),
    /// The uploaded bytes could not be parsed as a document.
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Retry observer that records each failed embedding attempt against the chunk's record.
struct StatusRetryObserver {
    status_store: Arc<dyn StatusStore>,
    chunk_id: Uuid,
}

#[async_trait]
impl RetryObserver for StatusRetryObserver {
    async fn on_retry(&self, attempt: u32) {
        if let Err(error) = self
            .status_store
            .update_status(self.chunk_id, ChunkStatus::RetryOaiInvocation)
            .await
        {
            warn!(chunk_id = %self.chunk_id, attempt, error = %error, "Failed to record retry status");
        }
    }
}

/// Orchestrates extraction, splitting, embedding, and persistence for uploaded files.
pub struct IngestionPipeline {
    extractor: Box<dyn TextExtractor>,
    embedder: Arc<EmbeddingService>,
    status_store: Arc<dyn StatusStore>,
    vector_store: Arc<dyn VectorStore>,
    max_chunk_length: usize,
    chunk_pacing: Duration,
    metrics: IngestMetrics,
}

impl IngestionPipeline {
    /// Assemble a pipeline over the supplied collaborators.
    pub fn new(
        extractor: Box<dyn TextExtractor>,
        embedder: Arc<EmbeddingService>,
        status_store: Arc<dyn StatusStore>,
        vector_store: Arc<dyn VectorStore>,
        max_chunk_length: usize,
        chunk_pacing: Duration,
    ) -> Self {
        Self {
            extractor,
            embedder,
            status_store,
            vector_store,
            max_chunk_length,
            chunk_pacing,
            metrics: IngestMetrics::new(),
        }
    }

    /// Current ingestion counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Ingest one uploaded file end to end.
    ///
    /// Returns an error only when the file as a whole cannot be processed; per-chunk
    /// failures are terminal for that chunk alone and surface through the status store.
    pub async fn ingest_file(&self, file_name: &str, bytes: &[u8]) -> Result<(), IngestError> {
        if !file_name.to_ascii_lowercase().ends_with(".pdf") {
            warn!(file = %file_name, "Rejecting non-PDF upload");
            return Err(IngestError::UnsupportedFile(file_name.to_string()));
        }

        let pages = self.extractor.extract_pages(bytes)?;
        info!(file = %file_name, pages = pages.len(), "Starting ingestion");

        let mut completed: u64 = 0;
        let mut failed: u64 = 0;
        for page in &pages {
            for chunk in split_text(&page.text, self.max_chunk_length) {
                if chunk.is_empty() {
                    continue;
                }
                if self
                    .process_chunk(file_name, page.page_number, &chunk)
                    .await
                {
                    completed += 1;
                    tokio::time::sleep(self.chunk_pacing).await;
                } else {
                    failed += 1;
                }
            }
        }

        self.metrics.record_file(completed, failed);
        info!(file = %file_name, completed, failed, "Ingestion finished");
        Ok(())
    }

    /// Drive one chunk through its lifecycle. Returns whether the chunk completed.
    async fn process_chunk(&self, file_name: &str, page_number: u32, text: &str) -> bool {
        let chunk_id = Uuid::new_v4();

        // The record must exist before any status update against it can succeed.
        let record = StatusRecord {
            id: chunk_id,
            file_name: file_name.to_string(),
            status: ChunkStatus::PageSeparateFinished,
            page_number,
        };
        if let Err(error) = self.status_store.create(record).await {
            warn!(chunk_id = %chunk_id, error = %error, "Failed to create status record, skipping chunk");
            return false;
        }

        let observer = StatusRetryObserver {
            status_store: Arc::clone(&self.status_store),
            chunk_id,
        };
        let embedding = match self.embedder.embed_with_retry(text, &observer).await {
            Ok(embedding) => embedding,
            Err(error) => {
                warn!(chunk_id = %chunk_id, error = %error, "Embedding exhausted, abandoning chunk");
                return false;
            }
        };
        self.record_status(chunk_id, ChunkStatus::FinishOaiInvocation)
            .await;

        let row = VectorRow {
            id: chunk_id,
            embedding,
            text: text.to_string(),
            file_name: file_name.to_string(),
            page_number,
        };
        if let Err(error) = self.vector_store.insert(row).await {
            warn!(chunk_id = %chunk_id, error = %error, "Vector insertion failed");
            self.record_status(chunk_id, ChunkStatus::FailedDbInsertion)
                .await;
            return false;
        }

        self.record_status(chunk_id, ChunkStatus::FinishDbInsertion)
            .await;
        self.record_status(chunk_id, ChunkStatus::Completed).await;
        true
    }

    /// Record a transition without letting a store hiccup abort pipeline progress.
    async fn record_status(&self, chunk_id: Uuid, status: ChunkStatus) {
        if let Err(error) = self.status_store.update_status(chunk_id, status).await {
            warn!(chunk_id = %chunk_id, status = %status, error = %error, "Failed to record status transition");
        }
    }
}
