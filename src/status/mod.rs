//! Chunk lifecycle records persisted in the external document store.
//!
//! The store itself is an external collaborator reached over HTTP; this module holds the
//! record types, the consumed contract as a trait, and the REST client implementing it.

mod client;
mod types;

pub use client::HttpStatusStore;
pub use types::{ChunkStatus, StatusPredicate, StatusRecord, StatusStoreError};

use async_trait::async_trait;
use uuid::Uuid;

/// Consumed contract of the document store holding per-chunk status records.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Persist a brand-new status record. Must complete before any update against the id.
    async fn create(&self, record: StatusRecord) -> Result<(), StatusStoreError>;

    /// Read the current record and write it back with the new status (last-writer-wins).
    async fn update_status(&self, id: Uuid, status: ChunkStatus) -> Result<(), StatusStoreError>;

    /// Return all records matching the predicate, ordered by file name then page number.
    async fn query_by_status(
        &self,
        predicate: StatusPredicate,
    ) -> Result<Vec<StatusRecord>, StatusStoreError>;
}
