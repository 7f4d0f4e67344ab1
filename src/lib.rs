#![deny(missing_docs)]

//! Core library for the PaperStream document server.

/// HTTP routing, SSE attachment, and REST handlers.
pub mod api;
/// Streaming chat-completion client.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction, retry policy, and provider adapter.
pub mod embedding;
/// PDF ingestion pipeline: extraction, splitting, embedding, persistence.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Interactive query pipeline streaming summaries per matched document.
pub mod query;
/// Per-session event sinks for streamed query responses.
pub mod session;
/// Chunk lifecycle records in the external document store.
pub mod status;
/// Vector row persistence and nearest-neighbor lookup.
pub mod vector;
