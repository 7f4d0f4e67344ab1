//! HTTP surface: upload, query, stream, listing, and metrics endpoints.
//!
//! Upload and query handlers accept work and return `202 Accepted` immediately; the
//! pipelines run in detached tasks and report progress through the status store and the
//! session event channels.

use crate::ingest::IngestionPipeline;
use crate::query::QueryService;
use crate::session::{AttachError, SessionSinkRegistry};
use crate::status::{ChunkStatus, StatusPredicate, StatusStore};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion pipeline driving uploaded files.
    pub ingest: Arc<IngestionPipeline>,
    /// Query pipeline producing streamed summaries.
    pub query: Arc<QueryService>,
    /// Session channels consumed by the SSE endpoint.
    pub sessions: Arc<SessionSinkRegistry>,
    /// Status store backing the listing endpoints.
    pub status: Arc<dyn StatusStore>,
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/documents/:file_name", post(upload_document))
        .route("/documents", get(list_documents))
        .route("/query", post(submit_query))
        .route("/stream/:session_id", get(stream_session))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn upload_document(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
    body: Bytes,
) -> Response {
    if !file_name.to_ascii_lowercase().ends_with(".pdf") {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(json!({ "error": "only PDF uploads are supported" })),
        )
            .into_response();
    }

    info!(file = %file_name, bytes = body.len(), "Accepted upload");
    let ingest = Arc::clone(&state.ingest);
    tokio::spawn(async move {
        if let Err(err) = ingest.ingest_file(&file_name, &body).await {
            error!(file = %file_name, error = %err, "Ingestion failed");
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response()
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    text: String,
    session_id: Uuid,
}

async fn submit_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Response {
    info!(session_id = %request.session_id, "Accepted query");
    let query = Arc::clone(&state.query);
    tokio::spawn(async move {
        if let Err(err) = query.run_query(&request.text, request.session_id).await {
            error!(session_id = %request.session_id, error = %err, "Query failed");
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response()
}

async fn stream_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Response {
    let mut receiver = match state.sessions.attach(session_id) {
        Ok(receiver) => receiver,
        Err(AttachError::AlreadyAttached) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": "session stream already has a subscriber" })),
            )
                .into_response();
        }
    };

    info!(%session_id, "Client attached to session stream");
    let stream = async_stream::stream! {
        while let Some(event) = receiver.recv().await {
            match Event::default().json_data(&event) {
                Ok(frame) => yield Ok::<Event, Infallible>(frame),
                Err(err) => warn!(%session_id, error = %err, "Dropping unserializable event"),
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ListParams {
    state: String,
}

async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    let predicate = match params.state.as_str() {
        "registered" => StatusPredicate::Is(ChunkStatus::Completed),
        "failed" => StatusPredicate::IsNot(ChunkStatus::Completed),
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unknown state filter: {other}") })),
            )
                .into_response();
        }
    };

    match state.status.query_by_status(predicate).await {
        Ok(records) => Json(records).into_response(),
        Err(err) => {
            error!(error = %err, "Status store listing failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "status store unavailable" })),
            )
                .into_response()
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    Json(state.ingest.metrics()).into_response()
}
