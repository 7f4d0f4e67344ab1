use paperstream::api::{self, AppState};
use paperstream::chat::OpenAiChatClient;
use paperstream::embedding::EmbeddingService;
use paperstream::ingest::{IngestionPipeline, PdfTextExtractor};
use paperstream::query::QueryService;
use paperstream::session::SessionSinkRegistry;
use paperstream::status::HttpStatusStore;
use paperstream::vector::PgVectorStore;
use paperstream::{config, logging};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let settings = config::get_config();

    let status_store = Arc::new(
        HttpStatusStore::new().expect("Failed to construct status store client"),
    );
    let vector_store = Arc::new(
        PgVectorStore::connect()
            .await
            .expect("Failed to connect to vector store"),
    );
    vector_store
        .ensure_schema()
        .await
        .expect("Failed to ensure vector store schema");

    let embedder = Arc::new(EmbeddingService::from_config());
    let sessions = Arc::new(SessionSinkRegistry::new());

    let ingest = Arc::new(IngestionPipeline::new(
        Box::new(PdfTextExtractor),
        Arc::clone(&embedder),
        status_store.clone(),
        vector_store.clone(),
        settings.max_chunk_length,
        Duration::from_millis(settings.chunk_pacing_ms),
    ));
    let query = Arc::new(QueryService::new(
        embedder,
        vector_store,
        Arc::new(OpenAiChatClient::new()),
        Arc::clone(&sessions),
        settings.search_result_limit,
        Duration::from_millis(settings.event_pacing_ms),
        settings.blob_account_name.clone(),
        settings.blob_container_name.clone(),
    ));

    let app = api::create_router(AppState {
        ingest,
        query,
        sessions,
        status: status_store,
    });

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

/// Port used when `SERVER_PORT` is not set.
const DEFAULT_PORT: u16 = 8100;

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let port = config::get_config().server_port.unwrap_or(DEFAULT_PORT);
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    Ok((listener, port))
}
