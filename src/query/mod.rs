//! Semantic query pipeline: embed, search, and stream per-match summaries.
//!
//! One query fans out into up to `result_limit` concurrent summarization tasks, one per
//! matched document. Each task owns its own event sequence on the shared session channel:
//! a `create` header, a `createLink` pointing at the source blob, then incremental
//! `addMessage` fragments. Failures are scoped to the match they occur in; the other
//! matches keep streaming.

use crate::chat::ChatStream;
use crate::embedding::{EmbeddingError, EmbeddingService, NoopRetryObserver};
use crate::session::{DeliveryError, QueryEvent, SessionSink, SessionSinkRegistry, WHITESPACE_PLACEHOLDER};
use crate::vector::{DocumentMatch, VectorStore, VectorStoreError};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// System instruction seeding every summarization completion.
const SYSTEM_DEFINITION: &str = "This system is designed for managing documents. \
It searches for documents that match the content entered by users, summarizes them, \
and provides the summarized information to the users in an easily understandable and polite manner.";

/// Errors that abort a query before any summarization starts.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query text could not be embedded.
    #[error("Failed to embed query text: {0}")]
    Embedding(#[from] EmbeddingError),
    /// The similarity search against the vector store failed.
    #[error("Similarity search failed: {0}")]
    Vector(#[from] VectorStoreError),
}

/// Coordinates embedding, nearest-neighbor search, and streamed summarization.
pub struct QueryService {
    embedder: Arc<EmbeddingService>,
    vector_store: Arc<dyn VectorStore>,
    chat: Arc<dyn ChatStream>,
    sessions: Arc<SessionSinkRegistry>,
    result_limit: usize,
    event_pacing: Duration,
    blob_account: String,
    blob_container: String,
}

impl QueryService {
    /// Assemble a query service over the supplied collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embedder: Arc<EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatStream>,
        sessions: Arc<SessionSinkRegistry>,
        result_limit: usize,
        event_pacing: Duration,
        blob_account: String,
        blob_container: String,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            chat,
            sessions,
            result_limit,
            event_pacing,
            blob_account,
            blob_container,
        }
    }

    /// Run one query: embed the text, find the nearest matches, and spawn one streaming
    /// summarization task per match. Returns once the tasks are launched; results arrive
    /// on the session's event channel.
    pub async fn run_query(&self, user_text: &str, session_id: Uuid) -> Result<(), QueryError> {
        let sink = self.sessions.get_or_create(session_id);

        let embedding = self
            .embedder
            .embed_with_retry(user_text, &NoopRetryObserver)
            .await?;
        let matches = self
            .vector_store
            .nearest_neighbors(&embedding, self.result_limit)
            .await?;
        debug!(%session_id, matches = matches.len(), "Dispatching summarization tasks");

        for document in matches {
            let task = SummarizeTask {
                chat: Arc::clone(&self.chat),
                sink: sink.clone(),
                event_pacing: self.event_pacing,
                source_url: self.source_url(&document),
                user_text: user_text.to_string(),
                document,
            };
            tokio::spawn(task.run());
        }
        Ok(())
    }

    /// Public URL of the original file, anchored to the matched page.
    fn source_url(&self, document: &DocumentMatch) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}/{}#page={}",
            self.blob_account, self.blob_container, document.file_name, document.page_number
        )
    }
}

/// One matched document's summarization stream.
struct SummarizeTask {
    chat: Arc<dyn ChatStream>,
    sink: SessionSink,
    event_pacing: Duration,
    source_url: String,
    user_text: String,
    document: DocumentMatch,
}

impl SummarizeTask {
    async fn run(self) {
        if let Err(DeliveryError::Closed) = self.stream_summary().await {
            debug!(document_id = %self.document.id, "Consumer detached, stopping stream");
        }
    }

    async fn stream_summary(&self) -> Result<(), DeliveryError> {
        let id = self.document.id;
        self.deliver(QueryEvent::Create { id }).await?;
        self.deliver(QueryEvent::CreateLink {
            id,
            link: self.source_url.clone(),
            page_number: self.document.page_number,
            file_name: self.document.file_name.clone(),
        })
        .await?;

        let prompt = summarization_prompt(&self.document.text, &self.user_text);
        let mut tokens = match self.chat.stream_completion(SYSTEM_DEFINITION, &prompt).await {
            Ok(tokens) => tokens,
            Err(error) => {
                warn!(document_id = %id, error = %error, "Failed to open completion stream");
                return self.report_error(id, &error.to_string()).await;
            }
        };

        while let Some(fragment) = tokens.next().await {
            match fragment {
                Ok(content) => {
                    let message = content.replace(' ', WHITESPACE_PLACEHOLDER);
                    self.deliver(QueryEvent::AddMessage { id, message }).await?;
                }
                Err(error) => {
                    warn!(document_id = %id, error = %error, "Completion stream failed mid-way");
                    return self.report_error(id, &error.to_string()).await;
                }
            }
        }
        Ok(())
    }

    async fn deliver(&self, event: QueryEvent) -> Result<(), DeliveryError> {
        self.sink.emit(event)?;
        tokio::time::sleep(self.event_pacing).await;
        Ok(())
    }

    async fn report_error(&self, id: Uuid, message: &str) -> Result<(), DeliveryError> {
        self.deliver(QueryEvent::Error {
            id,
            message: message.to_string(),
        })
        .await
    }
}

/// Wrap the matched text and the user's question into the summarization prompt.
fn summarization_prompt(document_text: &str, user_text: &str) -> String {
    format!(
        "\"\"\" {document_text} \"\"\" \n\nFrom the above document \"{user_text}\" Please extract the part that describes."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatError, TokenStream};
    use crate::embedding::{EmbeddingBackend, EmbeddingService};
    use crate::vector::{VectorRow, VectorStoreError};
    use async_trait::async_trait;
    use futures_util::stream;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    struct FixedBackend;

    #[async_trait]
    impl EmbeddingBackend for FixedBackend {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.5, 0.5])
        }
    }

    struct FixedMatches {
        matches: Vec<DocumentMatch>,
    }

    #[async_trait]
    impl VectorStore for FixedMatches {
        async fn insert(&self, _row: VectorRow) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn nearest_neighbors(
            &self,
            _embedding: &[f32],
            k: usize,
        ) -> Result<Vec<DocumentMatch>, VectorStoreError> {
            Ok(self.matches.iter().take(k).cloned().collect())
        }
    }

    /// Yields fixed fragments, or fails when the prompt quotes a poisoned document.
    struct ScriptedChat {
        fragments: Vec<String>,
        poison: Option<String>,
    }

    #[async_trait]
    impl ChatStream for ScriptedChat {
        async fn stream_completion(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
        ) -> Result<TokenStream, ChatError> {
            if let Some(poison) = &self.poison
                && user_prompt.contains(poison)
            {
                return Err(ChatError::InvalidFrame("poisoned".into()));
            }
            let fragments: Vec<Result<String, ChatError>> =
                self.fragments.iter().cloned().map(Ok).collect();
            Ok(stream::iter(fragments).boxed())
        }
    }

    fn document(file_name: &str, page_number: u32, text: &str) -> DocumentMatch {
        DocumentMatch {
            id: Uuid::new_v4(),
            text: text.to_string(),
            file_name: file_name.to_string(),
            page_number,
        }
    }

    fn service(
        matches: Vec<DocumentMatch>,
        chat: ScriptedChat,
        sessions: Arc<SessionSinkRegistry>,
    ) -> QueryService {
        QueryService::new(
            Arc::new(EmbeddingService::new(
                Box::new(FixedBackend),
                3,
                Duration::ZERO,
                Duration::ZERO,
            )),
            Arc::new(FixedMatches { matches }),
            Arc::new(chat),
            sessions,
            5,
            Duration::ZERO,
            "unittest".into(),
            "pdfs".into(),
        )
    }

    async fn collect_events(
        receiver: &mut UnboundedReceiver<QueryEvent>,
        count: usize,
    ) -> Vec<QueryEvent> {
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            let event = timeout(Duration::from_secs(2), receiver.recv())
                .await
                .expect("event within deadline")
                .expect("channel open");
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn match_streams_header_link_then_messages() {
        let sessions = Arc::new(SessionSinkRegistry::new());
        let session_id = Uuid::new_v4();
        let mut receiver = sessions.attach(session_id).expect("attach");

        let doc = document("report.pdf", 3, "chapter about turbines");
        let doc_id = doc.id;
        let service = service(
            vec![doc],
            ScriptedChat {
                fragments: vec!["The chapter".into(), " covers turbines.".into()],
                poison: None,
            },
            sessions.clone(),
        );

        service.run_query("turbines", session_id).await.expect("query");
        let events = collect_events(&mut receiver, 4).await;

        assert_eq!(events[0], QueryEvent::Create { id: doc_id });
        assert_eq!(
            events[1],
            QueryEvent::CreateLink {
                id: doc_id,
                link: "https://unittest.blob.core.windows.net/pdfs/report.pdf#page=3".into(),
                page_number: 3,
                file_name: "report.pdf".into(),
            }
        );
        assert_eq!(
            events[2],
            QueryEvent::AddMessage {
                id: doc_id,
                message: "The<SPECIAL_WHITE_SPACE>chapter".into(),
            }
        );
        assert_eq!(
            events[3],
            QueryEvent::AddMessage {
                id: doc_id,
                message: "<SPECIAL_WHITE_SPACE>covers<SPECIAL_WHITE_SPACE>turbines.".into(),
            }
        );
    }

    #[tokio::test]
    async fn each_match_keeps_its_own_event_order() {
        let sessions = Arc::new(SessionSinkRegistry::new());
        let session_id = Uuid::new_v4();
        let mut receiver = sessions.attach(session_id).expect("attach");

        let first = document("a.pdf", 1, "first text");
        let second = document("b.pdf", 2, "second text");
        let ids = [first.id, second.id];
        let service = service(
            vec![first, second],
            ScriptedChat {
                fragments: vec!["summary".into()],
                poison: None,
            },
            sessions.clone(),
        );

        service.run_query("anything", session_id).await.expect("query");
        let events = collect_events(&mut receiver, 6).await;

        for id in ids {
            let kinds: Vec<&str> = events
                .iter()
                .filter(|event| match event {
                    QueryEvent::Create { id: event_id }
                    | QueryEvent::CreateLink { id: event_id, .. }
                    | QueryEvent::AddMessage { id: event_id, .. }
                    | QueryEvent::Error { id: event_id, .. } => *event_id == id,
                })
                .map(|event| match event {
                    QueryEvent::Create { .. } => "create",
                    QueryEvent::CreateLink { .. } => "createLink",
                    QueryEvent::AddMessage { .. } => "addMessage",
                    QueryEvent::Error { .. } => "error",
                })
                .collect();
            assert_eq!(kinds, vec!["create", "createLink", "addMessage"]);
        }
    }

    #[tokio::test]
    async fn chat_failure_is_scoped_to_its_match() {
        let sessions = Arc::new(SessionSinkRegistry::new());
        let session_id = Uuid::new_v4();
        let mut receiver = sessions.attach(session_id).expect("attach");

        let healthy = document("good.pdf", 1, "healthy text");
        let poisoned = document("bad.pdf", 1, "poisoned text");
        let healthy_id = healthy.id;
        let poisoned_id = poisoned.id;
        let service = service(
            vec![healthy, poisoned],
            ScriptedChat {
                fragments: vec!["fine".into()],
                poison: Some("poisoned text".into()),
            },
            sessions.clone(),
        );

        service.run_query("anything", session_id).await.expect("query");
        let events = collect_events(&mut receiver, 6).await;

        let errored: Vec<Uuid> = events
            .iter()
            .filter_map(|event| match event {
                QueryEvent::Error { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(errored, vec![poisoned_id]);

        let healthy_messages = events.iter().any(|event| {
            matches!(event, QueryEvent::AddMessage { id, .. } if *id == healthy_id)
        });
        assert!(healthy_messages);
    }

    #[tokio::test]
    async fn detached_consumer_does_not_fail_the_query() {
        let sessions = Arc::new(SessionSinkRegistry::new());
        let session_id = Uuid::new_v4();
        let receiver = sessions.attach(session_id).expect("attach");
        drop(receiver);

        let service = service(
            vec![document("a.pdf", 1, "text")],
            ScriptedChat {
                fragments: vec!["summary".into()],
                poison: None,
            },
            sessions.clone(),
        );

        service
            .run_query("anything", session_id)
            .await
            .expect("query still succeeds");
    }
}
