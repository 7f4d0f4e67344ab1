//! Per-session event channels for streamed query responses.
//!
//! Each interactive client owns one session id and one channel. Query pipeline tasks are the
//! producers; the SSE handler is the single consumer. The registry lives for the whole process
//! and never evicts entries, so a client fleet cycling through many distinct session ids will
//! grow the map without bound. That matches the original design and is deliberately left as a
//! documented limitation rather than silently fixed.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use uuid::Uuid;

/// Placeholder substituted for literal spaces in streamed message fragments so they survive
/// event-stream transport.
pub const WHITESPACE_PLACEHOLDER: &str = "<SPECIAL_WHITE_SPACE>";

/// Wire event delivered to the interactive client.
///
/// Every variant carries the id of the matched document it belongs to so the client can route
/// the event to the correct display area.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum QueryEvent {
    /// Open a new display area for a matched document.
    Create {
        /// Matched document id.
        id: Uuid,
    },
    /// Attach the source link for a matched document.
    CreateLink {
        /// Matched document id.
        id: Uuid,
        /// Public URL of the original file, anchored to the matched page.
        link: String,
        /// Page the match came from.
        page_number: u32,
        /// Original file name.
        file_name: String,
    },
    /// Append an incremental summary fragment to a display area.
    AddMessage {
        /// Matched document id.
        id: Uuid,
        /// Text fragment with spaces replaced by [`WHITESPACE_PLACEHOLDER`].
        message: String,
    },
    /// Report a failure scoped to one matched document's stream.
    Error {
        /// Matched document id.
        id: Uuid,
        /// Human-readable failure description.
        message: String,
    },
}

/// Errors raised when delivering an event to a session channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The consumer detached and the channel was closed; no further events can be delivered.
    #[error("session channel closed by the consumer")]
    Closed,
}

/// Errors raised when a client attaches to a session's stream.
#[derive(Debug, Error)]
pub enum AttachError {
    /// The session's receiving end was already claimed by another subscriber.
    #[error("session stream already has a subscriber")]
    AlreadyAttached,
}

/// Producer handle delivering events into one session's channel.
#[derive(Clone)]
pub struct SessionSink {
    sender: UnboundedSender<QueryEvent>,
}

impl SessionSink {
    /// Deliver one event to the session's consumer.
    pub fn emit(&self, event: QueryEvent) -> Result<(), DeliveryError> {
        self.sender.send(event).map_err(|_| DeliveryError::Closed)
    }
}

struct SessionEntry {
    sender: UnboundedSender<QueryEvent>,
    receiver: Option<UnboundedReceiver<QueryEvent>>,
}

impl SessionEntry {
    fn new() -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

/// Process-wide map from session id to its event channel.
#[derive(Default)]
pub struct SessionSinkRegistry {
    inner: Mutex<HashMap<Uuid, SessionEntry>>,
}

impl SessionSinkRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the sink for a session, creating the channel on first use.
    pub fn get_or_create(&self, session_id: Uuid) -> SessionSink {
        let mut sessions = self.inner.lock().expect("session registry lock poisoned");
        let entry = sessions.entry(session_id).or_insert_with(|| {
            tracing::debug!(%session_id, "Created session sink");
            SessionEntry::new()
        });
        SessionSink {
            sender: entry.sender.clone(),
        }
    }

    /// Claim the consuming end of a session's channel.
    ///
    /// At most one consumer may be attached per session; a second attach fails until the
    /// process restarts, since detached receivers are not returned to the registry.
    pub fn attach(&self, session_id: Uuid) -> Result<UnboundedReceiver<QueryEvent>, AttachError> {
        let mut sessions = self.inner.lock().expect("session registry lock poisoned");
        let entry = sessions
            .entry(session_id)
            .or_insert_with(SessionEntry::new);
        entry.receiver.take().ok_or(AttachError::AlreadyAttached)
    }
}
