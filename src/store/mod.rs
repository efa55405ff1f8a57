//! Session-side streaming message store.
//!
//! The store owns the ordered transcript for one chat session. `send`
//! appends a user message and an empty assistant placeholder before any
//! I/O happens, then streams the relay's plain-text response into the
//! placeholder chunk by chunk. All mutation goes through the operations
//! here; readers get cloned snapshots and never observe a torn state.

pub mod message;

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::core::constants::{
    COPY_RESET_DELAY, SEND_FAILURE_NOTICE, SESSION_GREETING, STREAM_ERROR_MARKER,
};
use crate::store::message::StoredMessage;
use crate::utils::decode::StreamDecoder;

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    /// The input was empty or whitespace-only.
    EmptyInput,
    /// A previous send has not settled yet. The store serializes
    /// generations; callers retry after the settle callback fires.
    Busy,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::EmptyInput => write!(f, "message text must not be blank"),
            SendError::Busy => write!(f, "a generation is already in flight"),
        }
    }
}

impl Error for SendError {}

/// Why a stream did not produce a usable assistant reply.
#[derive(Debug)]
enum StreamFailure {
    Transport(reqwest::Error),
    Status(u16),
    /// The relay signaled a mid-stream provider failure via its in-band
    /// marker. The marker is the shared wire convention; the store swaps
    /// it for the fixed apology instead of echoing it.
    InBandMarker,
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFailure::Transport(e) => write!(f, "request failed: {e}"),
            StreamFailure::Status(status) => write!(f, "relay returned status {status}"),
            StreamFailure::InBandMarker => write!(f, "relay reported a mid-stream failure"),
        }
    }
}

struct StoreInner {
    messages: Vec<StoredMessage>,
    next_id: u64,
    /// Placeholder id of the in-flight send, if any.
    streaming: Option<u64>,
}

impl StoreInner {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn find_mut(&mut self, id: u64) -> Option<&mut StoredMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<Mutex<StoreInner>>,
    http: reqwest::Client,
    endpoint: String,
}

impl MessageStore {
    /// Create a store pointed at the relay's chat endpoint, seeded with
    /// the session greeting.
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let mut inner = StoreInner {
            messages: Vec::new(),
            next_id: 0,
            streaming: None,
        };
        let id = inner.allocate_id();
        inner.messages.push(StoredMessage::assistant(id, SESSION_GREETING));

        Self {
            inner: Arc::new(Mutex::new(inner)),
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Snapshot of the transcript in display order.
    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.inner.lock().await.messages.clone()
    }

    /// Append a user message and an assistant placeholder, then stream the
    /// relay's response into the placeholder. Returns the placeholder id.
    ///
    /// `on_settled` fires exactly once per accepted send, on success and
    /// on failure alike.
    pub async fn send(
        &self,
        text: &str,
        on_settled: impl FnOnce() + Send + 'static,
    ) -> Result<u64, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyInput);
        }

        let (history, placeholder_id) = {
            let mut inner = self.inner.lock().await;
            if inner.streaming.is_some() {
                return Err(SendError::Busy);
            }

            let user_id = inner.allocate_id();
            inner.messages.push(StoredMessage::user(user_id, text));

            // Outbound history is built before the placeholder exists, so
            // the empty turn can never leak into its own request. Only
            // messages with content go out; reactions, ids, and timestamps
            // stay local.
            let history: Vec<ChatMessage> = inner
                .messages
                .iter()
                .filter(|m| !m.content.is_empty())
                .map(|m| ChatMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect();

            let placeholder_id = inner.allocate_id();
            inner
                .messages
                .push(StoredMessage::assistant(placeholder_id, ""));
            inner.streaming = Some(placeholder_id);
            (history, placeholder_id)
        };

        let store = self.clone();
        tokio::spawn(async move {
            if let Err(failure) = store.stream_into(history, placeholder_id).await {
                warn!(error = %failure, "chat send failed");
                store
                    .replace_content(placeholder_id, SEND_FAILURE_NOTICE)
                    .await;
            }

            let mut inner = store.inner.lock().await;
            if inner.streaming == Some(placeholder_id) {
                inner.streaming = None;
            }
            drop(inner);

            on_settled();
        });

        Ok(placeholder_id)
    }

    /// Replace the whole transcript with a single fresh assistant message.
    ///
    /// An in-flight stream keeps running but loses its placeholder, so it
    /// stops mutating anything; its settle callback still fires.
    pub async fn clear(&self, notice: &str) {
        let mut inner = self.inner.lock().await;
        let id = inner.allocate_id();
        inner.messages = vec![StoredMessage::assistant(id, notice)];
    }

    /// Toggle the like flag; liking clears a dislike. Unknown ids are a
    /// no-op.
    pub async fn like(&self, id: u64) {
        let mut inner = self.inner.lock().await;
        if let Some(msg) = inner.find_mut(id) {
            msg.liked = !msg.liked;
            if msg.liked {
                msg.disliked = false;
            }
        }
    }

    /// Toggle the dislike flag; disliking clears a like. Unknown ids are a
    /// no-op.
    pub async fn dislike(&self, id: u64) {
        let mut inner = self.inner.lock().await;
        if let Some(msg) = inner.find_mut(id) {
            msg.disliked = !msg.disliked;
            if msg.disliked {
                msg.liked = false;
            }
        }
    }

    /// Flag a message as copied and schedule the automatic reset. The
    /// reset re-resolves the id when it fires, so a message removed by
    /// `clear` in the meantime makes it a silent no-op.
    pub async fn mark_copied(&self, id: u64) {
        {
            let mut inner = self.inner.lock().await;
            let Some(msg) = inner.find_mut(id) else {
                return;
            };
            msg.copied = true;
        }

        let store = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(COPY_RESET_DELAY).await;
            let mut inner = store.inner.lock().await;
            if let Some(msg) = inner.find_mut(id) {
                msg.copied = false;
            }
        });
    }

    /// Stream the relay response into the placeholder. Returns early
    /// without error if the placeholder disappears mid-stream.
    async fn stream_into(
        &self,
        history: Vec<ChatMessage>,
        placeholder_id: u64,
    ) -> Result<(), StreamFailure> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "messages": history }))
            .send()
            .await
            .map_err(StreamFailure::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamFailure::Status(status.as_u16()));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = StreamDecoder::new();
        let mut content = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(StreamFailure::Transport)?;
            content.push_str(&decoder.push(&chunk));

            // Full replacement with the accumulated buffer, not an append:
            // the buffer is the one source of truth across chunk
            // boundaries.
            if !self.replace_content(placeholder_id, &content).await {
                debug!(placeholder_id, "placeholder removed mid-stream, dropping updates");
                return Ok(());
            }
        }

        content.push_str(&decoder.finish());

        if content.ends_with(STREAM_ERROR_MARKER) {
            return Err(StreamFailure::InBandMarker);
        }

        self.replace_content(placeholder_id, &content).await;
        Ok(())
    }

    /// Returns false when the message no longer exists.
    async fn replace_content(&self, id: u64, content: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.find_mut(id) {
            Some(msg) => {
                msg.content = content.to_string();
                true
            }
            None => false,
        }
    }
}
