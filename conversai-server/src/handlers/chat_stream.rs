//! Drives one model completion: relays chunks to the client as they arrive and
//! persists the assistant turn once the stream has finished.

use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info, warn};

use crate::context::to_provider_messages;
use crate::entities::{ChatStore, Role, SqliteStore, StoredMessage};
use crate::ids;
use crate::providers::llm::{GenerationRequest, TextStream};
use crate::state::AppState;

pub const GREETING: &str = "Hello! I'm here to help. How can I assist you today?";
pub const APOLOGY: &str =
    "Sorry, I'm having trouble connecting to my AI service right now. Please try again later.";

/// Chunks buffered between the upstream reader and the client body.
const RELAY_BUFFER: usize = 16;

/// Chat that receives the assistant turn.
#[derive(Debug, Clone)]
pub struct ReplyTarget {
    pub user_id: String,
    pub chat_id: String,
}

type Chunk = Result<Bytes, io::Error>;

fn text_response(status: StatusCode, body: impl Into<Body>) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body.into(),
    )
        .into_response()
}

fn apology() -> Response {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, APOLOGY)
}

/// Streams a reply for `window`.
///
/// The returned handle, when present, completes after the relay has finished
/// and the assistant message has been persisted (or skipped).
pub async fn stream_reply(
    state: &AppState,
    target: ReplyTarget,
    window: &[StoredMessage],
    memory_digest: &str,
) -> (Response, Option<JoinHandle<()>>) {
    if window.is_empty() {
        debug!("empty context window; sending greeting");
        return (text_response(StatusCode::OK, GREETING), None);
    }

    let request = GenerationRequest {
        system_prompt: state.config.system_prompt.clone(),
        messages: to_provider_messages(window, memory_digest),
        max_output_tokens: state.config.max_output_tokens,
        temperature: state.config.temperature,
    };
    let deadline = Instant::now() + state.config.stream_timeout;

    let mut upstream: TextStream = match timeout_at(deadline, state.model.stream(&request)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            error!(model = %state.model.model_id(), error = %e, "failed to start completion");
            return (apology(), None);
        }
        Err(_) => {
            error!(model = %state.model.model_id(), "completion did not start before the deadline");
            return (apology(), None);
        }
    };

    // Nothing is sent to the client until the first chunk proves the
    // upstream healthy, so early failures can still become a 500.
    let first = match timeout_at(deadline, upstream.next()).await {
        Ok(Some(Ok(chunk))) => chunk,
        Ok(Some(Err(e))) => {
            error!(error = %e, "completion failed before the first chunk");
            return (apology(), None);
        }
        Ok(None) => {
            info!("completion finished without text");
            return (text_response(StatusCode::OK, Body::empty()), None);
        }
        Err(_) => {
            error!("no completion chunk before the deadline");
            return (apology(), None);
        }
    };

    let (tx, rx) = mpsc::channel::<Chunk>(RELAY_BUFFER);
    let store = state.store.clone();
    let relay = relay(upstream, first, tx, deadline, store, target).in_current_span();
    let handle = tokio::spawn(relay);

    let body = Body::from_stream(ReceiverStream::new(rx));
    (text_response(StatusCode::OK, body), Some(handle))
}

async fn relay(
    mut upstream: TextStream,
    first: String,
    tx: mpsc::Sender<Chunk>,
    deadline: Instant,
    store: Arc<SqliteStore>,
    target: ReplyTarget,
) {
    let mut text = String::new();
    let mut next = Some(first);

    loop {
        if let Some(chunk) = next.take() {
            if !chunk.is_empty() {
                text.push_str(&chunk);
                if tx.send(Ok(Bytes::from(chunk))).await.is_err() {
                    info!(chat_id = %target.chat_id, "client disconnected; reply discarded");
                    return;
                }
            }
        }

        let item = tokio::select! {
            _ = tx.closed() => {
                info!(chat_id = %target.chat_id, "client disconnected; reply discarded");
                return;
            }
            item = timeout_at(deadline, upstream.next()) => item,
        };

        match item {
            Ok(Some(Ok(chunk))) => next = Some(chunk),
            Ok(Some(Err(e))) => {
                warn!(chat_id = %target.chat_id, error = %e, "completion failed mid-stream");
                let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                return;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(chat_id = %target.chat_id, "completion exceeded its deadline");
                let _ = tx
                    .send(Err(io::Error::new(io::ErrorKind::TimedOut, "completion timed out")))
                    .await;
                return;
            }
        }
    }

    // Close the client body before touching the store.
    drop(tx);

    if text.trim().is_empty() {
        debug!(chat_id = %target.chat_id, "empty completion; nothing persisted");
        return;
    }
    let message = StoredMessage::new(ids::message_id(), Role::Assistant, text.into());
    match store
        .save_message(&target.user_id, Some(&target.chat_id), message)
        .await
    {
        Ok(_) => debug!(chat_id = %target.chat_id, "assistant reply persisted"),
        Err(e) => error!(chat_id = %target.chat_id, error = %e, "failed to persist assistant reply"),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
