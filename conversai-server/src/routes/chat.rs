//! Chat routes: one streamed completion per `POST`, chat management on
//! `GET` / `PATCH` / `DELETE`.
//!
//! Each `POST /chat` turn:
//! 1. saves the newest client message unless it repeats the last stored one,
//! 2. assembles the context window from stored history and the request,
//! 3. syncs the window to the memory service in the background and reads
//!    the user's memory digest,
//! 4. streams the model's reply, persisting it when the stream completes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::HeaderValue;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tracing::{debug, info};
use utoipa::OpenApi;

use crate::context::build_window;
use crate::entities::{ChatStore, StoredMessage};
use crate::error::ServerError;
use crate::handlers::chat_stream::{ReplyTarget, stream_reply};
use crate::handlers::memory_sync::{fetch_memory_context, sync_to_memory};
use crate::ids;
use crate::schemas::SuccessResponse;
use crate::schemas::chat::{ActionResponse, ChatAction, ChatQuery, ChatRequest, ChatResponse, ChatSummary};
use crate::state::AppState;

/// Response header carrying the chat id a turn was stored under.
pub const X_CHAT_ID: &str = "x-chat-id";

/// Chat bodies may carry inline base64 files.
const MAX_CHAT_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(get_chat, post_chat, patch_chat, delete_chat),
    components(schemas(
        ChatRequest,
        ChatResponse,
        ChatSummary,
        ChatAction,
        ActionResponse,
        SuccessResponse
    ))
)]
pub struct ChatApi;

/// Register chat routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/chat",
        get(get_chat)
            .post(post_chat)
            .patch(patch_chat)
            .delete(delete_chat)
            .layer(DefaultBodyLimit::max(MAX_CHAT_BODY_BYTES)),
    )
}

fn require_user(query: &ChatQuery) -> Result<&str, ServerError> {
    query
        .user_id()
        .ok_or_else(|| ServerError::BadRequest("Missing userId".into()))
}

fn require_user_and_chat(query: &ChatQuery) -> Result<(&str, &str), ServerError> {
    match (query.user_id(), query.chat_id()) {
        (Some(user_id), Some(chat_id)) => Ok((user_id, chat_id)),
        _ => Err(ServerError::BadRequest("Missing userId or chatId".into())),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/chat",
    tag = "chat",
    params(ChatQuery),
    responses(
        (status = 200, description = "One chat when chatId is given, otherwise the user's chat list", body = ChatResponse),
        (status = 400, description = "Missing userId"),
        (status = 404, description = "Chat not found"),
        (status = 500, description = "Internal error"),
    )
)]
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
) -> Result<Json<Value>, ServerError> {
    let user_id = require_user(&query)?;

    match query.chat_id() {
        Some(chat_id) => {
            let chat = state
                .store
                .get_history(user_id, Some(chat_id))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ServerError::NotFound("Chat not found".into()))?;
            Ok(Json(serde_json::to_value(chat.to_response())?))
        }
        None => {
            let chats = state.store.get_history(user_id, None).await?;
            let summaries: Vec<ChatSummary> = chats.iter().map(|c| c.to_summary()).collect();
            Ok(Json(serde_json::to_value(summaries)?))
        }
    }
}

#[utoipa::path(
    post,
    path = "/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Streamed plain-text reply; the chat id is in the x-chat-id header", content_type = "text/plain"),
        (status = 400, description = "Missing userId or malformed body"),
        (status = 500, description = "Model unavailable (plain-text apology) or internal error"),
    )
)]
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(req) = payload?;
    let user_id = req
        .user_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing userId".into()))?
        .to_owned();
    let chat_id = match req.chat_id.as_deref() {
        Some(id) if !ids::needs_new_chat_id(Some(id)) => id.to_owned(),
        _ => ids::chat_id(),
    };

    if let Some(incoming) = req.messages.last() {
        save_unless_repeated(&state, &user_id, &chat_id, incoming).await?;
    }

    let history = state
        .store
        .get_history(&user_id, Some(&chat_id))
        .await?
        .into_iter()
        .next()
        .map(|chat| chat.messages)
        .unwrap_or_default();
    let window = build_window(history, &req.messages, state.config.max_context_tokens);
    info!(
        chat_id = %chat_id,
        in_flight = req.messages.len(),
        window = window.len(),
        "context window assembled"
    );

    sync_to_memory(state.memory.clone(), &user_id, &window);
    let memory_digest = fetch_memory_context(state.memory.as_ref(), &user_id, state.config.memory_timeout).await;

    let target = ReplyTarget {
        user_id,
        chat_id: chat_id.clone(),
    };
    let (mut response, _relay) = stream_reply(&state, target, &window, &memory_digest).await;
    if let Ok(value) = HeaderValue::from_str(&chat_id) {
        response.headers_mut().insert(X_CHAT_ID, value);
    }
    Ok(response)
}

/// Stores `incoming` unless it is empty or repeats the chat's last message.
///
/// The read and the write are separate statements; two identical concurrent
/// submissions may both be stored.
async fn save_unless_repeated(
    state: &AppState,
    user_id: &str,
    chat_id: &str,
    incoming: &StoredMessage,
) -> Result<(), ServerError> {
    if !incoming.content.is_non_empty() {
        debug!(chat_id = %chat_id, "incoming message is empty; not saved");
        return Ok(());
    }
    let last = state.store.last_message(user_id, chat_id).await?;
    if last.is_some_and(|last| last.same_turn(incoming)) {
        debug!(chat_id = %chat_id, "incoming message already stored; not saved");
        return Ok(());
    }
    state
        .store
        .save_message(user_id, Some(chat_id), incoming.clone())
        .await?;
    Ok(())
}

#[utoipa::path(
    patch,
    path = "/chat",
    tag = "chat",
    params(ChatQuery),
    request_body = ChatAction,
    responses(
        (status = 200, description = "Action applied", body = ActionResponse),
        (status = 400, description = "Missing ids, unknown action or malformed fields"),
        (status = 404, description = "Chat, message or version not found"),
        (status = 500, description = "Internal error"),
    )
)]
pub async fn patch_chat(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ActionResponse>, ServerError> {
    let (user_id, chat_id) = require_user_and_chat(&query)?;
    let Json(body) = payload.map_err(|e| {
        debug!(error = %e, "rejected chat action body");
        ServerError::BadRequest("Invalid action".into())
    })?;
    let action: ChatAction = serde_json::from_value(body).map_err(|e| {
        debug!(error = %e, "rejected chat action");
        ServerError::BadRequest("Invalid action".into())
    })?;

    let store = &state.store;
    let response = match action {
        ChatAction::Rename { title } => {
            let title = title.trim();
            if title.is_empty() {
                return Err(ServerError::BadRequest("Invalid action".into()));
            }
            if !store.rename_chat(user_id, chat_id, title).await? {
                return Err(ServerError::NotFound("Chat not found".into()));
            }
            ActionResponse::ok()
        }
        ChatAction::UpdateMessage {
            message_index,
            new_content,
        } => {
            if !new_content.is_non_empty() {
                return Err(ServerError::BadRequest("Invalid action".into()));
            }
            let chat = store
                .update_message(user_id, chat_id, message_index, new_content)
                .await?;
            ActionResponse::with_chat(&chat)
        }
        ChatAction::RegenerateFromMessage { message_index } => {
            store
                .regenerate_from_message(user_id, chat_id, message_index)
                .await?;
            ActionResponse::ok()
        }
        ChatAction::RemoveLastAssistant => {
            store.remove_last_assistant_message(user_id, chat_id).await?;
            ActionResponse::ok()
        }
        ChatAction::SwitchVersion { version_id } => {
            let chat = store.switch_to_version(user_id, chat_id, &version_id).await?;
            ActionResponse::with_chat(&chat)
        }
    };
    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/chat",
    tag = "chat",
    params(ChatQuery),
    responses(
        (status = 200, description = "Chat deleted", body = SuccessResponse),
        (status = 400, description = "Missing userId or chatId"),
        (status = 404, description = "Chat not found"),
        (status = 500, description = "Internal error"),
    )
)]
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
) -> Result<Json<SuccessResponse>, ServerError> {
    let (user_id, chat_id) = require_user_and_chat(&query)?;
    if !state.store.delete_chat(user_id, chat_id).await? {
        return Err(ServerError::NotFound("Chat not found".into()));
    }
    Ok(Json(SuccessResponse::ok()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
