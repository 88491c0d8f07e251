//! Long-term memory endpoints, proxied to the memory service.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::providers::ProviderError;
use crate::schemas::SuccessResponse;
use crate::schemas::memories::{DeleteMemoryQuery, MemoriesResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_memories, delete_memory),
    components(schemas(MemoriesResponse, SuccessResponse))
)]
pub struct MemoriesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/memories/{user_id}", get(list_memories).delete(delete_memory))
}

#[utoipa::path(
    get,
    path = "/memories/{user_id}",
    tag = "memories",
    params(("user_id" = String, Path, description = "Owner of the memories")),
    responses(
        (status = 200, description = "All memories of the user", body = MemoriesResponse),
        (status = 500, description = "Memory service failure"),
    )
)]
pub async fn list_memories(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<MemoriesResponse>, ServerError> {
    let memories = state
        .memory
        .get_all(&user_id)
        .await
        .map_err(|e| ServerError::Upstream("Failed to fetch memories", e))?;
    Ok(Json(MemoriesResponse { memories }))
}

#[utoipa::path(
    delete,
    path = "/memories/{user_id}",
    tag = "memories",
    params(
        ("user_id" = String, Path, description = "Owner of the memory"),
        DeleteMemoryQuery,
    ),
    responses(
        (status = 200, description = "Memory deleted", body = SuccessResponse),
        (status = 400, description = "Missing or invalid id"),
        (status = 500, description = "Memory service failure"),
    )
)]
pub async fn delete_memory(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<DeleteMemoryQuery>,
) -> Result<Json<SuccessResponse>, ServerError> {
    let memory_id = query
        .id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing userId or id".into()))?;
    state
        .memory
        .delete(memory_id)
        .await
        .map_err(|e| match e {
            ProviderError::InvalidRequest(_) => ServerError::BadRequest("Invalid memory id".into()),
            e => ServerError::Upstream("Failed to delete memory", e),
        })?;
    info!(user_id = %user_id, memory_id = %memory_id, "memory deleted");
    Ok(Json(SuccessResponse::ok()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
