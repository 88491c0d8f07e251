//! File uploads, forwarded to object storage.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use futures::future::try_join_all;
use tracing::{debug, info};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::providers::ProviderError;
use crate::providers::storage::UploadFile;
use crate::schemas::upload::{UploadResponse, UploadedFile};
use crate::state::AppState;

/// Multipart field carrying a file; may repeat.
const FILE_FIELD: &str = "file";
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(OpenApi)]
#[openapi(paths(upload_files), components(schemas(UploadResponse, UploadedFile)))]
pub struct UploadApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/upload",
        post(upload_files).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    )
}

async fn read_files(mut multipart: Multipart) -> Result<Vec<UploadFile>, ServerError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "ignoring multipart field");
            continue;
        }
        let name = field.file_name().unwrap_or(FILE_FIELD).to_owned();
        let content_type = field.content_type().unwrap_or(DEFAULT_CONTENT_TYPE).to_owned();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Invalid multipart body: {e}")))?;
        files.push(UploadFile { name, content_type, bytes });
    }
    Ok(files)
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "upload",
    request_body(content_type = "multipart/form-data", description = "One or more `file` fields"),
    responses(
        (status = 200, description = "Files stored", body = UploadResponse),
        (status = 400, description = "No files uploaded"),
        (status = 500, description = "Storage failure"),
    )
)]
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let files = read_files(multipart).await?;
    if files.is_empty() {
        return Err(ServerError::BadRequest("No files uploaded".into()));
    }

    let uploads = files.into_iter().map(|file| {
        let storage = state.storage.clone();
        async move {
            let name = file.name.clone();
            let kind = file.content_type.clone();
            let stored = storage.upload(file).await?;
            Ok::<_, ProviderError>(UploadedFile {
                id: stored.id,
                name,
                url: stored.url,
                kind,
            })
        }
    });
    let files = try_join_all(uploads)
        .await
        .map_err(|e| ServerError::Upstream("Failed to upload files", e))?;

    info!(count = files.len(), "files uploaded");
    Ok(Json(UploadResponse { files }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
