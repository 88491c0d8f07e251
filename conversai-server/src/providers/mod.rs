//! Clients for the external services the server depends on.
//!
//! Each concern sits behind a trait so handlers can be exercised with fakes:
//! - [`llm::ChatModel`]: streaming text generation
//! - [`memory::MemoryService`]: per-user long-term memory
//! - [`storage::ObjectStorage`]: file uploads

pub mod llm;
pub mod memory;
pub mod storage;

use thiserror::Error;

/// Failure talking to an external service.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// Passes successful responses through; turns anything else into
/// [`ProviderError::Status`] carrying the response body.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_owned()
}
