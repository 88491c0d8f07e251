use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Request bodies up to this size are buffered and logged when they are JSON.
const MAX_LOGGED_BODY: usize = 1024;

/// Opens an `http_request` span per request, logs start and finish, and echoes
/// the trace id on the response.
///
/// Response bodies are never buffered so streamed completions pass through.
pub async fn trace_middleware(
    State(_state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let (parts, body) = req.into_parts();

        let body = if is_small_json(&parts.headers) {
            match body.collect().await {
                Ok(collected) => {
                    let bytes = collected.to_bytes();
                    log_body(&bytes);
                    Body::from(bytes)
                }
                Err(e) => {
                    warn!(error = %e, "failed to read request body");
                    Body::empty()
                }
            }
        } else {
            body
        };

        let mut req = Request::from_parts(parts, body);
        if let Some(value) = &trace_header {
            req.headers_mut().insert(X_TRACE_ID, value.clone());
        }

        let mut response = next.run(req).await;
        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

fn is_small_json(headers: &HeaderMap) -> bool {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    is_json && length.is_some_and(|len| len <= MAX_LOGGED_BODY)
}

fn log_body(bytes: &Bytes) {
    match std::str::from_utf8(bytes) {
        Ok(text) => info!(body = %text, "request body"),
        Err(_) => info!(size = bytes.len(), "request body [non-utf8]"),
    }
}
