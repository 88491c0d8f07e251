use crate::state::AppState;
use axum::http::HeaderValue;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// CORS layer for the configured origins, or any origin when none are set
/// (suitable for development; set CONVERSAI_CORS_ORIGINS in production).
pub fn cors_layer(state: Arc<AppState>) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers([
            axum::http::HeaderName::from_static(crate::routes::chat::X_CHAT_ID),
            axum::http::HeaderName::from_static(super::trace::X_TRACE_ID),
        ]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}
