//! Request / response bodies of the HTTP API.

pub mod chat;
pub mod memories;
pub mod upload;

use serde::Serialize;
use utoipa::ToSchema;

/// `{ "success": true }`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
