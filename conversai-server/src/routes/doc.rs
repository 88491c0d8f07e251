use crate::routes::{chat, health, memories, upload};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "conversai-server",
    description = "ConversAI chat backend API",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(chat::ChatApi::openapi());
    root.merge(memories::MemoriesApi::openapi());
    root.merge(upload::UploadApi::openapi());
    root
}
