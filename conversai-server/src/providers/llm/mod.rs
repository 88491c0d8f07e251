pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::ProviderError;
use crate::context::ProviderMessage;

/// Incremental text deltas of one completion.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// One generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Persona prompt; system-role entries of `messages` are appended to it.
    pub system_prompt: String,
    pub messages: Vec<ProviderMessage>,
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
}

/// A streaming text-generation backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Starts a completion.  Errors returned here happen before any text was
    /// produced; errors inside the stream happen after.
    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream, ProviderError>;
}
