pub mod mem0;

pub use mem0::Mem0Client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ProviderError;

/// One conversation turn submitted for memory extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
}

/// A memory owned by the memory service.  Fields besides `id` and `memory`
/// are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    #[serde(default)]
    pub memory: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-user long-term memory.
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn add(&self, user_id: &str, messages: &[MemoryMessage]) -> Result<(), ProviderError>;

    async fn get_all(&self, user_id: &str) -> Result<Vec<MemoryRecord>, ProviderError>;

    async fn delete(&self, memory_id: &str) -> Result<(), ProviderError>;
}
