//! Shared application state injected into every Axum handler.

use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::entities::SqliteStore;
use crate::providers::llm::ChatModel;
use crate::providers::memory::MemoryService;
use crate::providers::storage::ObjectStorage;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Chat document store.
    pub store: Arc<SqliteStore>,
    pub model: Arc<dyn ChatModel>,
    pub memory: Arc<dyn MemoryService>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("model", &self.model.model_id())
            .finish_non_exhaustive()
    }
}
