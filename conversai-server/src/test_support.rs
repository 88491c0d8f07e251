//! In-process fakes for the external services.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use serde_json::Map;

use crate::config::Config;
use crate::entities::SqliteStore;
use crate::providers::ProviderError;
use crate::providers::llm::{ChatModel, GenerationRequest, TextStream};
use crate::providers::memory::{MemoryMessage, MemoryRecord, MemoryService};
use crate::providers::storage::{ObjectStorage, StoredObject, UploadFile};
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
enum Ending {
    Complete,
    Error,
    Stall,
}

/// Chat model that replays a fixed script and records its requests.
#[derive(Clone)]
pub struct ScriptedModel {
    chunks: Vec<String>,
    ending: Ending,
    fail_to_start: bool,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedModel {
    fn new(chunks: &[&str], ending: Ending, fail_to_start: bool) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ending,
            fail_to_start,
            requests: Arc::default(),
        }
    }

    pub fn chunks(chunks: &[&str]) -> Self {
        Self::new(chunks, Ending::Complete, false)
    }

    pub fn failing() -> Self {
        Self::new(&[], Ending::Complete, true)
    }

    pub fn error_after(chunks: &[&str]) -> Self {
        Self::new(chunks, Ending::Error, false)
    }

    /// Yields `chunks`, then never finishes.
    pub fn stalled(chunks: &[&str]) -> Self {
        Self::new(chunks, Ending::Stall, false)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_to_start {
            return Err(ProviderError::Status { status: 503, body: "unavailable".into() });
        }
        let head = stream::iter(self.chunks.clone().into_iter().map(Ok));
        let tail: TextStream = match self.ending {
            Ending::Complete => stream::empty().boxed(),
            Ending::Error => stream::once(async { Err(ProviderError::Stream("connection reset".into())) }).boxed(),
            Ending::Stall => stream::pending().boxed(),
        };
        Ok(head.chain(tail).boxed())
    }
}

/// Memory service that records writes and serves canned memories.
#[derive(Default)]
pub struct RecordingMemory {
    memories: Vec<String>,
    fail: bool,
    delay: Option<Duration>,
    added: Mutex<Vec<(String, Vec<MemoryMessage>)>>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingMemory {
    pub fn with_memories(memories: &[&str]) -> Self {
        Self {
            memories: memories.iter().map(|m| m.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn added(&self) -> Vec<(String, Vec<MemoryMessage>)> {
        self.added.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn outage(&self) -> Result<(), ProviderError> {
        if self.fail {
            Err(ProviderError::Status { status: 500, body: "memory outage".into() })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MemoryService for RecordingMemory {
    async fn add(&self, user_id: &str, messages: &[MemoryMessage]) -> Result<(), ProviderError> {
        self.outage()?;
        self.added.lock().unwrap().push((user_id.to_owned(), messages.to_vec()));
        Ok(())
    }

    async fn get_all(&self, _user_id: &str) -> Result<Vec<MemoryRecord>, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outage()?;
        Ok(self
            .memories
            .iter()
            .enumerate()
            .map(|(i, memory)| MemoryRecord {
                id: format!("mem-{i}"),
                memory: memory.clone(),
                extra: Map::new(),
            })
            .collect())
    }

    async fn delete(&self, memory_id: &str) -> Result<(), ProviderError> {
        if matches!(memory_id, "." | "..") {
            return Err(ProviderError::InvalidRequest(memory_id.to_owned()));
        }
        self.outage()?;
        self.deleted.lock().unwrap().push(memory_id.to_owned());
        Ok(())
    }
}

/// Object storage that hands out predictable URLs.
#[derive(Default)]
pub struct FakeStorage {
    fail: bool,
    uploaded: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(&self, file: UploadFile) -> Result<StoredObject, ProviderError> {
        if self.fail {
            return Err(ProviderError::Status { status: 401, body: "bad signature".into() });
        }
        self.uploaded.lock().unwrap().push(file.name.clone());
        Ok(StoredObject {
            id: format!("obj-{}", file.name),
            url: format!("https://files.test/{}", file.name),
        })
    }
}

/// State over a fresh in-memory store, with fake memory and storage.
pub async fn test_state(model: ScriptedModel) -> AppState {
    test_state_with(model, Arc::default(), Arc::default()).await
}

pub async fn test_state_with(
    model: ScriptedModel,
    memory: Arc<RecordingMemory>,
    storage: Arc<FakeStorage>,
) -> AppState {
    AppState {
        config: Arc::new(Config::default()),
        store: Arc::new(SqliteStore::in_memory().await.unwrap()),
        model: Arc::new(model),
        memory,
        storage,
    }
}
