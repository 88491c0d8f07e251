//! Mem0 platform REST client.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{MemoryMessage, MemoryRecord, MemoryService};
use crate::providers::{ProviderError, check_status, trim_base_url};

pub const DEFAULT_BASE_URL: &str = "https://api.mem0.ai";

#[derive(Debug, Clone)]
pub struct Mem0Client {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl Mem0Client {
    pub fn new(api_key: Option<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: trim_base_url(base_url),
        }
    }

    fn auth(&self) -> Result<String, ProviderError> {
        self.api_key
            .as_deref()
            .map(|key| format!("Token {key}"))
            .ok_or(ProviderError::NotConfigured("mem0"))
    }

    /// `{base}/v1/memories/{id}/` with the id encoded as a single path segment.
    fn memory_url(&self, memory_id: &str) -> Result<reqwest::Url, ProviderError> {
        if matches!(memory_id, "" | "." | "..") {
            return Err(ProviderError::InvalidRequest(format!("invalid memory id {memory_id:?}")));
        }
        let mut url = reqwest::Url::parse(&format!("{}/v1/memories/", self.base_url))
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Decode(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .push(memory_id)
            .push("");
        Ok(url)
    }
}

#[async_trait]
impl MemoryService for Mem0Client {
    async fn add(&self, user_id: &str, messages: &[MemoryMessage]) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/memories/", self.base_url))
            .header("Authorization", self.auth()?)
            .json(&json!({ "messages": messages, "user_id": user_id }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn get_all(&self, user_id: &str) -> Result<Vec<MemoryRecord>, ProviderError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v1/memories/", self.base_url),
            &[("user_id", user_id)],
        )
        .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .header("Authorization", self.auth()?)
            .send()
            .await?;
        let body: Value = check_status(response).await?.json().await?;

        // The listing is a bare array on v1 and wrapped in `results` on newer
        // API versions.
        let records = match body {
            Value::Object(mut map) => map.remove("results").unwrap_or(Value::Array(vec![])),
            other => other,
        };
        serde_json::from_value(records).map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn delete(&self, memory_id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.memory_url(memory_id)?)
            .header("Authorization", self.auth()?)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
