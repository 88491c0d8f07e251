//! Best-effort bridge between the chat flow and the memory service.
//!
//! Neither direction may fail a chat turn: writes run detached and only log,
//! reads degrade to an empty digest.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entities::StoredMessage;
use crate::providers::memory::{MemoryMessage, MemoryService};

/// Role + digest of every message with non-blank text.
pub fn memory_messages(messages: &[StoredMessage]) -> Vec<MemoryMessage> {
    messages
        .iter()
        .filter_map(|m| {
            let content = m.content.digest();
            (!content.trim().is_empty()).then(|| MemoryMessage {
                role: m.role.as_str().to_owned(),
                content,
            })
        })
        .collect()
}

/// Submits the conversation to the memory service in a detached task.
///
/// Returns `None` when there is nothing to submit.
pub fn sync_to_memory(
    memory: Arc<dyn MemoryService>,
    user_id: &str,
    messages: &[StoredMessage],
) -> Option<JoinHandle<()>> {
    let batch = memory_messages(messages);
    if batch.is_empty() {
        return None;
    }
    let user_id = user_id.to_owned();
    Some(tokio::spawn(async move {
        match memory.add(&user_id, &batch).await {
            Ok(()) => debug!(user_id = %user_id, count = batch.len(), "memory sync completed"),
            Err(e) => warn!(user_id = %user_id, error = %e, "memory sync failed"),
        }
    }))
}

/// All memories of `user_id` joined with `\n`; empty on error or timeout.
pub async fn fetch_memory_context(memory: &dyn MemoryService, user_id: &str, timeout: Duration) -> String {
    match tokio::time::timeout(timeout, memory.get_all(user_id)).await {
        Ok(Ok(records)) => records
            .iter()
            .map(|r| r.memory.as_str())
            .filter(|m| !m.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Ok(Err(e)) => {
            warn!(user_id = %user_id, error = %e, "memory fetch failed");
            String::new()
        }
        Err(_) => {
            warn!(user_id = %user_id, timeout_ms = timeout.as_millis(), "memory fetch timed out");
            String::new()
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::content::{ContentPart, MessageContent};
    use crate::entities::Role;
    use crate::test_support::RecordingMemory;
    use tracing_test::traced_test;

    fn msg(role: Role, content: MessageContent) -> StoredMessage {
        StoredMessage::new("m".into(), role, content)
    }

    #[test]
    fn digests_skip_blank_messages() {
        let messages = vec![
            msg(Role::User, "hello".into()),
            msg(Role::Assistant, "  ".into()),
            msg(
                Role::User,
                MessageContent::Parts(vec![ContentPart::File {
                    data: vec![1],
                    mime_type: "image/png".into(),
                    name: None,
                }]),
            ),
        ];
        let batch = memory_messages(&messages);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], MemoryMessage { role: "user".into(), content: "hello".into() });
        assert_eq!(batch[1].content, "[file attached: unnamed file]");
    }

    #[tokio::test]
    async fn sync_submits_in_the_background() {
        let memory = Arc::new(RecordingMemory::default());
        let handle = sync_to_memory(memory.clone(), "u1", &[msg(Role::User, "I like tea".into())]).unwrap();
        handle.await.unwrap();

        let added = memory.added();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].0, "u1");
        assert_eq!(added[0].1[0].content, "I like tea");
    }

    #[tokio::test]
    async fn nothing_to_sync_spawns_nothing() {
        let memory = Arc::new(RecordingMemory::default());
        assert!(sync_to_memory(memory.clone(), "u1", &[msg(Role::User, " ".into())]).is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn sync_failures_are_only_logged() {
        let memory = Arc::new(RecordingMemory::failing());
        sync_to_memory(memory, "u1", &[msg(Role::User, "hi".into())])
            .unwrap()
            .await
            .unwrap();
        assert!(logs_contain("memory sync failed"));
    }

    #[tokio::test]
    async fn context_joins_memories() {
        let memory = RecordingMemory::with_memories(&["likes tea", "lives in Oslo"]);
        let digest = fetch_memory_context(&memory, "u1", Duration::from_secs(1)).await;
        assert_eq!(digest, "likes tea\nlives in Oslo");
    }

    #[tokio::test]
    #[traced_test]
    async fn context_is_empty_on_failure() {
        let memory = RecordingMemory::failing();
        assert_eq!(fetch_memory_context(&memory, "u1", Duration::from_secs(1)).await, "");
        assert!(logs_contain("memory fetch failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn context_is_empty_on_timeout() {
        let memory = RecordingMemory::with_memories(&["slow"]).delayed(Duration::from_millis(200));
        assert_eq!(fetch_memory_context(&memory, "u1", Duration::from_millis(10)).await, "");
        assert!(logs_contain("memory fetch timed out"));
    }
}
