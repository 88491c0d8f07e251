use crate::context::content::MessageContent;
use crate::entities::dao::ChatVersion;
use crate::entities::{Chat, Role, StoredMessage};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

/// `userId` / `chatId` query parameters shared by the chat endpoints.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ChatQuery {
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
}

impl ChatQuery {
    pub fn user_id(&self) -> Option<&str> {
        non_blank(self.user_id.as_deref())
    }

    pub fn chat_id(&self) -> Option<&str> {
        non_blank(self.chat_id.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn known_roles<'de, D>(deserializer: D) -> Result<Vec<StoredMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    let mut messages = Vec::with_capacity(raw.len());
    for entry in raw {
        let role = entry.get("role").cloned().unwrap_or(Value::Null);
        if serde_json::from_value::<Role>(role.clone()).is_err() {
            debug!(role = %role, "dropping message with unsupported role");
            continue;
        }
        messages.push(serde_json::from_value(entry).map_err(D::Error::custom)?);
    }
    Ok(messages)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation as the client sees it; the last entry is the new turn.
    /// Entries whose role is not user, assistant or system are dropped.
    #[serde(default, deserialize_with = "known_roles")]
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<StoredMessage>,
    /// Absent or `"default"` starts a new chat.
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: String,
    pub title: String,
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<StoredMessage>,
    #[schema(value_type = Vec<Object>)]
    pub versions: Vec<ChatVersion>,
    pub current_version_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    /// Short preview of the latest message.
    pub preview: String,
}

/// `PATCH /chat` body, discriminated by `action`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ChatAction {
    Rename {
        title: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateMessage {
        message_index: usize,
        #[schema(value_type = Object)]
        new_content: MessageContent,
    },
    #[serde(rename_all = "camelCase")]
    RegenerateFromMessage {
        message_index: usize,
    },
    RemoveLastAssistant,
    #[serde(rename_all = "camelCase")]
    SwitchVersion {
        version_id: String,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatResponse>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self { success: true, chat: None }
    }

    pub fn with_chat(chat: &Chat) -> Self {
        Self { success: true, chat: Some(chat.to_response()) }
    }
}

impl Chat {
    pub fn to_response(&self) -> ChatResponse {
        ChatResponse {
            id: self.chat_id.clone(),
            title: self.display_title(),
            messages: self.messages.clone(),
            versions: self.versions.clone(),
            current_version_id: self.current_version_id.clone(),
        }
    }

    pub fn to_summary(&self) -> ChatSummary {
        ChatSummary {
            id: self.chat_id.clone(),
            title: self.display_title(),
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
            preview: self
                .messages
                .last()
                .map(|m| m.content.preview())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn actions_parse_by_tag() {
        let action: ChatAction = serde_json::from_value(json!({ "action": "rename", "title": "New" })).unwrap();
        assert!(matches!(action, ChatAction::Rename { title } if title == "New"));

        let action: ChatAction =
            serde_json::from_value(json!({ "action": "updateMessage", "messageIndex": 2, "newContent": "x" }))
                .unwrap();
        assert!(matches!(action, ChatAction::UpdateMessage { message_index: 2, .. }));

        let action: ChatAction = serde_json::from_value(json!({ "action": "removeLastAssistant" })).unwrap();
        assert!(matches!(action, ChatAction::RemoveLastAssistant));

        let action: ChatAction =
            serde_json::from_value(json!({ "action": "switchVersion", "versionId": "version_1_a" })).unwrap();
        assert!(matches!(action, ChatAction::SwitchVersion { version_id } if version_id == "version_1_a"));
    }

    #[test]
    fn malformed_actions_are_rejected() {
        assert!(serde_json::from_value::<ChatAction>(json!({ "action": "explode" })).is_err());
        assert!(serde_json::from_value::<ChatAction>(json!({ "action": "regenerateFromMessage" })).is_err());
        assert!(
            serde_json::from_value::<ChatAction>(json!({ "action": "regenerateFromMessage", "messageIndex": -1 }))
                .is_err()
        );
        assert!(serde_json::from_value::<ChatAction>(json!({ "title": "x" })).is_err());
    }

    #[test]
    fn unsupported_roles_are_dropped_from_requests() {
        let request: ChatRequest = serde_json::from_value(json!({
            "messages": [
                { "role": "data", "content": "tool output" },
                { "content": "no role at all" },
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hello" }
            ],
            "userId": "u1"
        }))
        .unwrap();
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(request.messages[1].content, MessageContent::from("hello"));
    }

    #[test]
    fn malformed_messages_with_known_roles_still_fail() {
        let result = serde_json::from_value::<ChatRequest>(json!({
            "messages": [{ "role": "user", "content": 42 }]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn blank_query_values_count_as_missing() {
        let query = ChatQuery { user_id: Some("  ".into()), chat_id: Some("c1".into()) };
        assert_eq!(query.user_id(), None);
        assert_eq!(query.chat_id(), Some("c1"));
    }
}
