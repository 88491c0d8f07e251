use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::content::{MessageContent, nullable_content, truncate_chars};

const TITLE_MAX_CHARS: usize = 50;
const FALLBACK_TITLE_CHARS: usize = 30;
pub const UNTITLED_CHAT: &str = "Untitled Chat";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Descriptor of a file previously sent through the upload endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A message as persisted inside a chat document.
///
/// The same shape is accepted from clients in `POST /chat`, so everything but
/// `role` is optional on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    #[serde(default)]
    pub id: String,
    pub role: Role,
    #[serde(default, deserialize_with = "nullable_content")]
    pub content: MessageContent,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl StoredMessage {
    pub fn new(id: String, role: Role, content: MessageContent) -> Self {
        Self {
            id,
            role,
            content,
            created_at: Utc::now(),
            edited: None,
            original_content: None,
            attachments: None,
        }
    }

    /// Same author and same payload; ids and timestamps are ignored.
    pub fn same_turn(&self, other: &StoredMessage) -> bool {
        self.role == other.role && self.content == other.content
    }
}

/// Snapshot of a chat's message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatVersion {
    pub id: String,
    pub messages: Vec<StoredMessage>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_current: bool,
}

/// A chat document, one row of the `chats` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub chat_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<StoredMessage>,
    pub versions: Vec<ChatVersion>,
    pub current_version_id: Option<String>,
}

impl Chat {
    /// Stored title, or a title derived from the first message for chats
    /// created without one.
    pub fn display_title(&self) -> String {
        if !self.title.trim().is_empty() {
            return self.title.clone();
        }
        match self.messages.first() {
            Some(first) => {
                let text = first.content.display_text();
                if text.trim().is_empty() {
                    UNTITLED_CHAT.to_owned()
                } else {
                    text.chars().take(FALLBACK_TITLE_CHARS).collect()
                }
            }
            None => UNTITLED_CHAT.to_owned(),
        }
    }
}

/// Title assigned to a chat created by its first message.
pub fn derive_title(content: &MessageContent) -> String {
    let display = content.display_text();
    let source = if display.trim().is_empty() {
        content.digest()
    } else {
        display
    };
    truncate_chars(&source, TITLE_MAX_CHARS)
}
