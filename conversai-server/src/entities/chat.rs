use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Sqlite, Transaction};

use crate::context::content::MessageContent;
use crate::entities::dao::{Chat, ChatVersion, Role, StoredMessage, derive_title};
use crate::entities::{SqliteStore, StoreError};
use crate::ids;

/// Chat document persistence, every operation scoped by user.
pub trait ChatStore: Send + Sync + 'static {
    /// Chats of `user_id` (one chat when `chat_id` is given), most recently
    /// active first.  Empty messages found on the way are removed from storage.
    fn get_history(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Chat>, StoreError>> + Send;

    /// Read-only lookup of a single chat.
    fn get_chat(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> impl Future<Output = Result<Option<Chat>, StoreError>> + Send;

    /// Last stored message of a chat, if the chat exists and is not empty.
    fn last_message(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> impl Future<Output = Result<Option<StoredMessage>, StoreError>> + Send;

    /// Appends `message`, creating the chat when `chat_id` is absent, the
    /// `"default"` sentinel, or unknown.  Returns the chat id used.
    fn save_message(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        message: StoredMessage,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    fn delete_chat(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn rename_chat(
        &self,
        user_id: &str,
        chat_id: &str,
        title: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Replaces the content of message `index`, snapshotting the pre-edit
    /// message list as a new version.
    fn update_message(
        &self,
        user_id: &str,
        chat_id: &str,
        index: usize,
        new_content: MessageContent,
    ) -> impl Future<Output = Result<Chat, StoreError>> + Send;

    /// Keeps messages `0..=index` and drops the rest.
    fn regenerate_from_message(
        &self,
        user_id: &str,
        chat_id: &str,
        index: usize,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Restores the message list of `version_id` and marks it current.
    fn switch_to_version(
        &self,
        user_id: &str,
        chat_id: &str,
        version_id: &str,
    ) -> impl Future<Output = Result<Chat, StoreError>> + Send;

    fn remove_last_assistant_message(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

type ChatRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
);

const SELECT_CHAT: &str = "SELECT user_id, chat_id, title, created_at, updated_at, messages, versions, current_version_id \
     FROM chats";

pub(crate) const CHAT_NOT_FOUND: &str = "Chat not found";
pub(crate) const MESSAGE_NOT_FOUND: &str = "Message not found";
pub(crate) const VERSION_NOT_FOUND: &str = "Version not found";
pub(crate) const NO_ASSISTANT_MESSAGE: &str = "No assistant message to remove";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, error = %e, "failed to parse chat timestamp; using now");
        Utc::now()
    })
}

fn decode_row(row: ChatRow) -> Result<Chat, StoreError> {
    let (user_id, chat_id, title, created_at, updated_at, messages, versions, current_version_id) = row;
    Ok(Chat {
        messages: serde_json::from_str(&messages)?,
        versions: serde_json::from_str(&versions)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        user_id,
        chat_id,
        title,
        current_version_id,
    })
}

async fn fetch_for_update(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    chat_id: &str,
) -> Result<Option<Chat>, StoreError> {
    let row: Option<ChatRow> = sqlx::query_as(&format!("{SELECT_CHAT} WHERE user_id = ?1 AND chat_id = ?2"))
        .bind(user_id)
        .bind(chat_id)
        .fetch_optional(&mut **tx)
        .await?;
    row.map(decode_row).transpose()
}

/// Writes back the mutable parts of `chat` and bumps `updated_at`.
async fn write_back(tx: &mut Transaction<'_, Sqlite>, chat: &Chat) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE chats SET messages = ?1, versions = ?2, current_version_id = ?3, updated_at = ?4 \
         WHERE user_id = ?5 AND chat_id = ?6",
    )
    .bind(serde_json::to_string(&chat.messages)?)
    .bind(serde_json::to_string(&chat.versions)?)
    .bind(&chat.current_version_id)
    .bind(timestamp(Utc::now()))
    .bind(&chat.user_id)
    .bind(&chat.chat_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl SqliteStore {
    async fn compact(&self, chat: &Chat) -> Result<(), StoreError> {
        sqlx::query("UPDATE chats SET messages = ?1 WHERE user_id = ?2 AND chat_id = ?3")
            .bind(serde_json::to_string(&chat.messages)?)
            .bind(&chat.user_id)
            .bind(&chat.chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl ChatStore for SqliteStore {
    async fn get_history(&self, user_id: &str, chat_id: Option<&str>) -> Result<Vec<Chat>, StoreError> {
        let rows: Vec<ChatRow> = match chat_id {
            Some(chat_id) => {
                sqlx::query_as(&format!("{SELECT_CHAT} WHERE user_id = ?1 AND chat_id = ?2"))
                    .bind(user_id)
                    .bind(chat_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "{SELECT_CHAT} WHERE user_id = ?1 ORDER BY updated_at DESC, created_at DESC"
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut chats = Vec::with_capacity(rows.len());
        for row in rows {
            let mut chat = decode_row(row)?;
            let before = chat.messages.len();
            chat.messages.retain(|m| m.content.is_non_empty());
            if chat.messages.len() != before {
                if let Err(e) = self.compact(&chat).await {
                    tracing::warn!(
                        chat_id = %chat.chat_id,
                        removed = before - chat.messages.len(),
                        error = %e,
                        "failed to compact empty messages"
                    );
                }
            }
            chats.push(chat);
        }
        Ok(chats)
    }

    async fn get_chat(&self, user_id: &str, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        let row: Option<ChatRow> = sqlx::query_as(&format!("{SELECT_CHAT} WHERE user_id = ?1 AND chat_id = ?2"))
            .bind(user_id)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(decode_row).transpose()
    }

    async fn last_message(&self, user_id: &str, chat_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT json_extract(messages, '$[#-1]') FROM chats WHERE user_id = ?1 AND chat_id = ?2",
        )
        .bind(user_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        match row.and_then(|(raw,)| raw) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_message(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        mut message: StoredMessage,
    ) -> Result<String, StoreError> {
        let chat_id = match chat_id {
            Some(id) if !ids::needs_new_chat_id(Some(id)) => id.to_owned(),
            _ => ids::chat_id(),
        };
        if message.id.is_empty() {
            message.id = ids::message_id();
        }
        let now = Utc::now();
        message.created_at = now;

        // Only a user opening line names a chat; others fall back on read.
        let title = if message.role == Role::User {
            derive_title(&message.content)
        } else {
            String::new()
        };
        let encoded = serde_json::to_string(&message)?;
        let now = timestamp(now);

        // New chats get their title and first message in the same statement
        // that appends to existing ones.
        sqlx::query(
            "INSERT INTO chats (user_id, chat_id, title, created_at, updated_at, messages, versions) \
             VALUES (?1, ?2, ?3, ?4, ?4, json_array(json(?5)), '[]') \
             ON CONFLICT (user_id, chat_id) DO UPDATE SET \
                 messages = json_insert(chats.messages, '$[#]', json(?5)), \
                 updated_at = ?4",
        )
        .bind(user_id)
        .bind(&chat_id)
        .bind(&title)
        .bind(&now)
        .bind(&encoded)
        .execute(&self.pool)
        .await?;

        tracing::debug!(user_id = %user_id, chat_id = %chat_id, role = message.role.as_str(), "message saved");
        Ok(chat_id)
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM chats WHERE user_id = ?1 AND chat_id = ?2")
            .bind(user_id)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn rename_chat(&self, user_id: &str, chat_id: &str, title: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE chats SET title = ?1, updated_at = ?2 WHERE user_id = ?3 AND chat_id = ?4")
            .bind(title)
            .bind(timestamp(Utc::now()))
            .bind(user_id)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_message(
        &self,
        user_id: &str,
        chat_id: &str,
        index: usize,
        new_content: MessageContent,
    ) -> Result<Chat, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut chat = fetch_for_update(&mut tx, user_id, chat_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(MESSAGE_NOT_FOUND.into()))?;

        let snapshot = chat.messages.clone();
        let message = chat
            .messages
            .get_mut(index)
            .ok_or_else(|| StoreError::NotFound(MESSAGE_NOT_FOUND.into()))?;
        if message.original_content.is_none() {
            message.original_content = Some(message.content.clone());
        }
        message.content = new_content;
        message.edited = Some(true);

        let version = ChatVersion {
            id: ids::version_id(),
            messages: snapshot,
            created_at: Utc::now(),
            is_current: false,
        };
        chat.current_version_id = Some(version.id.clone());
        chat.versions.push(version);

        write_back(&mut tx, &chat).await?;
        tx.commit().await?;
        Ok(chat)
    }

    async fn regenerate_from_message(&self, user_id: &str, chat_id: &str, index: usize) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut chat = fetch_for_update(&mut tx, user_id, chat_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(MESSAGE_NOT_FOUND.into()))?;
        if index >= chat.messages.len() {
            return Err(StoreError::NotFound(MESSAGE_NOT_FOUND.into()));
        }
        chat.messages.truncate(index + 1);

        write_back(&mut tx, &chat).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn switch_to_version(&self, user_id: &str, chat_id: &str, version_id: &str) -> Result<Chat, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut chat = fetch_for_update(&mut tx, user_id, chat_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(VERSION_NOT_FOUND.into()))?;
        let messages = chat
            .versions
            .iter()
            .find(|v| v.id == version_id)
            .map(|v| v.messages.clone())
            .ok_or_else(|| StoreError::NotFound(VERSION_NOT_FOUND.into()))?;

        chat.messages = messages;
        for version in &mut chat.versions {
            version.is_current = version.id == version_id;
        }
        chat.current_version_id = Some(version_id.to_owned());

        write_back(&mut tx, &chat).await?;
        tx.commit().await?;
        Ok(chat)
    }

    async fn remove_last_assistant_message(&self, user_id: &str, chat_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut chat = fetch_for_update(&mut tx, user_id, chat_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(CHAT_NOT_FOUND.into()))?;
        let index = chat
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
            .ok_or_else(|| StoreError::NotFound(NO_ASSISTANT_MESSAGE.into()))?;
        chat.messages.remove(index);

        write_back(&mut tx, &chat).await?;
        tx.commit().await?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
