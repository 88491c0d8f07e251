//! Identifier generation for chats, versions and messages.
//!
//! Format: `<prefix>_<unix-millis>_<12 lowercase hex chars>`, e.g.
//! `chat_1718035200123_9f1c2a7be04d`.  The millisecond component keeps ids
//! roughly sortable by creation time; the suffix is taken from a v4 UUID and
//! therefore comes from the OS random source.

use chrono::Utc;
use uuid::Uuid;

const SUFFIX_LEN: usize = 12;

/// Sentinel chat id sent by clients that have not been assigned a chat yet.
pub const DEFAULT_CHAT_SENTINEL: &str = "default";

pub fn chat_id() -> String {
    generate("chat")
}

pub fn version_id() -> String {
    generate("version")
}

pub fn message_id() -> String {
    generate("msg")
}

fn generate(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}_{}_{}",
        Utc::now().timestamp_millis(),
        &random[..SUFFIX_LEN]
    )
}

/// `true` when the client did not supply a usable chat id.
pub fn needs_new_chat_id(chat_id: Option<&str>) -> bool {
    match chat_id.map(str::trim) {
        None | Some("") => true,
        Some(id) => id == DEFAULT_CHAT_SENTINEL,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
