//! Context-window assembly: persisted history + in-flight request messages →
//! the message list handed to the provider.

use std::collections::HashMap;

use super::content::{MessageContent, ProviderContent};
use super::window::{TokenEstimate, trim_to_budget};
use crate::entities::dao::{Role, StoredMessage};

pub const MEMORY_CONTEXT_PREFIX: &str = "User memory/context:\n";

/// One entry of the provider-facing conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: ProviderContent,
}

impl TokenEstimate for StoredMessage {
    fn estimated_tokens(&self) -> usize {
        self.content.estimated_tokens()
    }
}

/// Drops messages without a meaningful payload.
pub fn prune_empty(messages: Vec<StoredMessage>) -> Vec<StoredMessage> {
    messages
        .into_iter()
        .filter(|m| m.content.is_non_empty())
        .collect()
}

/// Merges in-flight messages into `history`.
///
/// Each in-flight message cancels one stored message with the same role and
/// content; the ones left over are appended in request order.  A client that
/// resends its whole conversation therefore contributes nothing new, while a
/// turn that could not be persisted is still seen by the model.
pub fn reconcile(history: Vec<StoredMessage>, in_flight: &[StoredMessage]) -> Vec<StoredMessage> {
    let mut stored: HashMap<(Role, String), usize> = HashMap::new();
    for message in &history {
        *stored.entry(turn_key(message.role, &message.content)).or_default() += 1;
    }

    let mut merged = history;
    for message in in_flight {
        let key = turn_key(message.role, &message.content);
        match stored.get_mut(&key) {
            Some(count) if *count > 0 => *count -= 1,
            _ => merged.push(message.clone()),
        }
    }
    merged
}

fn turn_key(role: Role, content: &MessageContent) -> (Role, String) {
    // serde_json output is deterministic for our content types.
    let encoded = serde_json::to_string(content).unwrap_or_else(|_| content.digest());
    (role, encoded)
}

/// Prune, reconcile and trim: the window the model will see.
pub fn build_window(
    history: Vec<StoredMessage>,
    in_flight: &[StoredMessage],
    max_tokens: usize,
) -> Vec<StoredMessage> {
    let in_flight: Vec<StoredMessage> = in_flight
        .iter()
        .filter(|m| m.content.is_non_empty())
        .cloned()
        .collect();
    let merged = reconcile(prune_empty(history), &in_flight);
    trim_to_budget(&merged, max_tokens).to_vec()
}

/// Normalizes the window for the provider, prefixed by the memory digest as a
/// system message when one is available.
pub fn to_provider_messages(window: &[StoredMessage], memory_digest: &str) -> Vec<ProviderMessage> {
    let mut out = Vec::with_capacity(window.len() + 1);
    if !memory_digest.trim().is_empty() {
        out.push(ProviderMessage {
            role: Role::System,
            content: ProviderContent::Text(format!("{MEMORY_CONTEXT_PREFIX}{memory_digest}")),
        });
    }
    out.extend(window.iter().map(|m| ProviderMessage {
        role: m.role,
        content: m.content.provider_content(),
    }));
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::content::ContentPart;

    fn msg(role: Role, text: &str) -> StoredMessage {
        StoredMessage::new(format!("m-{text}"), role, text.into())
    }

    fn texts(messages: &[StoredMessage]) -> Vec<String> {
        messages.iter().map(|m| m.content.display_text()).collect()
    }

    #[test]
    fn resent_conversation_is_not_duplicated() {
        let history = vec![msg(Role::User, "hi"), msg(Role::Assistant, "hello"), msg(Role::User, "next")];
        let in_flight = history.clone();
        let merged = reconcile(history, &in_flight);
        assert_eq!(texts(&merged), vec!["hi", "hello", "next"]);
    }

    #[test]
    fn unsaved_in_flight_turns_are_appended() {
        let history = vec![msg(Role::User, "hi"), msg(Role::Assistant, "hello")];
        let in_flight = vec![msg(Role::User, "hi"), msg(Role::User, "new question")];
        let merged = reconcile(history, &in_flight);
        assert_eq!(texts(&merged), vec!["hi", "hello", "new question"]);
    }

    #[test]
    fn repeated_turns_are_counted() {
        let history = vec![msg(Role::User, "again")];
        let in_flight = vec![msg(Role::User, "again"), msg(Role::User, "again")];
        assert_eq!(reconcile(history, &in_flight).len(), 2);
    }

    #[test]
    fn role_is_part_of_the_identity() {
        let history = vec![msg(Role::Assistant, "same")];
        let in_flight = vec![msg(Role::User, "same")];
        assert_eq!(reconcile(history, &in_flight).len(), 2);
    }

    #[test]
    fn window_drops_empty_messages() {
        let history = vec![msg(Role::User, "hi"), msg(Role::Assistant, "  "), msg(Role::User, "")];
        let window = build_window(history, &[msg(Role::User, "\n")], 1_000);
        assert_eq!(texts(&window), vec!["hi"]);
    }

    #[test]
    fn window_is_trimmed_from_the_front() {
        let history = vec![
            msg(Role::User, &"a".repeat(40)),
            msg(Role::Assistant, &"b".repeat(40)),
            msg(Role::User, &"c".repeat(8)),
        ];
        let window = build_window(history, &[], 12);
        assert_eq!(window.len(), 2);
        assert_eq!(window[1].content.display_text(), "cccccccc");
    }

    #[test]
    fn empty_everything_gives_an_empty_window() {
        assert!(build_window(vec![], &[msg(Role::User, " ")], 100).is_empty());
    }

    #[test]
    fn memory_digest_becomes_a_leading_system_message() {
        let window = vec![msg(Role::User, "hi")];
        let out = to_provider_messages(&window, "likes tea");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[0].content.text(), "User memory/context:\nlikes tea");
        assert_eq!(out[1].content, ProviderContent::Text("hi".into()));

        assert_eq!(to_provider_messages(&window, "").len(), 1);
    }

    #[test]
    fn file_messages_are_normalized() {
        let message = StoredMessage::new(
            "m1".into(),
            Role::User,
            MessageContent::Parts(vec![ContentPart::File {
                data: vec![9],
                mime_type: "image/png".into(),
                name: None,
            }]),
        );
        let out = to_provider_messages(&[message], "");
        assert!(matches!(out[0].content, ProviderContent::Multipart { .. }));
    }
}
