//! Token-budget trimming of a message list.
//!
//! Token counts are estimated, not measured: four characters per token, plus a
//! flat charge for every inline file.

use super::content::{ContentPart, MessageContent, PART_SEPARATOR};

pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 128_000;

/// Flat token charge for one inline file part.
pub const FILE_PART_TOKENS: usize = 258;

const CHARS_PER_TOKEN: usize = 4;

/// Anything whose prompt cost can be estimated.
pub trait TokenEstimate {
    fn estimated_tokens(&self) -> usize;
}

impl TokenEstimate for MessageContent {
    fn estimated_tokens(&self) -> usize {
        match self {
            MessageContent::Text(text) => text.chars().count().div_ceil(CHARS_PER_TOKEN),
            MessageContent::Parts(parts) => {
                let mut text_chars: usize = 0;
                let mut text_parts: usize = 0;
                let mut files: usize = 0;
                for part in parts {
                    match part {
                        ContentPart::Text { text } => {
                            text_chars += text.chars().count();
                            text_parts += 1;
                        }
                        ContentPart::File { .. } => files += 1,
                    }
                }
                let separators = text_parts.saturating_sub(1) * PART_SEPARATOR.chars().count();
                (text_chars + separators).div_ceil(CHARS_PER_TOKEN) + files * FILE_PART_TOKENS
            }
        }
    }
}

/// Longest suffix of `messages` whose estimated total fits in `max_tokens`.
///
/// Walks backward and stops at the first message that does not fit, so an
/// oversized message hides everything older than it.
pub fn trim_to_budget<T: TokenEstimate>(messages: &[T], max_tokens: usize) -> &[T] {
    let mut total = 0usize;
    let mut start = messages.len();
    for (index, message) in messages.iter().enumerate().rev() {
        let cost = message.estimated_tokens();
        match total.checked_add(cost) {
            Some(next) if next <= max_tokens => {
                total = next;
                start = index;
            }
            _ => break,
        }
    }
    &messages[start..]
}

// ── Tests ──────────────────────────────────────────────────────────────────────
