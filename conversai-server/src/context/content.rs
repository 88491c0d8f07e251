//! Message content shapes and the normalizations applied to them.
//!
//! A message body is either plain text or an ordered list of typed parts
//! (text segments and inline files).  Three flattenings are derived from it:
//!
//! - **display text**: text parts only, used for titles and UI rendering;
//! - **provider content**: what the LLM provider receives, with a fallback
//!   prompt for caption-less attachments;
//! - **digest**: a plain-text rendering that mentions attached files, used for
//!   memory writes.

use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize};

/// Prompt substituted when a message carries files but no text.
pub const FILE_FALLBACK_PROMPT: &str = "Please analyze the attached file(s).";

/// Separator used whenever several text parts are flattened into one string.
pub const PART_SEPARATOR: &str = "\n";

const PREVIEW_CHARS: usize = 20;

/// Body of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// One typed segment of a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text {
        #[serde(default)]
        text: String,
    },
    File {
        #[serde(with = "byte_payload")]
        data: Vec<u8>,
        #[serde(rename = "mimeType", default = "default_mime_type")]
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

fn default_mime_type() -> String {
    "application/octet-stream".to_owned()
}

/// A file forwarded inline to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFile {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub name: Option<String>,
}

/// Provider-facing form of a message body.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderContent {
    Text(String),
    /// One text segment followed by one inline file per attachment.
    Multipart { text: String, files: Vec<InlineFile> },
}

impl ProviderContent {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::Multipart { text, .. } => text,
        }
    }
}

/// `true` when the content carries a meaningful payload: non-blank text or at
/// least one file part.
pub fn is_non_empty(content: &MessageContent) -> bool {
    match content {
        MessageContent::Text(text) => !text.trim().is_empty(),
        MessageContent::Parts(parts) => parts.iter().any(|part| match part {
            ContentPart::Text { text } => !text.trim().is_empty(),
            ContentPart::File { .. } => true,
        }),
    }
}

impl MessageContent {
    pub fn is_non_empty(&self) -> bool {
        is_non_empty(self)
    }

    /// Text parts joined with [`PART_SEPARATOR`]; files are ignored.
    pub fn display_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => join_text_parts(parts),
        }
    }

    pub fn provider_content(&self) -> ProviderContent {
        match self {
            Self::Text(text) => ProviderContent::Text(text.clone()),
            Self::Parts(parts) => {
                let files: Vec<InlineFile> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::File { data, mime_type, name } => Some(InlineFile {
                            data: data.clone(),
                            mime_type: mime_type.clone(),
                            name: name.clone(),
                        }),
                        ContentPart::Text { .. } => None,
                    })
                    .collect();

                let mut text = join_text_parts(parts);
                if text.is_empty() && !files.is_empty() {
                    text = FILE_FALLBACK_PROMPT.to_owned();
                }

                if files.is_empty() {
                    ProviderContent::Text(text)
                } else {
                    ProviderContent::Multipart { text, files }
                }
            }
        }
    }

    /// Plain-text rendering with `[file attached: …]` placeholders.
    pub fn digest(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } if text.is_empty() => None,
                    ContentPart::Text { text } => Some(text.clone()),
                    ContentPart::File { name, .. } => Some(format!(
                        "[file attached: {}]",
                        name.as_deref().unwrap_or("unnamed file")
                    )),
                })
                .collect::<Vec<_>>()
                .join(PART_SEPARATOR),
        }
    }

    /// Short sidebar preview: first text (20 chars) or `[File] name`.
    pub fn preview(&self) -> String {
        match self {
            Self::Text(text) => truncate_chars(text.trim(), PREVIEW_CHARS),
            Self::Parts(parts) => {
                let first_text = parts.iter().find_map(|part| match part {
                    ContentPart::Text { text } => Some(text),
                    ContentPart::File { .. } => None,
                });
                if let Some(text) = first_text {
                    return truncate_chars(text.trim(), PREVIEW_CHARS);
                }
                let first_file = parts.iter().find_map(|part| match part {
                    ContentPart::File { name, .. } => Some(name.as_deref().unwrap_or("unnamed file")),
                    ContentPart::Text { .. } => None,
                });
                match first_file {
                    Some(name) if name.chars().count() <= PREVIEW_CHARS => format!("[File] {name}"),
                    Some(name) => format!(
                        "[File] {}...",
                        name.chars().take(PREVIEW_CHARS - 3).collect::<String>()
                    ),
                    None => String::new(),
                }
            }
        }
    }
}

fn join_text_parts(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::File { .. } => None,
        })
        .collect::<Vec<_>>()
        .join(PART_SEPARATOR)
}

/// First `max` characters of `text`, with `"..."` appended when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

/// `deserialize_with` helper: `null` and missing content become empty text.
pub fn nullable_content<'de, D>(deserializer: D) -> Result<MessageContent, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<MessageContent>::deserialize(deserializer)?.unwrap_or_default())
}

/// Inline file bytes.
///
/// Emitted as base64.  Accepted as base64 (optionally a `data:` URL), as an
/// array of byte values, or as the index-keyed object a browser produces when
/// a `Uint8Array` is JSON-encoded.
mod byte_payload {
    use std::collections::BTreeMap;

    use base64::Engine as _;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::BASE64;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Encoded(String),
        Bytes(Vec<u8>),
        Indexed(BTreeMap<String, u8>),
    }

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Encoded(encoded) => {
                let payload = match encoded.split_once("base64,") {
                    Some((_, rest)) => rest,
                    None => encoded.as_str(),
                };
                BASE64.decode(payload.trim()).map_err(D::Error::custom)
            }
            Raw::Bytes(bytes) => Ok(bytes),
            Raw::Indexed(map) => {
                let mut entries = map
                    .into_iter()
                    .map(|(key, byte)| {
                        key.parse::<usize>()
                            .map(|index| (index, byte))
                            .map_err(D::Error::custom)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                entries.sort_unstable_by_key(|(index, _)| *index);
                Ok(entries.into_iter().map(|(_, byte)| byte).collect())
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
