pub mod chat;

pub use chat::{Chat, ChatVersion, Role, StoredMessage, derive_title};
