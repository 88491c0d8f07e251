//! Pure message-processing logic: content normalization, emptiness
//! filtering, token budgeting and window assembly.

pub mod assemble;
pub mod content;
pub mod window;

pub use assemble::{ProviderMessage, build_window, to_provider_messages};
pub use content::ProviderContent;
