//! Request-independent pieces of the chat turn: the streaming relay and the
//! memory bridge.

pub mod chat_stream;
pub mod memory_sync;
