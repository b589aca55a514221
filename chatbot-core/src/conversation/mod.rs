//! Conversations and the store that holds them
//!
//! Chats live only in memory; nothing here is persisted.

pub mod message;
pub mod store;

pub use message::{
    Conversation, ConversationId, Message, Role, DEFAULT_TITLE, GREETING, TITLE_MAX_CHARS,
    WELCOME_TITLE,
};
pub use store::{ApplyOutcome, ConversationStore};
