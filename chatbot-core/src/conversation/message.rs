//! Conversation data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream::{StreamOutcome, StreamState};
use crate::utils::truncate_chars;

/// Title given to conversations before their first user message
pub const DEFAULT_TITLE: &str = "New Chat";
/// Title of the conversation present at startup and after logout
pub const WELCOME_TITLE: &str = "AI Assistant Introduces Itself Briefly";
/// Opening assistant line of fresh conversations
pub const GREETING: &str = "Hello! How can I help you today?";
/// Maximum characters of the first user message kept in a derived title
pub const TITLE_MAX_CHARS: usize = 30;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role-tagged chat message
///
/// Serializes as `{ "role": ..., "content": ... }`, which is also the wire
/// shape the chat service expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Opaque conversation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Allocate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation: title plus ordered message history
///
/// Only the trailing message may change after it was appended, and only
/// while `stream` is [`StreamState::Streaming`].
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub(crate) stream: StreamState,
    pub(crate) last_outcome: Option<StreamOutcome>,
}

impl Conversation {
    /// Create an empty conversation titled "New Chat"
    pub fn new() -> Self {
        Self::with_title(DEFAULT_TITLE)
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            id: ConversationId::generate(),
            title: title.into(),
            messages: Vec::new(),
            created_at: Utc::now(),
            stream: StreamState::Idle,
            last_outcome: None,
        }
    }

    /// Conversation opened with the assistant greeting
    pub fn greeted(title: impl Into<String>) -> Self {
        let mut conversation = Self::with_title(title);
        conversation.messages.push(Message::assistant(GREETING));
        conversation
    }

    /// Whether a reply is currently streaming into this conversation
    pub fn is_streaming(&self) -> bool {
        matches!(self.stream, StreamState::Streaming(_))
    }

    /// Current stream state
    pub fn stream(&self) -> &StreamState {
        &self.stream
    }

    /// Terminal outcome of the most recent stream, if any finished
    pub fn last_outcome(&self) -> Option<StreamOutcome> {
        self.last_outcome
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a user message, deriving the title from it when this is the
    /// first user message of a default-titled conversation
    pub(crate) fn push_user_message(&mut self, content: String) {
        let first_user_message = !self.messages.iter().any(|m| m.role == Role::User);
        if first_user_message && self.title == DEFAULT_TITLE {
            self.title = truncate_chars(&content, TITLE_MAX_CHARS);
        }
        self.messages.push(Message::user(content));
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
