//! Core types and state for chatbot
//!
//! This crate owns the client-side state of the chat client: the
//! conversation store, the persisted session credential, and the stream
//! reconciler that folds incremental assistant output into the transcript.
//! Wire transports live in `chatbot-client`.

pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod logging;
pub mod session;
pub mod stream;
pub mod utils;

pub use controller::ChatController;
pub use conversation::{Conversation, ConversationId, ConversationStore, Message, Role};
pub use error::{Error, Result};
pub use session::SessionStore;
pub use stream::{
    ChatTransport, CompletionRequest, FlushPolicy, ReconcileEvent, Reconciler, StreamTarget,
    TransportEvent, TransportStream,
};
