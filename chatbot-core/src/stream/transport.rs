//! Transport seam between the reconciler and the wire

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;

use crate::conversation::Message;

/// What a streaming connection reports, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Decoded text to append to the reply
    Fragment(String),
    /// Natural end of the stream
    Ended,
    /// The connection failed; no more events follow
    Errored(String),
}

/// Event stream of one open connection; dropping it closes the connection
pub type TransportStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// Request body of a completion
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Full history, oldest first, ending with the new user message
    pub messages: Vec<Message>,
    /// Bearer credential, sent as the `Authorization` header
    #[serde(skip)]
    pub credential: Option<String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, credential: Option<String>) -> Self {
        Self {
            messages,
            credential,
        }
    }
}

/// Opens streaming completions against the chat service
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open one streaming connection for `request`
    ///
    /// Failing to connect (or a non-success response) may be reported either
    /// as `Err` or as a stream whose first event is `Errored`.
    async fn open(&self, request: CompletionRequest) -> crate::Result<TransportStream>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
