//! Per-conversation stream bookkeeping

use tokio_util::sync::CancellationToken;

use super::buffer::{FlushPolicy, FragmentBuffer};
use crate::conversation::ConversationId;

/// Identifier of one streaming request, never reused within a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub(crate) u64);

impl StreamId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Where a reconciler event must land
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub conversation_id: ConversationId,
    pub stream_id: StreamId,
}

impl StreamTarget {
    pub fn new(conversation_id: ConversationId, stream_id: StreamId) -> Self {
        Self {
            conversation_id,
            stream_id,
        }
    }
}

/// Handle of the stream currently writing into a conversation
#[derive(Debug, Clone)]
pub struct ActiveStream {
    pub id: StreamId,
    pub(crate) cancel: CancellationToken,
    pub(crate) received: bool,
    /// Text received but not yet released to the trailing message
    pub(crate) pending: FragmentBuffer,
}

impl ActiveStream {
    pub(crate) fn new(id: StreamId, policy: FlushPolicy) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
            received: false,
            pending: FragmentBuffer::new(policy),
        }
    }

    /// Whether any non-empty fragment has been applied yet
    pub fn has_received(&self) -> bool {
        self.received
    }
}

/// Whether a conversation's trailing message is open for streaming
#[derive(Debug, Clone, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming(ActiveStream),
}

/// How a stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The transport signalled a natural end
    Completed,
    /// The transport failed
    Errored,
    /// Superseded by a newer send, or torn down
    Cancelled,
}
