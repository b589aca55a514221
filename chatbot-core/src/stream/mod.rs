//! Streaming-response reconciliation
//!
//! A [`Reconciler`] task reads one completion through a [`ChatTransport`]
//! and emits [`ReconcileEvent`]s tagged with a [`StreamTarget`]. The owner of
//! the `ConversationStore` applies them, holding fragment text per
//! [`FlushPolicy`] until it is released into the reply. Events whose target
//! no longer matches the conversation's active stream are discarded.

pub mod buffer;
pub mod reconciler;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{FlushPolicy, FragmentBuffer};
pub use reconciler::{
    run_stream, ReconcileEvent, ReconcileEventKind, ReconcileReceiver, ReconcileSender,
    Reconciler, StreamTicket,
};
pub use state::{ActiveStream, StreamId, StreamOutcome, StreamState, StreamTarget};
pub use transport::{ChatTransport, CompletionRequest, TransportEvent, TransportStream};

/// Shown in place of the reply when a stream fails before any text arrived
pub const FALLBACK_ERROR_TEXT: &str =
    "Sorry, I encountered an error while processing your request.";
