//! Streaming transports for `POST /chat/stream`
//!
//! Each transport spawns a reader task that owns the HTTP response and
//! forwards decoded events over a channel. Dropping the returned stream
//! closes the channel; the reader notices and drops the response, which
//! closes the connection.

mod chunked;
mod sse;

pub use chunked::ChunkedTransport;
pub use sse::{SseFrame, SseTransport};

use chatbot_core::config::TransportKind;
use chatbot_core::{ChatTransport, TransportEvent, TransportStream};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::ApiClient;

/// Transport selected by `api.transport`
pub fn build_transport(api: &ApiClient, kind: TransportKind) -> Arc<dyn ChatTransport> {
    match kind {
        TransportKind::Chunked => Arc::new(ChunkedTransport::new(api.clone())),
        TransportKind::Sse => Arc::new(SseTransport::new(api.clone())),
    }
}

fn receiver_stream(rx: mpsc::UnboundedReceiver<TransportEvent>) -> TransportStream {
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }))
}
