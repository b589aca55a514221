use async_trait::async_trait;
use chatbot_core::{ChatTransport, CompletionRequest, TransportEvent, TransportStream};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::receiver_stream;
use crate::api::ApiClient;

/// Data payload some servers send as an end marker
const DONE_MARKER: &str = "[DONE]";

/// How one server-sent event affects the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseFrame {
    Fragment,
    End,
    Error,
    Ignore,
}

impl SseFrame {
    /// Classify an event by its `event:` name and `data:` payload
    pub fn classify(event: &str, data: &str) -> Self {
        match event {
            "" | "message" | "delta" if data.trim() == DONE_MARKER => SseFrame::End,
            "" | "message" | "delta" => SseFrame::Fragment,
            "done" | "end" => SseFrame::End,
            "error" => SseFrame::Error,
            _ => SseFrame::Ignore,
        }
    }
}

/// `text/event-stream` body
#[derive(Debug, Clone)]
pub struct SseTransport {
    api: ApiClient,
}

impl SseTransport {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ChatTransport for SseTransport {
    async fn open(&self, request: CompletionRequest) -> chatbot_core::Result<TransportStream> {
        debug!(
            "Opening SSE stream to {} with {} messages",
            self.api.base_url(),
            request.messages.len()
        );
        let response = self.api.open_stream(&request, "text/event-stream").await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_events(response.bytes_stream(), tx));
        Ok(receiver_stream(rx))
    }

    fn name(&self) -> &'static str {
        "sse"
    }
}

async fn forward_events<S, B, E>(body: S, tx: mpsc::UnboundedSender<TransportEvent>)
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let mut events = Box::pin(body.eventsource());

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("SSE stream dropped, closing connection");
                return;
            }
            next = events.next() => next,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                let _ = tx.send(TransportEvent::Errored(err.to_string()));
                return;
            }
            None => {
                let _ = tx.send(TransportEvent::Ended);
                return;
            }
        };

        match SseFrame::classify(&event.event, &event.data) {
            SseFrame::Fragment => {
                if !event.data.is_empty()
                    && tx.send(TransportEvent::Fragment(event.data)).is_err()
                {
                    return;
                }
            }
            SseFrame::End => {
                let _ = tx.send(TransportEvent::Ended);
                return;
            }
            SseFrame::Error => {
                let reason = if event.data.is_empty() {
                    "server reported a stream error".to_string()
                } else {
                    event.data
                };
                let _ = tx.send(TransportEvent::Errored(reason));
                return;
            }
            SseFrame::Ignore => trace!("Ignoring SSE event '{}'", event.event),
        }
    }
}
