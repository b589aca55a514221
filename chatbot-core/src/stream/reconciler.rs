//! Drives one streaming request and reports its progress as tagged events

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::StreamTarget;
use super::transport::{ChatTransport, CompletionRequest, TransportEvent};
use crate::conversation::Message;

/// Everything a reconciler needs to run one request, handed out by
/// `ConversationStore::begin_send`
#[derive(Debug, Clone)]
pub struct StreamTicket {
    pub target: StreamTarget,
    /// History to submit, ending with the new user message
    pub history: Vec<Message>,
    pub cancel: CancellationToken,
}

/// Progress of a stream, delivered to the owner of the conversation store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEvent {
    pub target: StreamTarget,
    pub kind: ReconcileEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEventKind {
    /// Text received for the trailing assistant message, in transport order
    Fragment(String),
    /// The stream ended naturally
    Completed,
    /// The stream failed with the given reason
    Failed(String),
}

impl ReconcileEvent {
    pub fn fragment(target: StreamTarget, text: impl Into<String>) -> Self {
        Self {
            target,
            kind: ReconcileEventKind::Fragment(text.into()),
        }
    }

    pub fn completed(target: StreamTarget) -> Self {
        Self {
            target,
            kind: ReconcileEventKind::Completed,
        }
    }

    pub fn failed(target: StreamTarget, reason: impl Into<String>) -> Self {
        Self {
            target,
            kind: ReconcileEventKind::Failed(reason.into()),
        }
    }

    /// Whether this is the last event of its stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, ReconcileEventKind::Fragment(_))
    }
}

pub type ReconcileSender = mpsc::UnboundedSender<ReconcileEvent>;
pub type ReconcileReceiver = mpsc::UnboundedReceiver<ReconcileEvent>;

/// Spawns stream tasks that read a [`ChatTransport`] and emit
/// [`ReconcileEvent`]s in transport order
#[derive(Clone)]
pub struct Reconciler {
    transport: Arc<dyn ChatTransport>,
    events: ReconcileSender,
}

impl Reconciler {
    /// Create a reconciler and the receiving end its tasks report to
    pub fn new(transport: Arc<dyn ChatTransport>) -> (Self, ReconcileReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { transport, events }, rx)
    }

    /// Start streaming the reply for `ticket` on the tokio runtime
    pub fn spawn(&self, ticket: StreamTicket, credential: Option<String>) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        tokio::spawn(async move { run_stream(transport, ticket, credential, events).await })
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }
}

/// Read one stream to its end, forwarding every fragment as it arrives
///
/// Returns without emitting anything once `ticket.cancel` fires; dropping the
/// transport stream closes the connection. Text already forwarded is flushed
/// by the store when it cancels the stream.
pub async fn run_stream(
    transport: Arc<dyn ChatTransport>,
    ticket: StreamTicket,
    credential: Option<String>,
    events: ReconcileSender,
) {
    let StreamTicket {
        target,
        history,
        cancel,
    } = ticket;

    info!(
        conversation = %target.conversation_id,
        stream = %target.stream_id,
        transport = transport.name(),
        messages = history.len(),
        "Opening completion stream"
    );

    let request = CompletionRequest::new(history, credential);
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(stream = %target.stream_id, "Cancelled before connection opened");
            return;
        }
        opened = transport.open(request) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(stream = %target.stream_id, "Failed to open completion stream: {}", e);
            let _ = events.send(ReconcileEvent::failed(target, e.to_string()));
            return;
        }
    };

    let mut fragments = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(stream = %target.stream_id, fragments, "Stream cancelled, closing connection");
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(TransportEvent::Fragment(text)) => {
                fragments += 1;
                if events
                    .send(ReconcileEvent::fragment(target.clone(), text))
                    .is_err()
                {
                    debug!(stream = %target.stream_id, "Store owner gone, dropping stream");
                    return;
                }
            }
            Some(TransportEvent::Ended) | None => {
                info!(stream = %target.stream_id, fragments, "Completion stream finished");
                let _ = events.send(ReconcileEvent::completed(target));
                return;
            }
            Some(TransportEvent::Errored(reason)) => {
                warn!(stream = %target.stream_id, fragments, "Completion stream failed: {}", reason);
                let _ = events.send(ReconcileEvent::failed(target, reason));
                return;
            }
        }
    }
}
