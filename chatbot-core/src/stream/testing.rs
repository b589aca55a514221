//! In-memory transport for reconciler tests

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::transport::{ChatTransport, CompletionRequest, TransportEvent, TransportStream};

/// One scripted response
pub(crate) enum Script {
    /// Yield these events, then end the stream
    Events(Vec<TransportEvent>),
    /// Yield these events, then stay open until dropped; drops are counted
    /// by [`ScriptedTransport::closed_streams`]
    Hang(Vec<TransportEvent>),
    /// Refuse to connect
    Refuse(String),
}

/// Replays scripts in order, one per `open`, and records every request
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    closed: Arc<AtomicUsize>,
}

/// Counts a hanging stream as closed when its owner drops it
struct CloseGuard(Arc<AtomicUsize>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub(crate) fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            requests: Arc::default(),
            closed: Arc::default(),
        }
    }

    pub(crate) fn fragments(parts: &[&str]) -> Script {
        let mut events: Vec<TransportEvent> = parts
            .iter()
            .map(|p| TransportEvent::Fragment(p.to_string()))
            .collect();
        events.push(TransportEvent::Ended);
        Script::Events(events)
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// How many hanging streams have been dropped
    pub(crate) fn closed_streams(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(&self, request: CompletionRequest) -> crate::Result<TransportStream> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Events(vec![TransportEvent::Ended]));

        match script {
            Script::Events(events) => Ok(stream::iter(events).boxed()),
            Script::Hang(events) => {
                let guard = CloseGuard(Arc::clone(&self.closed));
                let hold = stream::unfold(guard, |guard| async move {
                    let _guard = guard;
                    future::pending::<Option<(TransportEvent, CloseGuard)>>().await
                });
                Ok(stream::iter(events).chain(hold).boxed())
            }
            Script::Refuse(reason) => Err(crate::Error::Transport(reason)),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
