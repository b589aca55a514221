use async_trait::async_trait;
use chatbot_core::{ChatTransport, CompletionRequest, TransportEvent, TransportStream};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::receiver_stream;
use crate::api::ApiClient;
use crate::decode::Utf8Decoder;

/// Raw chunked text body; every decoded chunk is a fragment
#[derive(Debug, Clone)]
pub struct ChunkedTransport {
    api: ApiClient,
}

impl ChunkedTransport {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ChatTransport for ChunkedTransport {
    async fn open(&self, request: CompletionRequest) -> chatbot_core::Result<TransportStream> {
        debug!(
            "Opening chunked stream to {} with {} messages",
            self.api.base_url(),
            request.messages.len()
        );
        let response = self.api.open_stream(&request, "text/plain").await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_body(response.bytes_stream(), tx));
        Ok(receiver_stream(rx))
    }

    fn name(&self) -> &'static str {
        "chunked"
    }
}

async fn read_body<S, B, E>(body: S, tx: mpsc::UnboundedSender<TransportEvent>)
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let mut body = Box::pin(body);
    let mut decoder = Utf8Decoder::new();

    loop {
        let chunk = tokio::select! {
            _ = tx.closed() => {
                debug!("Chunked stream dropped, closing connection");
                return;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                let text = decoder.decode(bytes.as_ref());
                if !text.is_empty() && tx.send(TransportEvent::Fragment(text)).is_err() {
                    return;
                }
            }
            None => break,
            Some(Err(err)) => {
                let _ = tx.send(TransportEvent::Errored(err.to_string()));
                return;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = tx.send(TransportEvent::Fragment(rest));
    }
    let _ = tx.send(TransportEvent::Ended);
}
