use serde_json::Value;
use serper_relay_core::credential::ResolvedCredential;
use tokio::sync::mpsc;

/// Outbound messages buffered per request before the handler has to wait
/// for the client to drain them.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Per-request state handed to the protocol handler and every tool adapter.
///
/// Created by the relay for one inbound request and dropped with it; the
/// credential is never stored anywhere else.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    credential: Option<ResolvedCredential>,
    streaming: bool,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, credential: Option<ResolvedCredential>) -> Self {
        Self {
            request_id: request_id.into(),
            credential,
            streaming: false,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn credential(&self) -> Option<&ResolvedCredential> {
        self.credential.as_ref()
    }

    /// Whether the client is reading an event stream, so intermediate
    /// notifications can be delivered.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

#[derive(Debug, thiserror::Error)]
#[error("client disconnected before the message could be delivered")]
pub struct SinkClosed;

/// Write half of a request's outbound message channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Value>,
}

pub fn event_channel() -> (EventSink, mpsc::Receiver<Value>) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (EventSink { tx }, rx)
}

impl EventSink {
    pub async fn emit(&self, message: Value) -> Result<(), SinkClosed> {
        self.tx.send(message).await.map_err(|_| SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the reading side is gone.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}
