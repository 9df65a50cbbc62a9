//! Event delivery to a session's transport.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::warn;

use crate::transform::ExternalEvent;

/// Delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The transport went away.
    #[error("sink closed")]
    Closed,
    /// Transport-specific failure.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Receives a session's client events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    async fn deliver(&self, event: ExternalEvent) -> Result<(), SinkError>;
}

/// Enqueue-and-return sink over an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ExternalEvent>,
}

impl ChannelSink {
    /// Sink writing into `tx`.
    pub fn new(tx: mpsc::UnboundedSender<ExternalEvent>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiver it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExternalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn deliver(&self, event: ExternalEvent) -> Result<(), SinkError> {
        self.tx.send(event).map_err(|_| SinkError::Closed)
    }
}

/// Sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn deliver(&self, _event: ExternalEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Deliver without letting a failing or panicking sink escape. Returns
/// whether delivery succeeded.
pub async fn deliver_guarded(sink: &dyn EventSink, event: ExternalEvent) -> bool {
    let event_type = event.event_type.clone();
    let session_id = event.session_id.clone();
    match AssertUnwindSafe(sink.deliver(event)).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(session_id, event_type, error = %e, "event delivery failed");
            false
        }
        Err(_) => {
            warn!(session_id, event_type, "event sink panicked");
            false
        }
    }
}
