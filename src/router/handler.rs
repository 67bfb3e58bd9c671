//! Handler seam between the router and the consuming state machines.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::InboundMessage;
use crate::error::HandlerError;

/// Consumer of messages for one topic.
///
/// Called synchronously on the transport's delivery path, so an
/// implementation must not block. Returning an error only drops the
/// current message.
pub trait MessageHandler: Send + Sync {
    /// Handles one decoded message.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the message could not be consumed.
    fn handle(&self, message: InboundMessage) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(InboundMessage) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, message: InboundMessage) -> Result<(), HandlerError> {
        self(message)
    }
}

/// Forwards messages into a bounded queue owned by a state machine.
///
/// Uses `try_send`, so delivery never waits on the consumer. A full queue
/// or a consumer that went away surfaces as a [`HandlerError`].
#[derive(Debug, Clone)]
pub struct QueueHandler {
    tx: mpsc::Sender<InboundMessage>,
}

impl QueueHandler {
    /// Creates a handler and the receiving end of its queue.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl MessageHandler for QueueHandler {
    fn handle(&self, message: InboundMessage) -> Result<(), HandlerError> {
        self.tx.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => HandlerError::new("consumer queue full"),
            TrySendError::Closed(_) => HandlerError::new("consumer no longer listening"),
        })
    }
}
