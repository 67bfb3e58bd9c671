//! Message routing: frame decoding and per-topic handler dispatch.
//!
//! Every transport-level subscription gets a [`FrameSink`] bound to exactly
//! one topic and one handler. The transport pushes raw frame bodies into the
//! sink; the sink decodes them and invokes the handler. A decode failure or
//! a failing handler is logged and counted, never propagated back into the
//! transport's read loop.

pub mod handler;
pub mod message;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use handler::{MessageHandler, QueueHandler};
pub use message::InboundMessage;

use crate::domain::Topic;
use crate::error::{HandlerError, RouteError};

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    skipped: AtomicU64,
    decode_failures: AtomicU64,
    handler_failures: AtomicU64,
}

/// Point-in-time view of the router counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterStats {
    /// Frames handed to a handler that returned `Ok`.
    pub delivered: u64,
    /// Frames with an empty body.
    pub skipped: u64,
    /// Frames whose body was not valid JSON.
    pub decode_failures: u64,
    /// Frames whose handler returned an error or panicked.
    pub handler_failures: u64,
}

/// Creates [`FrameSink`]s and aggregates their counters.
#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    counters: Arc<Counters>,
}

impl MessageRouter {
    /// Creates a router with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `topic`, returning the sink the transport feeds.
    ///
    /// The binding is fixed for the sink's lifetime; replacing the handler
    /// means creating a new subscription.
    #[must_use]
    pub fn bind(&self, topic: Topic, handler: Arc<dyn MessageHandler>) -> FrameSink {
        FrameSink {
            topic,
            handler,
            counters: Arc::clone(&self.counters),
        }
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
        }
    }
}

/// Delivery endpoint for one topic subscription.
#[derive(Clone)]
pub struct FrameSink {
    topic: Topic,
    handler: Arc<dyn MessageHandler>,
    counters: Arc<Counters>,
}

impl fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSink")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl FrameSink {
    /// Topic this sink is bound to.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Delivers one raw frame body. Failures are logged and swallowed.
    pub fn deliver(&self, body: &str) {
        match self.try_deliver(body) {
            Ok(_) => {}
            Err(err @ RouteError::Decode { .. }) => {
                tracing::warn!(topic = %self.topic, error = %err, "dropping undecodable frame");
            }
            Err(err @ RouteError::Handler { .. }) => {
                tracing::error!(topic = %self.topic, error = %err, "message handler failed");
            }
        }
    }

    /// Delivers one raw frame body and reports what happened.
    ///
    /// Returns `Ok(false)` for an empty body, which is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Decode`] for a body that is not JSON and
    /// [`RouteError::Handler`] if the handler fails or panics.
    pub fn try_deliver(&self, body: &str) -> Result<bool, RouteError> {
        if body.trim().is_empty() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(topic = %self.topic, "skipping empty frame");
            return Ok(false);
        }

        let payload: serde_json::Value = serde_json::from_str(body).map_err(|e| {
            self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
            RouteError::Decode {
                topic: self.topic.clone(),
                reason: e.to_string(),
            }
        })?;

        let message = InboundMessage::new(self.topic.clone(), payload);
        tracing::trace!(topic = %self.topic, "dispatching frame");

        let outcome = catch_unwind(AssertUnwindSafe(|| self.handler.handle(message)))
            .unwrap_or_else(|_| Err(HandlerError::new("handler panicked")));

        match outcome {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(source) => {
                self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                Err(RouteError::Handler {
                    topic: self.topic.clone(),
                    source,
                })
            }
        }
    }
}
