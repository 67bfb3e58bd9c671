//! Scoped ownership of a subscription.
//!
//! A [`SubscriptionGuard`] releases its topic on every exit path of the
//! owner: explicitly through [`SubscriptionGuard::release`], or on drop by
//! spawning the unsubscribe onto the current runtime.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::registry::{SubscriptionHandle, SubscriptionRegistry};
use crate::domain::Topic;
use crate::router::InboundMessage;

/// Releases one subscription when released or dropped.
///
/// Only the subscription identified by the guard's handle is released; if
/// the topic was meanwhile unsubscribed and re-created, the newer one is
/// left alone.
#[derive(Debug)]
pub struct SubscriptionGuard {
    registry: Arc<SubscriptionRegistry>,
    handle: SubscriptionHandle,
    released: bool,
}

impl SubscriptionGuard {
    pub(crate) fn new(registry: Arc<SubscriptionRegistry>, handle: SubscriptionHandle) -> Self {
        Self {
            registry,
            handle,
            released: false,
        }
    }

    /// Handle of the guarded subscription.
    #[must_use]
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Topic of the guarded subscription.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.handle.topic
    }

    /// Releases the subscription now and waits for the transport.
    ///
    /// Returns `false` if it had already been released elsewhere.
    pub async fn release(mut self) -> bool {
        self.released = true;
        self.registry.unsubscribe_handle(&self.handle).await
    }

    /// Gives up ownership without releasing; the subscription stays live
    /// until someone unsubscribes the topic.
    #[must_use]
    pub fn detach(mut self) -> SubscriptionHandle {
        self.released = true;
        self.handle.clone()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(topic = %self.handle.topic, "guard dropped outside a runtime, subscription leaked");
            return;
        };
        let registry = Arc::clone(&self.registry);
        let handle = self.handle.clone();
        tracing::debug!(topic = %handle.topic, "releasing subscription on drop");
        runtime.spawn(async move {
            registry.unsubscribe_handle(&handle).await;
        });
    }
}

/// A subscription whose messages arrive on a bounded queue.
///
/// Owned by exactly one state machine; dropping it releases the topic.
pub struct TopicStream {
    guard: SubscriptionGuard,
    rx: mpsc::Receiver<InboundMessage>,
}

impl fmt::Debug for TopicStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicStream")
            .field("topic", self.guard.topic())
            .field("queued", &self.rx.len())
            .finish()
    }
}

impl TopicStream {
    pub(crate) fn new(guard: SubscriptionGuard, rx: mpsc::Receiver<InboundMessage>) -> Self {
        Self { guard, rx }
    }

    /// Waits for the next message. `None` once the subscription is gone.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }

    /// Returns a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        self.rx.try_recv().ok()
    }

    /// Topic of the stream.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        self.guard.topic()
    }

    /// Releases the subscription and discards anything still queued.
    pub async fn release(self) -> bool {
        let Self { guard, mut rx } = self;
        rx.close();
        guard.release().await
    }
}
