//! Composition root handed to every consumer.
//!
//! [`RealtimeClient`] owns the one [`SessionManager`] and the one
//! [`SubscriptionRegistry`] of the process. It is constructed once and
//! passed around by clone; all clones share the same connection.

use std::sync::Arc;

use serde::Serialize;

use crate::config::ClientConfig;
use crate::domain::Topic;
use crate::error::SessionError;
use crate::router::{MessageHandler, QueueHandler, RouterStats};
use crate::session::{
    ConnectionPhase, CredentialProvider, SessionId, SessionManager, Transport,
};
use crate::subscription::{
    SubscriptionGuard, SubscriptionHandle, SubscriptionRegistry, TopicStream,
};

/// Shared handle to the session and its subscriptions.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    /// Connection owner.
    pub session: Arc<SessionManager>,
    /// Topic subscriptions.
    pub registry: Arc<SubscriptionRegistry>,
    queue_capacity: usize,
}

impl RealtimeClient {
    /// Builds a disconnected client over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::with_config(transport, credentials, &ClientConfig::default())
    }

    /// Builds a disconnected client using the queue bound from `config`.
    #[must_use]
    pub fn with_config(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        config: &ClientConfig,
    ) -> Self {
        let session = Arc::new(SessionManager::new(transport, credentials));
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&session)));
        Self {
            session,
            registry,
            queue_capacity: config.handler_queue_capacity,
        }
    }

    /// See [`SessionManager::connect`].
    ///
    /// # Errors
    ///
    /// Propagates the connect failure.
    pub async fn connect(&self) -> Result<SessionId, SessionError> {
        self.session.connect().await
    }

    /// Releases every subscription, then closes the session.
    ///
    /// No-op when already disconnected.
    pub async fn disconnect(&self) {
        self.registry.unsubscribe_all().await;
        self.session.disconnect().await;
    }

    /// Returns `true` while the session is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Active session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.session_id()
    }

    /// Current connection phase.
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.session.phase()
    }

    /// See [`SubscriptionRegistry::subscribe`].
    ///
    /// # Errors
    ///
    /// Propagates the registry failure.
    pub async fn subscribe(
        &self,
        topic: Topic,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionHandle, SessionError> {
        self.registry.subscribe(topic, handler).await
    }

    /// Subscribes and returns a guard that releases the topic when dropped.
    ///
    /// # Errors
    ///
    /// Propagates the registry failure.
    pub async fn subscribe_scoped(
        &self,
        topic: Topic,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionGuard, SessionError> {
        let handle = self.registry.subscribe(topic, handler).await?;
        Ok(SubscriptionGuard::new(Arc::clone(&self.registry), handle))
    }

    /// Subscribes a bounded queue to `topic`.
    ///
    /// The stream is the topic's only consumer for as long as it lives.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadySubscribed`] if the topic is already
    /// live under another handler; that binding is left untouched.
    /// Otherwise propagates the registry failure.
    pub async fn subscribe_queue(&self, topic: Topic) -> Result<TopicStream, SessionError> {
        let (handler, rx) = QueueHandler::channel(self.queue_capacity);
        let acquired = self.registry.acquire(topic, Arc::new(handler)).await?;
        if !acquired.created {
            tracing::warn!(topic = %acquired.handle.topic, "topic already bound to another consumer");
            return Err(SessionError::AlreadySubscribed(acquired.handle.topic));
        }
        let guard = SubscriptionGuard::new(Arc::clone(&self.registry), acquired.handle);
        Ok(TopicStream::new(guard, rx))
    }

    /// See [`SubscriptionRegistry::unsubscribe`].
    pub async fn unsubscribe(&self, topic: &Topic) -> bool {
        self.registry.unsubscribe(topic).await
    }

    /// See [`SessionManager::send`].
    ///
    /// # Errors
    ///
    /// Propagates the send failure.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        destination: &Topic,
        payload: &T,
    ) -> Result<(), SessionError> {
        self.session.send(destination, payload).await
    }

    /// Router delivery counters.
    #[must_use]
    pub fn router_stats(&self) -> RouterStats {
        self.registry.router_stats()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::session::{CredentialStore, MemoryBroker};

    fn client(broker: &MemoryBroker) -> RealtimeClient {
        RealtimeClient::new(
            Arc::new(broker.transport()),
            Arc::new(CredentialStore::with_token("jwt")),
        )
    }

    #[tokio::test]
    async fn disconnect_releases_subscriptions_before_closing() {
        let broker = MemoryBroker::new();
        let client = client(&broker);
        let Ok(_stream) = client.subscribe_queue(Topic::from("/topic/a")).await else {
            panic!("subscribe");
        };
        let Ok(_other) = client.subscribe_queue(Topic::from("/topic/b")).await else {
            panic!("subscribe");
        };

        client.disconnect().await;
        assert_eq!(broker.unsubscribe_count(), 2);
        assert_eq!(broker.close_count(), 1);
        assert!(!client.is_connected());
        assert!(client.registry.is_empty().await);
    }

    #[tokio::test]
    async fn queue_receives_pushes_in_order() {
        let broker = MemoryBroker::new();
        let client = client(&broker);
        let topic = Topic::from("/topic/a");
        let Ok(mut stream) = client.subscribe_queue(topic.clone()).await else {
            panic!("subscribe");
        };
        broker.publish(&topic, r#"{"n":1}"#);
        broker.publish(&topic, r#"{"n":2}"#);

        let Some(first) = stream.recv().await else {
            panic!("first");
        };
        let Some(second) = stream.recv().await else {
            panic!("second");
        };
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.payload["n"], 2);
        assert_eq!(client.router_stats().delivered, 2);
    }

    #[tokio::test]
    async fn second_queue_on_a_live_topic_is_refused() {
        let broker = MemoryBroker::new();
        let client = client(&broker);
        let topic = Topic::from("/topic/a");
        let Ok(mut first) = client.subscribe_queue(topic.clone()).await else {
            panic!("subscribe");
        };
        let Err(err) = client.subscribe_queue(topic.clone()).await else {
            panic!("second queue must be refused");
        };
        assert_eq!(err, SessionError::AlreadySubscribed(topic.clone()));
        assert_eq!(broker.subscribe_count(), 1);
        assert_eq!(broker.unsubscribe_count(), 0);

        broker.publish(&topic, r#"{"n":1}"#);
        assert!(first.recv().await.is_some());
        assert!(first.release().await);
    }

    #[tokio::test]
    async fn scoped_subscription_is_released_explicitly() {
        let broker = MemoryBroker::new();
        let client = client(&broker);
        let topic = Topic::from("/topic/a");
        let handler: Arc<dyn MessageHandler> = Arc::new(QueueHandler::channel(1).0);
        let Ok(guard) = client.subscribe_scoped(topic.clone(), handler).await else {
            panic!("subscribe");
        };
        assert_eq!(guard.topic(), &topic);
        assert!(guard.release().await);
        assert!(!client.unsubscribe(&topic).await);
    }
}
