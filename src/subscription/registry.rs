//! Topic → live subscription map.
//!
//! At most one transport-level subscription exists per topic string. A
//! second `subscribe` for a topic that is already live returns the existing
//! handle and leaves the handler bound to it untouched.
//!
//! The map sits behind a `tokio::sync::Mutex` held across the transport
//! subscribe call, so two racing subscribes for the same topic cannot both
//! reach the transport. An entry always records the session that was live
//! when its transport subscribe returned; if the session changes while a
//! caller waits for the lock or for the transport, the attempt is redone.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::Topic;
use crate::error::SessionError;
use crate::router::{MessageHandler, MessageRouter, RouterStats};
use crate::session::{SessionId, SessionManager, TransportHandle};

/// Caller-facing identity of a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    /// Registry-assigned id; stable for the life of the subscription.
    pub id: Uuid,
    /// Topic the subscription is bound to.
    pub topic: Topic,
}

#[derive(Debug)]
struct Entry {
    handle: SubscriptionHandle,
    transport: TransportHandle,
    session: SessionId,
}

/// Result of [`SubscriptionRegistry::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Acquired {
    pub handle: SubscriptionHandle,
    /// `false` if an existing subscription was reused.
    pub created: bool,
}

/// Owns every live topic subscription of the process.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    session: Arc<SessionManager>,
    router: MessageRouter,
    entries: Mutex<HashMap<Topic, Entry>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry over `session`.
    #[must_use]
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            router: MessageRouter::new(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes `handler` to `topic`, connecting first if needed.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidTopic`] for a blank topic.
    /// - Any error of [`SessionManager::connect`].
    /// - [`SessionError::Subscription`] if the transport refuses the
    ///   subscribe; other topics are unaffected.
    pub async fn subscribe(
        &self,
        topic: Topic,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionHandle, SessionError> {
        self.acquire(topic, handler).await.map(|a| a.handle)
    }

    pub(crate) async fn acquire(
        &self,
        topic: Topic,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Acquired, SessionError> {
        if topic.is_blank() {
            return Err(SessionError::InvalidTopic(topic.as_str().to_string()));
        }
        loop {
            let session_id = self.session.connect().await?;

            let mut entries = self.entries.lock().await;
            if self.session.session_id().as_ref() != Some(&session_id) {
                tracing::debug!(topic = %topic, "session changed while waiting, reconnecting");
                continue;
            }

            if let Some(entry) = entries.get(&topic).filter(|e| e.session == session_id) {
                tracing::debug!(topic = %topic, "reusing live subscription");
                return Ok(Acquired {
                    handle: entry.handle.clone(),
                    created: false,
                });
            }
            if let Some(stale) = entries.remove(&topic) {
                tracing::info!(
                    topic = %topic,
                    stale_session = %stale.session,
                    "discarding subscription from a closed session"
                );
                if let Err(err) = self.session.transport().unsubscribe(&stale.transport).await {
                    tracing::debug!(topic = %topic, error = %err, "stale unsubscribe failed");
                }
            }

            let sink = self.router.bind(topic.clone(), Arc::clone(&handler));
            let transport = self
                .session
                .transport()
                .subscribe(&topic, sink)
                .await
                .map_err(|e| SessionError::Subscription {
                    topic: topic.clone(),
                    reason: e.to_string(),
                })?;

            if self.session.session_id().as_ref() != Some(&session_id) {
                tracing::debug!(topic = %topic, "session changed during subscribe, retrying");
                if let Err(err) = self.session.transport().unsubscribe(&transport).await {
                    tracing::debug!(topic = %topic, error = %err, "unsubscribe after session change failed");
                }
                continue;
            }

            let handle = SubscriptionHandle {
                id: Uuid::new_v4(),
                topic: topic.clone(),
            };
            entries.insert(
                topic.clone(),
                Entry {
                    handle: handle.clone(),
                    transport,
                    session: session_id.clone(),
                },
            );
            tracing::info!(topic = %topic, session_id = %session_id, "subscribed");
            return Ok(Acquired {
                handle,
                created: true,
            });
        }
    }

    /// Releases the subscription for `topic`.
    ///
    /// Returns `false` if there was none; that is not an error.
    pub async fn unsubscribe(&self, topic: &Topic) -> bool {
        let entry = self.entries.lock().await.remove(topic);
        match entry {
            Some(entry) => {
                self.release(entry).await;
                true
            }
            None => {
                tracing::debug!(topic = %topic, "unsubscribe of absent topic");
                false
            }
        }
    }

    /// Releases the subscription only if `handle` is still the live one.
    pub(crate) async fn unsubscribe_handle(&self, handle: &SubscriptionHandle) -> bool {
        let entry = {
            let mut entries = self.entries.lock().await;
            match entries.get(&handle.topic) {
                Some(live) if live.handle.id == handle.id => entries.remove(&handle.topic),
                _ => None,
            }
        };
        match entry {
            Some(entry) => {
                self.release(entry).await;
                true
            }
            None => false,
        }
    }

    /// Releases every live subscription and returns how many there were.
    pub async fn unsubscribe_all(&self) -> usize {
        let drained: Vec<Entry> = self.entries.lock().await.drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            self.release(entry).await;
        }
        if count > 0 {
            tracing::info!(count, "released all subscriptions");
        }
        count
    }

    async fn release(&self, entry: Entry) {
        let topic = &entry.handle.topic;
        if self.session.session_id().as_ref() != Some(&entry.session) {
            tracing::debug!(topic = %topic, "session already gone, dropping entry");
            return;
        }
        if let Err(err) = self.session.transport().unsubscribe(&entry.transport).await {
            tracing::warn!(topic = %topic, error = %err, "transport unsubscribe failed");
        }
        tracing::info!(topic = %topic, "unsubscribed");
    }

    /// Returns `true` if `topic` has a live entry.
    pub async fn is_subscribed(&self, topic: &Topic) -> bool {
        self.entries.lock().await.contains_key(topic)
    }

    /// Live topics, sorted.
    pub async fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.entries.lock().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if nothing is subscribed.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Delivery counters of every sink this registry created.
    #[must_use]
    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::HandlerError;
    use crate::router::InboundMessage;
    use crate::session::{CredentialStore, MemoryBroker};

    fn registry(broker: &MemoryBroker) -> SubscriptionRegistry {
        let session = SessionManager::new(
            Arc::new(broker.transport()),
            Arc::new(CredentialStore::with_token("jwt")),
        );
        SubscriptionRegistry::new(Arc::new(session))
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn MessageHandler>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        let handler = move |_m: InboundMessage| -> Result<(), HandlerError> {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        (hits, Arc::new(handler))
    }

    #[tokio::test]
    async fn blank_topic_is_rejected_before_connecting() {
        let broker = MemoryBroker::new();
        let registry = registry(&broker);
        let (_, h) = counter();
        let Err(err) = registry.subscribe(Topic::from(" "), h).await else {
            panic!("blank topic must fail");
        };
        assert!(matches!(err, SessionError::InvalidTopic(_)));
        assert_eq!(broker.handshake_count(), 0);
    }

    #[tokio::test]
    async fn second_subscribe_keeps_first_handler() {
        let broker = MemoryBroker::new();
        let registry = registry(&broker);
        let topic = Topic::from("/topic/game-progress/7");
        let (first, h1) = counter();
        let (second, h2) = counter();

        let Ok(a) = registry.subscribe(topic.clone(), h1).await else {
            panic!("first subscribe");
        };
        let Ok(b) = registry.subscribe(topic.clone(), h2).await else {
            panic!("second subscribe");
        };
        assert_eq!(a, b);
        assert_eq!(broker.subscribe_count(), 1);

        broker.publish(&topic, "{}");
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsubscribe_twice_is_noop() {
        let broker = MemoryBroker::new();
        let registry = registry(&broker);
        let topic = Topic::from("/topic/chat/1");
        let (_, h) = counter();
        let _ = registry.subscribe(topic.clone(), h).await;

        assert!(registry.unsubscribe(&topic).await);
        assert!(!registry.unsubscribe(&topic).await);
        assert_eq!(broker.unsubscribe_count(), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn stale_entry_is_recreated_after_link_loss() {
        let broker = MemoryBroker::new();
        let registry = registry(&broker);
        let topic = Topic::from("/topic/chat/1");
        let (hits, h) = counter();
        let _ = registry.subscribe(topic.clone(), Arc::clone(&h)).await;

        broker.drop_link();
        let Ok(_) = registry.subscribe(topic.clone(), h).await else {
            panic!("resubscribe after link loss");
        };
        assert_eq!(broker.subscribe_count(), 2);
        assert_eq!(broker.publish(&topic, "{}"), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_refusal_only_affects_that_topic() {
        let broker = MemoryBroker::new();
        let registry = registry(&broker);
        let denied = Topic::from("/topic/denied");
        let ok = Topic::from("/topic/a");
        broker.deny_topic(denied.clone(), "forbidden");
        let (_, h) = counter();

        let Err(err) = registry.subscribe(denied.clone(), Arc::clone(&h)).await else {
            panic!("denied topic must fail");
        };
        assert_eq!(
            err,
            SessionError::Subscription {
                topic: denied,
                reason: "rejected: forbidden".into(),
            }
        );
        let Ok(_) = registry.subscribe(ok.clone(), h).await else {
            panic!("other topics still subscribe");
        };
        assert_eq!(registry.topics().await, vec![ok]);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_all_releases_everything() {
        let broker = MemoryBroker::new();
        let registry = registry(&broker);
        for name in ["/topic/a", "/topic/b", "/topic/c"] {
            let (_, h) = counter();
            let _ = registry.subscribe(Topic::from(name), h).await;
        }
        assert_eq!(registry.unsubscribe_all().await, 3);
        assert_eq!(broker.unsubscribe_count(), 3);
        assert_eq!(registry.unsubscribe_all().await, 0);
    }
}
