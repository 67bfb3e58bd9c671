//! In-process broker and transport.
//!
//! [`MemoryBroker`] plays the server side: it accepts handshakes, keeps the
//! subscribed sinks per topic and pushes frames into them. Each
//! [`MemoryTransport`] it hands out is the client side of the one link.
//! Used by the tests and the demo binary; a network transport plugs into
//! the same [`Transport`] trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use super::transport::{Credential, SessionId, Transport, TransportHandle};
use crate::config::DEFAULT_ENDPOINT;
use crate::domain::Topic;
use crate::error::TransportError;
use crate::router::FrameSink;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct BrokerInner {
    connected: AtomicBool,
    /// `true` while handshakes may complete.
    gate: watch::Sender<bool>,
    refusal: Mutex<Option<String>>,
    denied: Mutex<HashMap<Topic, String>>,
    sinks: Mutex<HashMap<String, FrameSink>>,
    relays: Mutex<HashMap<Topic, Topic>>,
    outbound: Mutex<Vec<(Topic, String)>>,
    endpoints: Mutex<Vec<String>>,
    handshakes: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    closes: AtomicUsize,
}

/// Server side of the in-process link.
///
/// Cheap to clone; all clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates a broker that accepts every handshake.
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(BrokerInner {
                connected: AtomicBool::new(false),
                gate,
                refusal: Mutex::new(None),
                denied: Mutex::new(HashMap::new()),
                sinks: Mutex::new(HashMap::new()),
                relays: Mutex::new(HashMap::new()),
                outbound: Mutex::new(Vec::new()),
                endpoints: Mutex::new(Vec::new()),
                handshakes: AtomicUsize::new(0),
                subscribes: AtomicUsize::new(0),
                unsubscribes: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns the client end of the link, dialing [`DEFAULT_ENDPOINT`].
    #[must_use]
    pub fn transport(&self) -> MemoryTransport {
        self.transport_at(DEFAULT_ENDPOINT)
    }

    /// Returns a client end that dials `endpoint`.
    #[must_use]
    pub fn transport_at(&self, endpoint: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
            endpoint: endpoint.into(),
        }
    }

    /// Makes subsequent handshakes wait until [`Self::release_handshakes`].
    pub fn hold_handshakes(&self) {
        self.inner.gate.send_replace(false);
    }

    /// Lets held and future handshakes complete.
    pub fn release_handshakes(&self) {
        self.inner.gate.send_replace(true);
    }

    /// Rejects subsequent handshakes with `reason`.
    pub fn refuse_handshakes(&self, reason: impl Into<String>) {
        *lock(&self.inner.refusal) = Some(reason.into());
    }

    /// Accepts subsequent handshakes again.
    pub fn accept_handshakes(&self) {
        *lock(&self.inner.refusal) = None;
    }

    /// Rejects subsequent subscribes to `topic` with `reason`.
    pub fn deny_topic(&self, topic: Topic, reason: impl Into<String>) {
        lock(&self.inner.denied).insert(topic, reason.into());
    }

    /// Simulates the server dropping the link: subscriptions are forgotten
    /// and the client sees the transport as closed.
    pub fn drop_link(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        lock(&self.inner.sinks).clear();
        tracing::debug!("memory link dropped");
    }

    /// Echoes every outbound frame sent to `from` as a push on `to`, the way
    /// the chat endpoint rebroadcasts to the game's chat topic.
    pub fn route_outbound(&self, from: Topic, to: Topic) {
        lock(&self.inner.relays).insert(from, to);
    }

    /// Pushes a raw frame body to every sink subscribed to `topic`.
    ///
    /// Returns the number of sinks that received it.
    pub fn publish(&self, topic: &Topic, body: &str) -> usize {
        let sinks: Vec<FrameSink> = lock(&self.inner.sinks)
            .values()
            .filter(|sink| sink.topic() == topic)
            .cloned()
            .collect();
        for sink in &sinks {
            sink.deliver(body);
        }
        tracing::trace!(topic = %topic, receivers = sinks.len(), "broker push");
        sinks.len()
    }

    /// Serializes `payload` and pushes it to `topic`.
    pub fn publish_json<T: Serialize + ?Sized>(&self, topic: &Topic, payload: &T) -> usize {
        match serde_json::to_string(payload) {
            Ok(body) => self.publish(topic, &body),
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "cannot encode broker push");
                0
            }
        }
    }

    /// Number of live sinks on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        lock(&self.inner.sinks)
            .values()
            .filter(|sink| sink.topic() == topic)
            .count()
    }

    /// Frames the client published, in order.
    #[must_use]
    pub fn outbound(&self) -> Vec<(Topic, String)> {
        lock(&self.inner.outbound).clone()
    }

    /// Endpoint of every handshake started so far, in order.
    #[must_use]
    pub fn handshake_endpoints(&self) -> Vec<String> {
        lock(&self.inner.endpoints).clone()
    }

    /// Handshakes started so far, including held and refused ones.
    #[must_use]
    pub fn handshake_count(&self) -> usize {
        self.inner.handshakes.load(Ordering::SeqCst)
    }

    /// Transport-level subscribes accepted so far.
    #[must_use]
    pub fn subscribe_count(&self) -> usize {
        self.inner.subscribes.load(Ordering::SeqCst)
    }

    /// Transport-level unsubscribes received so far.
    #[must_use]
    pub fn unsubscribe_count(&self) -> usize {
        self.inner.unsubscribes.load(Ordering::SeqCst)
    }

    /// Client-initiated closes received so far.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

/// Client end of a [`MemoryBroker`] link.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    endpoint: String,
}

impl MemoryTransport {
    /// Endpoint this transport dials.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, credential: &Credential) -> Result<SessionId, TransportError> {
        let inner = &self.broker.inner;
        inner.handshakes.fetch_add(1, Ordering::SeqCst);
        lock(&inner.endpoints).push(self.endpoint.clone());
        tracing::debug!(endpoint = %self.endpoint, ?credential, "memory handshake");

        let mut gate = inner.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| TransportError::Closed)?;

        if let Some(reason) = lock(&inner.refusal).clone() {
            return Err(TransportError::Rejected(reason));
        }
        inner.connected.store(true, Ordering::SeqCst);
        Ok(SessionId::new(format!("mem-{}", Uuid::new_v4())))
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        sink: FrameSink,
    ) -> Result<TransportHandle, TransportError> {
        self.ensure_open()?;
        if let Some(reason) = lock(&self.broker.inner.denied).get(topic).cloned() {
            return Err(TransportError::Rejected(reason));
        }
        let id = Uuid::new_v4().to_string();
        lock(&self.broker.inner.sinks).insert(id.clone(), sink);
        self.broker.inner.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(TransportHandle {
            id,
            topic: topic.clone(),
        })
    }

    async fn unsubscribe(&self, handle: &TransportHandle) -> Result<(), TransportError> {
        self.broker.inner.unsubscribes.fetch_add(1, Ordering::SeqCst);
        lock(&self.broker.inner.sinks).remove(&handle.id);
        self.ensure_open()
    }

    async fn publish(&self, topic: &Topic, body: String) -> Result<(), TransportError> {
        self.ensure_open()?;
        lock(&self.broker.inner.outbound).push((topic.clone(), body.clone()));
        let relay = lock(&self.broker.inner.relays).get(topic).cloned();
        if let Some(target) = relay {
            self.broker.publish(&target, &body);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let inner = &self.broker.inner;
        inner.closes.fetch_add(1, Ordering::SeqCst);
        inner.connected.store(false, Ordering::SeqCst);
        lock(&inner.sinks).clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.broker.inner.connected.load(Ordering::SeqCst)
    }
}
