//! Session manager: the one connection of the process.
//!
//! [`SessionManager`] owns the transport and serializes connect attempts.
//! While a handshake is in flight its future is stored in the state as a
//! [`Shared`] future, so every concurrent caller awaits the same attempt and
//! receives the same `SessionId` or the same error.
//!
//! # Concurrency
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Outcomes of an attempt are applied by whichever waiter wakes
//! first; the attempt number makes the others no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;

use super::state::{ConnectionPhase, SessionEvent};
use super::transport::{CredentialProvider, SessionId, Transport};
use crate::domain::Topic;
use crate::error::{SessionError, TransportError};

type ConnectAttempt = Shared<BoxFuture<'static, Result<SessionId, SessionError>>>;

enum SessionState {
    Disconnected,
    Connecting {
        attempt: u64,
        outcome: ConnectAttempt,
    },
    Connected {
        session_id: SessionId,
    },
}

impl SessionState {
    const fn phase(&self) -> ConnectionPhase {
        match self {
            Self::Disconnected => ConnectionPhase::Disconnected,
            Self::Connecting { .. } => ConnectionPhase::Connecting,
            Self::Connected { .. } => ConnectionPhase::Connected,
        }
    }
}

/// Owns the single transport link and its connection state.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    state: Mutex<SessionState>,
    attempts: AtomicU64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("transport", &self.transport)
            .field("phase", &self.phase())
            .field("attempts", &self.attempts.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a disconnected manager over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            transport,
            credentials,
            state: Mutex::new(SessionState::Disconnected),
            attempts: AtomicU64::new(0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Connects, or joins the attempt already in flight.
    ///
    /// Returns immediately with the current id when already connected.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AuthenticationMissing`] if no credential is available;
    ///   no attempt is started.
    /// - [`SessionError::ConnectionRefused`] if the transport rejects the
    ///   handshake, [`SessionError::Transport`] for any other link failure.
    pub async fn connect(&self) -> Result<SessionId, SessionError> {
        let (attempt, outcome) = {
            let mut state = self.lock_state();

            if let SessionState::Connected { session_id } = &*state {
                if self.transport.is_connected() {
                    return Ok(session_id.clone());
                }
                tracing::warn!(session_id = %session_id, "transport closed underneath session");
                transition(
                    &mut state,
                    SessionEvent::TransportLost,
                    SessionState::Disconnected,
                );
            }

            match &*state {
                SessionState::Connecting { attempt, outcome } => {
                    tracing::debug!(attempt, "joining in-flight connect");
                    (*attempt, outcome.clone())
                }
                _ => {
                    let Some(credential) = self.credentials.credential() else {
                        tracing::warn!("connect requested without a credential");
                        return Err(SessionError::AuthenticationMissing);
                    };
                    let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    let transport = Arc::clone(&self.transport);
                    let outcome = async move {
                        transport
                            .connect(&credential)
                            .await
                            .map_err(handshake_error)
                    }
                    .boxed()
                    .shared();
                    transition(
                        &mut state,
                        SessionEvent::ConnectRequested,
                        SessionState::Connecting {
                            attempt,
                            outcome: outcome.clone(),
                        },
                    );
                    tracing::info!(attempt, "connecting");
                    (attempt, outcome)
                }
            }
        };

        let result = outcome.await;
        self.settle(attempt, &result);
        result
    }

    /// Applies the outcome of `attempt` if it is still the one in flight.
    fn settle(&self, attempt: u64, result: &Result<SessionId, SessionError>) {
        let mut state = self.lock_state();
        let current = matches!(&*state, SessionState::Connecting { attempt: a, .. } if *a == attempt);
        if !current {
            return;
        }
        match result {
            Ok(session_id) => {
                tracing::info!(attempt, session_id = %session_id, "connected");
                transition(
                    &mut state,
                    SessionEvent::HandshakeAcked,
                    SessionState::Connected {
                        session_id: session_id.clone(),
                    },
                );
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "connect failed");
                transition(
                    &mut state,
                    SessionEvent::HandshakeFailed,
                    SessionState::Disconnected,
                );
            }
        }
    }

    /// Closes the transport and clears the session.
    ///
    /// No-op when already disconnected. When a connect is in flight this
    /// waits for it to settle and then disconnects if it succeeded.
    /// Subscriptions are not touched here; see
    /// [`crate::client::RealtimeClient::disconnect`].
    pub async fn disconnect(&self) {
        let pending = match &*self.lock_state() {
            SessionState::Disconnected => return,
            SessionState::Connecting { attempt, outcome } => Some((*attempt, outcome.clone())),
            SessionState::Connected { .. } => None,
        };
        if let Some((attempt, outcome)) = pending {
            let result = outcome.await;
            self.settle(attempt, &result);
        }

        let Some(session_id) = self.session_id() else {
            return;
        };
        if let Err(err) = self.transport.disconnect().await {
            tracing::warn!(session_id = %session_id, error = %err, "transport close failed");
        }

        let mut state = self.lock_state();
        if matches!(&*state, SessionState::Connected { session_id: id } if *id == session_id) {
            transition(
                &mut state,
                SessionEvent::DisconnectRequested,
                SessionState::Disconnected,
            );
            tracing::info!(session_id = %session_id, "disconnected");
        }
    }

    /// Returns `true` if the session is connected and the link is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(&*self.lock_state(), SessionState::Connected { .. }) && self.transport.is_connected()
    }

    /// Returns the active session id, if connected.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        match &*self.lock_state() {
            SessionState::Connected { session_id } => Some(session_id.clone()),
            _ => None,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.lock_state().phase()
    }

    /// Publishes `payload` as JSON to `destination`.
    ///
    /// Outbound frames never trigger a connect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] without a live session and
    /// [`SessionError::Transport`] if encoding or hand-off fails.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        destination: &Topic,
        payload: &T,
    ) -> Result<(), SessionError> {
        if !self.is_connected() {
            tracing::warn!(destination = %destination, "send without a live session");
            return Err(SessionError::NotConnected);
        }
        let body = serde_json::to_string(payload)
            .map_err(|e| SessionError::Transport(format!("encode: {e}")))?;
        self.transport
            .publish(destination, body)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        tracing::debug!(destination = %destination, "frame sent");
        Ok(())
    }
}

fn handshake_error(err: TransportError) -> SessionError {
    match err {
        TransportError::Rejected(reason) => SessionError::ConnectionRefused(reason),
        other => SessionError::Transport(other.to_string()),
    }
}

/// Replaces `state` with `next` if the transition table allows `event`.
fn transition(state: &mut SessionState, event: SessionEvent, next: SessionState) -> bool {
    let from = state.phase();
    match from.on(event) {
        Some(to) if to == next.phase() => {
            tracing::debug!(%from, %to, ?event, "session transition");
            *state = next;
            true
        }
        _ => {
            tracing::warn!(%from, ?event, "ignoring invalid session transition");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::session::memory::MemoryBroker;
    use crate::session::transport::CredentialStore;

    fn manager(broker: &MemoryBroker, token: Option<&str>) -> SessionManager {
        let store = match token {
            Some(t) => CredentialStore::with_token(t),
            None => CredentialStore::new(),
        };
        SessionManager::new(Arc::new(broker.transport()), Arc::new(store))
    }

    #[tokio::test]
    async fn connect_then_reads() {
        let broker = MemoryBroker::new();
        let session = manager(&broker, Some("jwt"));
        assert_eq!(session.phase(), ConnectionPhase::Disconnected);
        assert!(session.session_id().is_none());

        let Ok(id) = session.connect().await else {
            panic!("connect should succeed");
        };
        assert!(session.is_connected());
        assert_eq!(session.session_id(), Some(id));
        assert_eq!(session.phase(), ConnectionPhase::Connected);
    }

    #[tokio::test]
    async fn connect_when_connected_is_idempotent() {
        let broker = MemoryBroker::new();
        let session = manager(&broker, Some("jwt"));
        let first = session.connect().await;
        let second = session.connect().await;
        assert_eq!(first, second);
        assert_eq!(broker.handshake_count(), 1);
    }

    #[tokio::test]
    async fn missing_credential_fails_without_handshake() {
        let broker = MemoryBroker::new();
        let session = manager(&broker, None);
        assert_eq!(session.connect().await, Err(SessionError::AuthenticationMissing));
        assert_eq!(session.phase(), ConnectionPhase::Disconnected);
        assert_eq!(broker.handshake_count(), 0);
    }

    #[tokio::test]
    async fn refused_handshake_resets_to_disconnected() {
        let broker = MemoryBroker::new();
        broker.refuse_handshakes("bad token");
        let session = manager(&broker, Some("jwt"));
        assert_eq!(
            session.connect().await,
            Err(SessionError::ConnectionRefused("bad token".into()))
        );
        assert_eq!(session.phase(), ConnectionPhase::Disconnected);

        broker.accept_handshakes();
        tokio_test::assert_ok!(session.connect().await);
        assert_eq!(broker.handshake_count(), 2);
    }

    #[tokio::test]
    async fn disconnect_is_noop_when_disconnected() {
        let broker = MemoryBroker::new();
        let session = manager(&broker, Some("jwt"));
        session.disconnect().await;
        assert_eq!(broker.close_count(), 0);

        let _ = session.connect().await;
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(broker.close_count(), 1);
        assert!(session.session_id().is_none());
    }

    #[tokio::test]
    async fn lost_link_reconnects_on_demand() {
        let broker = MemoryBroker::new();
        let session = manager(&broker, Some("jwt"));
        let Ok(first) = session.connect().await else {
            panic!("first connect");
        };
        broker.drop_link();
        assert!(!session.is_connected());

        let Ok(second) = session.connect().await else {
            panic!("second connect");
        };
        assert_ne!(first, second);
        assert_eq!(broker.handshake_count(), 2);
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let broker = MemoryBroker::new();
        let session = manager(&broker, Some("jwt"));
        let dest = Topic::from("/app/chat/1");
        assert_eq!(
            session.send(&dest, &serde_json::json!({"content": "hi"})).await,
            Err(SessionError::NotConnected)
        );

        let _ = session.connect().await;
        tokio_test::assert_ok!(session.send(&dest, &serde_json::json!({"content": "hi"})).await);
        assert_eq!(broker.outbound().len(), 1);
    }
}
