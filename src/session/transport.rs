//! Transport and credential seams.
//!
//! The transport is an external capability: one stateful, authenticated
//! link that can publish to and subscribe to named topics. This crate never
//! implements framing or heartbeats; it only drives an implementation of
//! [`Transport`].

use std::fmt;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::Topic;
use crate::error::TransportError;
use crate::router::FrameSink;

/// Identifier of an established connection, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a transport-supplied identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of a transport-level subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportHandle {
    /// Transport-assigned subscription id.
    pub id: String,
    /// Topic it was created for.
    pub topic: Topic,
}

/// Bearer credential attached at connect time.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a bearer token.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Returns the `Authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Source of the bearer credential. The session only reads it.
pub trait CredentialProvider: fmt::Debug + Send + Sync {
    /// Returns the current credential, if the user is signed in.
    fn credential(&self) -> Option<Credential>;
}

/// Credential holder that the sign-in flow writes and the session reads.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Some(Credential::bearer(token))),
        }
    }

    /// Replaces the stored credential.
    pub fn set(&self, credential: Credential) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(credential);
    }

    /// Forgets the stored credential.
    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialProvider for CredentialStore {
    fn credential(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A stateful publish/subscribe link.
///
/// Implementations deliver inbound frames by calling
/// [`FrameSink::deliver`] on the sink handed to [`Transport::subscribe`],
/// in the order frames arrive for that topic.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Opens the link, authenticated with `credential`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Rejected`] if the handshake is refused.
    async fn connect(&self, credential: &Credential) -> Result<SessionId, TransportError>;

    /// Subscribes `sink` to `topic`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the subscribe frame is refused or
    /// cannot be sent.
    async fn subscribe(&self, topic: &Topic, sink: FrameSink)
    -> Result<TransportHandle, TransportError>;

    /// Releases a subscription created by [`Transport::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the unsubscribe frame cannot be sent.
    async fn unsubscribe(&self, handle: &TransportHandle) -> Result<(), TransportError>;

    /// Publishes a JSON body to `topic`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the frame cannot be handed off.
    async fn publish(&self, topic: &Topic, body: String) -> Result<(), TransportError>;

    /// Closes the link.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the close handshake fails.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Returns `true` while the link is open.
    fn is_connected(&self) -> bool;
}
