//! Error types for the session core, the router and the request/response
//! collaborators.
//!
//! [`SessionError`] is what connect, subscribe and send hand back to their
//! immediate caller. It is `Clone` because a single in-flight connect
//! attempt resolves every waiter with the same outcome.
//!
//! # Error Code Ranges
//!
//! | Range     | Category            | Retry by caller |
//! |-----------|---------------------|-----------------|
//! | 1000–1999 | Caller / credential | never           |
//! | 2000–2999 | Connection          | caller policy   |
//! | 3000–3999 | Subscription        | caller policy   |

use crate::domain::Topic;

/// Failure of a connect, subscribe or outbound send.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No bearer credential was available when connecting.
    #[error("no authentication credential available")]
    AuthenticationMissing,

    /// The topic string was empty.
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    /// The transport rejected the handshake.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Transport-level failure outside the handshake.
    #[error("transport error: {0}")]
    Transport(String),

    /// An outbound frame was attempted without a live session.
    #[error("session is not connected")]
    NotConnected,

    /// The transport refused a subscribe after a successful connect.
    #[error("subscription to {topic} failed: {reason}")]
    Subscription {
        /// Topic the caller asked for.
        topic: Topic,
        /// Transport-supplied reason.
        reason: String,
    },

    /// The topic is already owned by another queue consumer.
    #[error("topic {0} is already subscribed by another consumer")]
    AlreadySubscribed(Topic),
}

impl SessionError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::AuthenticationMissing => 1001,
            Self::InvalidTopic(_) => 1002,
            Self::ConnectionRefused(_) => 2001,
            Self::Transport(_) => 2002,
            Self::NotConnected => 2003,
            Self::Subscription { .. } => 3001,
            Self::AlreadySubscribed(_) => 3002,
        }
    }

    /// Returns `true` if a caller-level retry policy may try again.
    ///
    /// A missing credential or a malformed topic will fail the same way
    /// every time, so those are never retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::AuthenticationMissing | Self::InvalidTopic(_))
    }
}

/// Error reported by a [`crate::session::Transport`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The remote end rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The link is not open.
    #[error("link closed")]
    Closed,

    /// Any other I/O failure.
    #[error("i/o: {0}")]
    Io(String),
}

/// Error returned by a message handler.
///
/// The router logs it and moves on to the next frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Creates a handler error from any displayable reason.
    pub fn new(reason: impl std::fmt::Display) -> Self {
        Self(reason.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("payload shape: {err}"))
    }
}

/// Failure contained at the router boundary for one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The frame body was not valid JSON.
    #[error("decode error on {topic}: {reason}")]
    Decode {
        /// Topic the frame arrived on.
        topic: Topic,
        /// Parser message.
        reason: String,
    },

    /// The bound handler failed.
    #[error("handler error on {topic}: {source}")]
    Handler {
        /// Topic the frame arrived on.
        topic: Topic,
        /// What the handler reported.
        source: HandlerError,
    },
}

/// Error from a request/response collaborator (the game HTTP API).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server did not accept the submitted answer.
    #[error("answer rejected")]
    AnswerRejected,

    /// The requested game does not exist.
    #[error("game not found: {0}")]
    NotFound(String),

    /// The credential was refused.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other request failure.
    #[error("request failed: {0}")]
    Request(String),
}
