//! Connection phase machine.
//!
//! ```text
//! Disconnected ──ConnectRequested──▶ Connecting ──HandshakeAcked──▶ Connected
//!      ▲                                 │                              │
//!      └────────HandshakeFailed──────────┘                              │
//!      └──────────────DisconnectRequested / TransportLost───────────────┘
//! ```
//!
//! Any pair not in the table is rejected, which the manager treats as a
//! no-op.

use std::fmt;

/// Coarse connection state exposed to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No live connection and no attempt in flight.
    #[default]
    Disconnected,
    /// A single handshake is in flight.
    Connecting,
    /// Handshake acknowledged.
    Connected,
}

/// Input to the phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A caller asked to connect.
    ConnectRequested,
    /// The transport acknowledged the handshake.
    HandshakeAcked,
    /// The transport rejected or failed the handshake.
    HandshakeFailed,
    /// A caller asked to disconnect.
    DisconnectRequested,
    /// The transport reported the link gone while connected.
    TransportLost,
}

impl ConnectionPhase {
    /// Returns the phase reached by applying `event`, or `None` if the
    /// event is not valid in this phase.
    #[must_use]
    pub const fn on(self, event: SessionEvent) -> Option<Self> {
        match (self, event) {
            (Self::Disconnected, SessionEvent::ConnectRequested) => Some(Self::Connecting),
            (Self::Connecting, SessionEvent::HandshakeAcked) => Some(Self::Connected),
            (Self::Connecting, SessionEvent::HandshakeFailed) => Some(Self::Disconnected),
            (Self::Connected, SessionEvent::DisconnectRequested | SessionEvent::TransportLost) => {
                Some(Self::Disconnected)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}
