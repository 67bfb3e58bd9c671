//! # trivia-realtime
//!
//! Real-time session and topic-subscription core for a turn-based trivia
//! game client.
//!
//! One authenticated link to the server carries many topic subscriptions.
//! Inbound frames are routed to the lobby countdown or the in-game state
//! machine that owns the topic. Rendering, routing and the HTTP calls are
//! external collaborators reached through traits.
//!
//! ## Architecture
//!
//! ```text
//! Views (lobby/, game/)
//!     │        ▲
//!     │        └── TopicStream (bounded queue per topic)
//!     │
//!     ├── RealtimeClient (client.rs, composition root)
//!     │
//!     ├── SubscriptionRegistry (subscription/)
//!     ├── MessageRouter (router/)
//!     │
//!     ├── SessionManager (session/)
//!     │
//!     └── Transport (external; MemoryBroker in-process)
//! ```

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod game;
pub mod lobby;
pub mod navigation;
pub mod router;
pub mod session;
pub mod subscription;
