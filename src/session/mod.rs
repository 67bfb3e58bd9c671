//! Session layer: the one authenticated link and its lifecycle.
//!
//! - [`transport`]: the [`Transport`] and [`CredentialProvider`] seams.
//! - [`state`]: the connection phase transition table.
//! - [`manager`]: [`SessionManager`], which serializes connect attempts.
//! - [`memory`]: an in-process broker implementing [`Transport`].

pub mod manager;
pub mod memory;
pub mod state;
pub mod transport;

pub use manager::SessionManager;
pub use memory::{MemoryBroker, MemoryTransport};
pub use state::{ConnectionPhase, SessionEvent};
pub use transport::{
    Credential, CredentialProvider, CredentialStore, SessionId, Transport, TransportHandle,
};
