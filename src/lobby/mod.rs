//! Lobby: the pre-game countdown and the view driver around it.

pub mod controller;
pub mod countdown;

pub use controller::{LobbyController, LobbyHandle, LobbyOutcome, LobbyState};
pub use countdown::{
    CountdownPhase, CountdownState, CountdownSynchronizer, Observation, Tick, remaining_seconds,
};
