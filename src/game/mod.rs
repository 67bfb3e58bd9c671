//! In-game state: the reconciler, its async driver and the game API seam.

pub mod api;
pub mod controller;
pub mod reconciler;

pub use api::{AnswerSubmission, GameApi, MemoryGameApi};
pub use controller::{GameCommand, GameController, GameHandle, GameOutcome};
pub use reconciler::{
    DismissAction, DisconnectModal, GameReconciler, GameView, ViewCue, ViewMode,
};
