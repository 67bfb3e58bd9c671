//! Outward navigation requests from the view state machines.
//!
//! Routing itself belongs to the embedding UI. The lobby and game
//! controllers only say where to go next through a [`Navigator`].

use std::fmt;

use tokio::sync::mpsc;

use crate::domain::GameSnapshot;
use crate::subscription::TopicStream;

/// Destination requested by a controller.
#[derive(Debug)]
pub enum Navigation {
    /// Back to the home screen.
    Home,
    /// Into the active game.
    Game {
        /// Latest known game data.
        snapshot: GameSnapshot,
        /// Progress subscription handed over from the lobby, if any.
        progress: Option<TopicStream>,
    },
}

impl Navigation {
    /// Returns `true` for [`Navigation::Home`].
    #[must_use]
    pub const fn is_home(&self) -> bool {
        matches!(self, Self::Home)
    }
}

/// Receiver of navigation requests.
pub trait Navigator: fmt::Debug + Send + Sync {
    /// Requests a move to `to`. Must not block.
    fn navigate(&self, to: Navigation);
}

impl Navigator for mpsc::UnboundedSender<Navigation> {
    fn navigate(&self, to: Navigation) {
        if self.send(to).is_err() {
            tracing::warn!("navigation requested but nobody is listening");
        }
    }
}
