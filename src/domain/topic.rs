//! Topic names and the per-game naming convention.
//!
//! Topic strings are a stable contract with the server. Every consumer that
//! wants a given stream must build the exact same string so the
//! subscription registry can deduplicate it, which is why all of them are
//! produced here.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::GameId;

/// A named push channel, e.g. `/topic/game-progress/42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Wraps a raw topic string.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Per-game progress snapshots (lobby start events and question progress).
    #[must_use]
    pub fn game_progress(game: &GameId) -> Self {
        Self(format!("/topic/game-progress/{game}"))
    }

    /// Per-game dice-roll snapshots.
    #[must_use]
    pub fn dice_rolled(game: &GameId) -> Self {
        Self(format!("/topic/dice-rolled/{game}"))
    }

    /// Per-game disconnect notices.
    #[must_use]
    pub fn disconnect_notice(game: &GameId) -> Self {
        Self(format!("/topic/game/{game}"))
    }

    /// Per-game chat stream.
    #[must_use]
    pub fn chat(game: &GameId) -> Self {
        Self(format!("/topic/chat/{game}"))
    }

    /// Outbound destination for chat messages of a game.
    #[must_use]
    pub fn chat_send(game: &GameId) -> Self {
        Self(format!("/app/chat/{game}"))
    }

    /// Returns the topic as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the topic name is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// The four inbound topics of one game, built once per view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameTopics {
    /// Progress snapshots.
    pub progress: Topic,
    /// Dice-roll snapshots.
    pub dice_rolled: Topic,
    /// Disconnect notices.
    pub disconnect: Topic,
    /// Chat messages.
    pub chat: Topic,
}

impl GameTopics {
    /// Builds every topic for `game`.
    #[must_use]
    pub fn for_game(game: &GameId) -> Self {
        Self {
            progress: Topic::game_progress(game),
            dice_rolled: Topic::dice_rolled(game),
            disconnect: Topic::disconnect_notice(game),
            chat: Topic::chat(game),
        }
    }

    /// Returns the topics in subscription order.
    #[must_use]
    pub fn all(&self) -> [&Topic; 4] {
        [&self.chat, &self.progress, &self.dice_rolled, &self.disconnect]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_convention_matches_server() {
        let id = GameId::from("17");
        assert_eq!(Topic::game_progress(&id).as_str(), "/topic/game-progress/17");
        assert_eq!(Topic::dice_rolled(&id).as_str(), "/topic/dice-rolled/17");
        assert_eq!(Topic::disconnect_notice(&id).as_str(), "/topic/game/17");
        assert_eq!(Topic::chat(&id).as_str(), "/topic/chat/17");
        assert_eq!(Topic::chat_send(&id).as_str(), "/app/chat/17");
    }

    #[test]
    fn same_game_builds_equal_topics() {
        let a = GameTopics::for_game(&GameId::from("9"));
        let b = GameTopics::for_game(&GameId::from("9"));
        assert_eq!(a, b);
    }

    #[test]
    fn blank_detection() {
        assert!(Topic::from("").is_blank());
        assert!(Topic::from("   ").is_blank());
        assert!(!Topic::from("/topic/x").is_blank());
    }
}
