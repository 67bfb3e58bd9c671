//! Chat message exchanged on a game's chat topic.

use serde::{Deserialize, Serialize};

use super::GameId;

/// One chat line, inbound or outbound.
///
/// Outbound messages carry every field. Inbound ones are decoded leniently:
/// the server rewrites `timestamp` to `HH:mm` and may omit `gameId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Game the message belongs to.
    #[serde(default)]
    pub game_id: Option<GameId>,
    /// Username of the author.
    #[serde(default)]
    pub sender: String,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// Free-form timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    /// Builds an outbound message stamped with the current UTC time.
    #[must_use]
    pub fn outbound(game_id: GameId, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            game_id: Some(game_id),
            sender: sender.into(),
            content: content.into(),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}
