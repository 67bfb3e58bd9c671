//! Authoritative game payloads pushed by the server.
//!
//! These mirror the server's JSON (camelCase). Apart from the game id every
//! field may be missing or null, so consumers never assume a complete
//! snapshot.

use serde::{Deserialize, Serialize};

use super::GameId;

/// Lifecycle status of a game.
///
/// Wire values are `NEW`, `IN_PROGRESS` and `FINISHED`. Anything
/// unrecognised, or null, decodes as [`GameStatus::Waiting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum GameStatus {
    /// Waiting for the second player.
    #[default]
    Waiting,
    /// Both players joined; questions are being played.
    InProgress,
    /// Terminal.
    Finished,
}

impl From<Option<String>> for GameStatus {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref() {
            Some("IN_PROGRESS") => Self::InProgress,
            Some("FINISHED") => Self::Finished,
            _ => Self::Waiting,
        }
    }
}

impl From<GameStatus> for String {
    fn from(status: GameStatus) -> Self {
        match status {
            GameStatus::Waiting => "NEW",
            GameStatus::InProgress => "IN_PROGRESS",
            GameStatus::Finished => "FINISHED",
        }
        .to_string()
    }
}

/// A participant as embedded in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Player {
    /// Login name.
    #[serde(default)]
    pub username: String,
}

/// The question currently being asked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Question {
    /// Server-side question key.
    #[serde(default)]
    pub id: Option<i64>,
    /// Question text.
    #[serde(default)]
    pub text: String,
    /// Points awarded for a correct answer.
    #[serde(default)]
    pub points: i32,
}

/// Full authoritative state of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Game identifier.
    pub id: GameId,
    /// Lifecycle status.
    #[serde(default, rename = "gameStatusEnum")]
    pub status: GameStatus,
    /// First player, if joined.
    #[serde(default)]
    pub first_user: Option<Player>,
    /// Second player, if joined.
    #[serde(default)]
    pub second_user: Option<Player>,
    /// Score of the first player.
    #[serde(default)]
    pub first_user_points: Option<i32>,
    /// Score of the second player.
    #[serde(default)]
    pub second_user_points: Option<i32>,
    /// Winner once finished.
    #[serde(default)]
    pub winner: Option<Player>,
    /// Question being asked.
    #[serde(default)]
    pub current_question: Option<Question>,
    /// Last dice value; `0` means not rolled yet.
    #[serde(default)]
    pub current_dice: Option<u8>,
    /// Letter the answer must start with.
    #[serde(default)]
    pub current_letter: Option<String>,
}

impl GameSnapshot {
    /// Creates an otherwise empty snapshot for `id`.
    #[must_use]
    pub fn new(id: GameId) -> Self {
        Self {
            id,
            status: GameStatus::Waiting,
            first_user: None,
            second_user: None,
            first_user_points: None,
            second_user_points: None,
            winner: None,
            current_question: None,
            current_dice: None,
            current_letter: None,
        }
    }

    /// Returns the dice value if one has been rolled.
    #[must_use]
    pub fn rolled_dice(&self) -> Option<u8> {
        self.current_dice.filter(|d| *d > 0)
    }
}

/// Payload of the progress topic.
///
/// The server sends either `{ "game": {...}, "startTimestamp": 1700000000000 }`
/// or a bare game snapshot; both decode here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// The game state carried by the update.
    pub game: GameSnapshot,
    /// Server-issued match start, epoch milliseconds.
    pub start_timestamp: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProgress {
    Envelope {
        game: GameSnapshot,
        #[serde(default, rename = "startTimestamp")]
        start_timestamp: Option<i64>,
    },
    Bare(GameSnapshot),
}

impl<'de> Deserialize<'de> for ProgressUpdate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawProgress::deserialize(deserializer)? {
            RawProgress::Envelope {
                game,
                start_timestamp,
            } => Self {
                game,
                start_timestamp,
            },
            RawProgress::Bare(game) => Self {
                game,
                start_timestamp: None,
            },
        })
    }
}

/// Notice that a participant dropped out of a game.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectNotice {
    /// Notice kind, `PLAYER_DISCONNECTED` today.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Game state after the server settled the disconnect.
    #[serde(default)]
    pub game: Option<GameSnapshot>,
    /// Username of the participant who left.
    #[serde(default)]
    pub disconnected_player: Option<String>,
}
