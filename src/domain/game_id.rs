//! Game identifier.
//!
//! [`GameId`] is an opaque newtype around the server's game key. The server
//! emits it as a JSON number, chat payloads carry it as a string, so both
//! shapes decode to the same value.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier shared by every topic that belongs to one game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    /// Creates a `GameId` from its textual form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for GameId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawGameId {
    Number(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for GameId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawGameId::deserialize(deserializer)? {
            RawGameId::Number(n) => Self(n.to_string()),
            RawGameId::Text(s) => Self(s),
        })
    }
}
