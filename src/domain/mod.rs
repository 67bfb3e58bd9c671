//! Domain layer: identifiers, topic naming and the server's payloads.
//!
//! Nothing in here performs I/O. The session core moves these values
//! around; the lobby and game state machines interpret them.

pub mod chat;
pub mod game_id;
pub mod snapshot;
pub mod topic;

pub use chat::ChatMessage;
pub use game_id::GameId;
pub use snapshot::{DisconnectNotice, GameSnapshot, GameStatus, Player, ProgressUpdate, Question};
pub use topic::{GameTopics, Topic};
