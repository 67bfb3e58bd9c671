//! Request/response collaborator for game data.
//!
//! The HTTP client lives outside this crate; controllers only see
//! [`GameApi`]. [`MemoryGameApi`] backs the tests and the demo.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{GameId, GameSnapshot};
use crate::error::ApiError;

/// Body of an answer submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    /// Game being played.
    pub game_id: GameId,
    /// Question being answered, when the snapshot carried one.
    pub question_id: Option<i64>,
    /// Trimmed answer text.
    pub user_answer: String,
}

/// Game endpoints used by the lobby and game controllers.
#[async_trait]
pub trait GameApi: std::fmt::Debug + Send + Sync {
    /// Fetches the current snapshot of `game`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the game is unknown.
    async fn fetch_game(&self, game: &GameId) -> Result<GameSnapshot, ApiError>;

    /// Submits an answer.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::AnswerRejected`] for a wrong answer.
    async fn submit_answer(&self, submission: &AnswerSubmission)
    -> Result<GameSnapshot, ApiError>;
}

#[derive(Debug, Default)]
struct Games {
    snapshots: HashMap<GameId, GameSnapshot>,
    answers: HashMap<GameId, String>,
    submissions: Vec<AnswerSubmission>,
}

/// In-process [`GameApi`] holding snapshots and expected answers.
#[derive(Debug, Default)]
pub struct MemoryGameApi {
    games: Mutex<Games>,
}

impl MemoryGameApi {
    /// Creates an API with no games.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn games(&self) -> MutexGuard<'_, Games> {
        self.games.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `snapshot` as the current state of its game.
    pub fn put_game(&self, snapshot: GameSnapshot) {
        self.games().snapshots.insert(snapshot.id.clone(), snapshot);
    }

    /// Sets the answer accepted for `game`; comparison ignores case and
    /// surrounding whitespace.
    pub fn expect_answer(&self, game: &GameId, answer: impl Into<String>) {
        self.games().answers.insert(game.clone(), answer.into());
    }

    /// Submissions received so far.
    #[must_use]
    pub fn submissions(&self) -> Vec<AnswerSubmission> {
        self.games().submissions.clone()
    }
}

#[async_trait]
impl GameApi for MemoryGameApi {
    async fn fetch_game(&self, game: &GameId) -> Result<GameSnapshot, ApiError> {
        self.games()
            .snapshots
            .get(game)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(game.to_string()))
    }

    async fn submit_answer(
        &self,
        submission: &AnswerSubmission,
    ) -> Result<GameSnapshot, ApiError> {
        let mut games = self.games();
        games.submissions.push(submission.clone());
        let snapshot = games
            .snapshots
            .get(&submission.game_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(submission.game_id.to_string()))?;
        let accepted = games
            .answers
            .get(&submission.game_id)
            .is_some_and(|a| a.trim().eq_ignore_ascii_case(submission.user_answer.trim()));
        if accepted {
            Ok(snapshot)
        } else {
            Err(ApiError::AnswerRejected)
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_game_is_not_found() {
        let api = MemoryGameApi::new();
        assert_eq!(
            api.fetch_game(&GameId::from("9")).await,
            Err(ApiError::NotFound("9".into()))
        );
    }

    #[tokio::test]
    async fn answer_matching_ignores_case() {
        let api = MemoryGameApi::new();
        let id = GameId::from("1");
        api.put_game(GameSnapshot::new(id.clone()));
        api.expect_answer(&id, "Paris");

        let wrong = AnswerSubmission {
            game_id: id.clone(),
            question_id: Some(3),
            user_answer: "Lyon".into(),
        };
        assert_eq!(api.submit_answer(&wrong).await, Err(ApiError::AnswerRejected));

        let right = AnswerSubmission {
            user_answer: " paris ".into(),
            ..wrong
        };
        let Ok(snapshot) = api.submit_answer(&right).await else {
            panic!("answer should be accepted");
        };
        assert_eq!(snapshot.id, id);
        assert_eq!(api.submissions().len(), 2);
    }
}
