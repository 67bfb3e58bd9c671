//! In-game view state and the rules that merge server pushes into it.
//!
//! [`GameReconciler`] is synchronous and clock-free: each input returns the
//! [`ViewCue`]s the UI should play. The controller owns timers and I/O.
//!
//! # Merge rules
//!
//! - A snapshot replaces every gameplay field (last writer wins).
//! - Once the game is `Finished`, snapshots no longer touch gameplay
//!   fields; chat keeps flowing.
//! - A dice-roll presentation starts when an in-progress snapshot changes
//!   the dice from a previously known value, or on the first snapshot after
//!   an accepted answer. While one is showing, later values re-key it.

use crate::domain::{
    ChatMessage, DisconnectNotice, GameId, GameSnapshot, GameStatus, Player, Question,
};
use crate::error::ApiError;

use super::api::AnswerSubmission;

/// Shown when a blank answer is submitted.
pub const EMPTY_ANSWER: &str = "Answer cannot be empty";
/// Shown when the server rejects an answer.
pub const WRONG_ANSWER: &str = "Wrong answer! Try again.";
/// Shown when the answer request itself fails.
pub const SUBMIT_FAILED: &str = "Failed to submit answer. Please try again.";
/// Shown when the game view cannot subscribe.
pub const SETUP_FAILED: &str = "Failed to setup game. Please try again.";
/// Participant named in a disconnect notice that carries none.
const UNKNOWN_PARTICIPANT: &str = "Your opponent";

/// Modal shown after a participant disconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectModal {
    /// Game the notice was for.
    pub game_id: GameId,
    /// Who left.
    pub participant: String,
    /// Rendered message.
    pub message: String,
}

/// Whether the normal view or the disconnect modal is showing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Regular game screen.
    #[default]
    Normal,
    /// Modal alert blocking the game screen.
    DisconnectAlert(DisconnectModal),
}

/// Choice offered by the disconnect modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissAction {
    /// Close the modal and stay on the game screen.
    Stay,
    /// Close the modal and go home.
    Home,
}

/// Transient effect for the UI to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCue {
    /// Start the dice animation showing the value.
    DiceRollStarted(u8),
    /// The running dice animation should now show the value.
    DiceRollRekeyed(u8),
    /// A remote chat message arrived while the panel was collapsed.
    ChatNotification {
        /// Message author.
        sender: String,
    },
    /// A participant disconnected.
    DisconnectAlert(DisconnectModal),
    /// The game reached `Finished`.
    GameFinished {
        /// Winner's username, if any.
        winner: Option<String>,
    },
}

/// Everything the game screen renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameView {
    /// Game shown.
    pub game_id: GameId,
    /// First and second participant.
    pub players: [Option<Player>; 2],
    /// Points of the first and second participant.
    pub scores: [i32; 2],
    /// Question being played.
    pub current_question: Option<Question>,
    /// Letter the answer must start with.
    pub current_letter: Option<String>,
    /// Last rolled dice value.
    pub current_dice: Option<u8>,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Winner once finished.
    pub winner: Option<Player>,
    /// Chat messages in arrival order.
    pub chat_log: Vec<ChatMessage>,
    /// Remote messages received while the chat panel was collapsed.
    pub unread_count: u32,
    /// Chat panel expanded.
    pub chat_open: bool,
    /// No snapshot received yet.
    pub loading: bool,
    /// User-facing error line.
    pub error: Option<String>,
    /// Normal screen or disconnect modal.
    pub mode: ViewMode,
    /// Dice value of the presentation currently showing.
    pub dice_roll: Option<u8>,
}

impl GameView {
    /// Empty view for `game_id`, waiting for its first snapshot.
    #[must_use]
    pub fn new(game_id: GameId) -> Self {
        Self {
            game_id,
            players: [None, None],
            scores: [0, 0],
            current_question: None,
            current_letter: None,
            current_dice: None,
            status: GameStatus::Waiting,
            winner: None,
            chat_log: Vec::new(),
            unread_count: 0,
            chat_open: true,
            loading: true,
            error: None,
            mode: ViewMode::Normal,
            dice_roll: None,
        }
    }

    /// Returns `true` while the disconnect modal is showing.
    #[must_use]
    pub const fn is_alerting(&self) -> bool {
        matches!(self.mode, ViewMode::DisconnectAlert(_))
    }
}

/// Applies inputs to a [`GameView`].
#[derive(Debug, Clone)]
pub struct GameReconciler {
    view: GameView,
    local_user: String,
    roll_expected: bool,
    pushes_seen: u64,
}

impl GameReconciler {
    /// Creates a reconciler for `game_id` as seen by `local_user`.
    #[must_use]
    pub fn new(game_id: GameId, local_user: impl Into<String>) -> Self {
        Self {
            view: GameView::new(game_id),
            local_user: local_user.into(),
            roll_expected: false,
            pushes_seen: 0,
        }
    }

    /// Current view.
    #[must_use]
    pub const fn view(&self) -> &GameView {
        &self.view
    }

    /// Number of snapshots merged from pushes so far.
    #[must_use]
    pub const fn pushes_seen(&self) -> u64 {
        self.pushes_seen
    }

    /// Merges a pushed snapshot.
    pub fn apply_snapshot(&mut self, snapshot: GameSnapshot) -> Vec<ViewCue> {
        if snapshot.id != self.view.game_id {
            tracing::warn!(
                expected = %self.view.game_id,
                got = %snapshot.id,
                "ignoring snapshot for another game"
            );
            return Vec::new();
        }
        self.pushes_seen = self.pushes_seen.saturating_add(1);
        let previous_dice = self.view.current_dice;
        let mut cues = Vec::new();
        if !self.merge(snapshot, &mut cues) {
            return cues;
        }
        if self.view.status != GameStatus::InProgress {
            return cues;
        }
        let Some(dice) = self.view.current_dice else {
            return cues;
        };

        if self.view.dice_roll.is_some() {
            if self.view.dice_roll != Some(dice) {
                self.view.dice_roll = Some(dice);
                cues.push(ViewCue::DiceRollRekeyed(dice));
            }
        } else if self.roll_expected || previous_dice.is_some_and(|p| p != dice) {
            cues.push(self.start_roll(dice));
        }
        cues
    }

    /// Replaces gameplay fields. Returns `false` if the view is already
    /// finished and the snapshot was not applied.
    fn merge(&mut self, snapshot: GameSnapshot, cues: &mut Vec<ViewCue>) -> bool {
        self.view.loading = false;
        if self.view.status == GameStatus::Finished {
            tracing::debug!(game = %self.view.game_id, "game finished, snapshot ignored");
            return false;
        }
        let dice = snapshot.rolled_dice();
        let view = &mut self.view;
        view.players = [snapshot.first_user, snapshot.second_user];
        view.scores = [
            snapshot.first_user_points.unwrap_or_default(),
            snapshot.second_user_points.unwrap_or_default(),
        ];
        view.current_question = snapshot.current_question;
        view.current_letter = snapshot.current_letter;
        view.current_dice = dice;
        view.status = snapshot.status;
        view.winner = snapshot.winner;

        if view.status == GameStatus::Finished {
            view.dice_roll = None;
            self.roll_expected = false;
            let winner = view.winner.as_ref().map(|p| p.username.clone());
            tracing::info!(game = %view.game_id, winner = ?winner, "game finished");
            cues.push(ViewCue::GameFinished { winner });
        }
        true
    }

    fn start_roll(&mut self, dice: u8) -> ViewCue {
        self.roll_expected = false;
        self.view.dice_roll = Some(dice);
        ViewCue::DiceRollStarted(dice)
    }

    /// Ends the dice presentation; returns the value that was showing.
    pub fn finish_dice_roll(&mut self) -> Option<u8> {
        self.view.dice_roll.take()
    }

    /// Validates `answer` and builds the request.
    ///
    /// A blank answer sets the error line and returns `None`.
    pub fn prepare_answer(&mut self, answer: &str) -> Option<AnswerSubmission> {
        let answer = answer.trim();
        if answer.is_empty() {
            self.view.error = Some(EMPTY_ANSWER.to_string());
            return None;
        }
        self.view.error = None;
        Some(AnswerSubmission {
            game_id: self.view.game_id.clone(),
            question_id: self.view.current_question.as_ref().and_then(|q| q.id),
            user_answer: answer.to_string(),
        })
    }

    /// Applies an accepted answer.
    ///
    /// `pushes_at_submit` is [`Self::pushes_seen`] when the request was sent.
    /// If no push arrived since, the response is merged and the next push
    /// starts the dice roll; otherwise the newer push already holds the
    /// authoritative dice and the roll starts from it now.
    pub fn answer_accepted(&mut self, response: GameSnapshot, pushes_at_submit: u64) -> Vec<ViewCue> {
        self.view.error = None;
        let mut cues = Vec::new();
        if self.pushes_seen == pushes_at_submit {
            self.merge(response, &mut cues);
            if self.view.status == GameStatus::InProgress {
                self.roll_expected = true;
            }
            return cues;
        }
        if self.view.status == GameStatus::InProgress && self.view.dice_roll.is_none() {
            if let Some(dice) = self.view.current_dice {
                cues.push(self.start_roll(dice));
            }
        }
        cues
    }

    /// Applies a failed answer request.
    pub fn answer_failed(&mut self, error: &ApiError) {
        let line = match error {
            ApiError::AnswerRejected => WRONG_ANSWER,
            _ => SUBMIT_FAILED,
        };
        self.view.error = Some(line.to_string());
    }

    /// Appends a chat message.
    pub fn apply_chat(&mut self, message: ChatMessage) -> Vec<ViewCue> {
        let remote = message.sender != self.local_user;
        let sender = message.sender.clone();
        self.view.chat_log.push(message);
        if self.view.chat_open || !remote {
            return Vec::new();
        }
        self.view.unread_count = self.view.unread_count.saturating_add(1);
        vec![ViewCue::ChatNotification { sender }]
    }

    /// Expands the chat panel and clears the unread counter.
    pub fn open_chat(&mut self) {
        self.view.chat_open = true;
        self.view.unread_count = 0;
    }

    /// Collapses the chat panel.
    pub fn close_chat(&mut self) {
        self.view.chat_open = false;
    }

    /// Applies a disconnect notice and raises the modal.
    pub fn apply_disconnect(&mut self, notice: DisconnectNotice) -> Vec<ViewCue> {
        let mut cues = Vec::new();
        if let Some(game) = notice.game {
            cues = self.apply_snapshot(game);
        }
        let participant = notice
            .disconnected_player
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string());
        let game_id = self.view.game_id.clone();
        let modal = DisconnectModal {
            message: format!("{participant} has disconnected from game {game_id}!"),
            game_id,
            participant,
        };
        tracing::info!(game = %modal.game_id, participant = %modal.participant, "participant disconnected");
        self.view.mode = ViewMode::DisconnectAlert(modal.clone());
        cues.push(ViewCue::DisconnectAlert(modal));
        cues
    }

    /// Closes the disconnect modal. Returns the action taken, or `None` if
    /// no modal was showing.
    pub fn dismiss_disconnect(&mut self, action: DismissAction) -> Option<DismissAction> {
        if !self.view.is_alerting() {
            return None;
        }
        self.view.mode = ViewMode::Normal;
        Some(action)
    }

    /// Sets the error line.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.view.error = Some(message.into());
    }
}
