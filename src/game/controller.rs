//! Game view driver.
//!
//! One task per mounted game view runs a single `select!` loop over the
//! four inbound topic queues, UI commands, the dice-roll timer and the
//! answer request in flight. Every exit path releases the four
//! subscriptions before the task ends.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Sleep;

use super::api::GameApi;
use super::reconciler::{DismissAction, GameReconciler, GameView, SETUP_FAILED, ViewCue};
use crate::client::RealtimeClient;
use crate::config::ClientConfig;
use crate::domain::{
    ChatMessage, DisconnectNotice, GameId, GameSnapshot, GameTopics, ProgressUpdate, Topic,
};
use crate::error::{ApiError, SessionError};
use crate::navigation::{Navigation, Navigator};
use crate::router::InboundMessage;
use crate::subscription::TopicStream;

/// Input from the game screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameCommand {
    /// Submit the typed answer.
    SubmitAnswer(String),
    /// Send a chat message.
    SendChat(String),
    /// Expand the chat panel.
    OpenChat,
    /// Collapse the chat panel.
    CloseChat,
    /// Close the disconnect modal.
    DismissDisconnect(DismissAction),
}

/// How a game task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    /// The view was unmounted.
    Unmounted,
    /// The user left through the disconnect modal.
    LeftHome,
    /// Subscribing failed; the error line was set.
    SetupFailed(SessionError),
}

type AnswerTask = JoinHandle<Result<GameSnapshot, ApiError>>;

/// Spawns game views.
#[derive(Debug, Clone)]
pub struct GameController {
    client: RealtimeClient,
    api: Arc<dyn GameApi>,
    navigator: Arc<dyn Navigator>,
    local_user: String,
    dice_roll_duration: Duration,
    cue_capacity: usize,
}

struct Streams {
    chat: TopicStream,
    progress: TopicStream,
    dice: TopicStream,
    disconnect: TopicStream,
}

impl Streams {
    async fn release(self) {
        for stream in [self.chat, self.progress, self.dice, self.disconnect] {
            stream.release().await;
        }
    }
}

impl GameController {
    /// Creates a controller acting for `local_user`.
    #[must_use]
    pub fn new(
        client: RealtimeClient,
        api: Arc<dyn GameApi>,
        navigator: Arc<dyn Navigator>,
        local_user: impl Into<String>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            client,
            api,
            navigator,
            local_user: local_user.into(),
            dice_roll_duration: config.dice_roll_duration,
            cue_capacity: config.handler_queue_capacity.max(1),
        }
    }

    /// Mounts a game view for `game`.
    ///
    /// `progress` is the stream handed over by the lobby, if any; otherwise
    /// the progress topic is subscribed here.
    #[must_use]
    pub fn mount(&self, game: GameId, progress: Option<TopicStream>) -> GameHandle {
        let reconciler = GameReconciler::new(game.clone(), self.local_user.clone());
        let (view_tx, view_rx) = watch::channel(reconciler.view().clone());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (cue_tx, cue_rx) = mpsc::channel(self.cue_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = GameTask {
            controller: self.clone(),
            game,
            reconciler,
            view: view_tx,
            cues: cue_tx,
        };
        let task = tokio::spawn(task.run(progress, command_rx, shutdown_rx));
        GameHandle {
            view: view_rx,
            commands: command_tx,
            cues: cue_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

struct GameTask {
    controller: GameController,
    game: GameId,
    reconciler: GameReconciler,
    view: watch::Sender<GameView>,
    cues: mpsc::Sender<ViewCue>,
}

impl GameTask {
    async fn run(
        mut self,
        handed_over: Option<TopicStream>,
        mut commands: mpsc::UnboundedReceiver<GameCommand>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> GameOutcome {
        let mut streams = match self.subscribe(handed_over).await {
            Ok(streams) => streams,
            Err(err) => {
                tracing::warn!(game = %self.game, error = %err, "game setup failed");
                self.reconciler.set_error(SETUP_FAILED);
                self.publish();
                return GameOutcome::SetupFailed(err);
            }
        };

        match self.controller.api.fetch_game(&self.game).await {
            Ok(snapshot) => {
                let cues = self.reconciler.apply_snapshot(snapshot);
                self.emit(cues, &mut None);
            }
            Err(err) => tracing::warn!(game = %self.game, error = %err, "initial game fetch failed"),
        }
        self.publish();

        let mut dice_timer: Option<Pin<Box<Sleep>>> = None;
        let mut answer: Option<(u64, AnswerTask)> = None;
        let mut open = [true; 4];

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => break GameOutcome::Unmounted,
                command = commands.recv() => {
                    let Some(command) = command else {
                        break GameOutcome::Unmounted;
                    };
                    if let Some(outcome) = self.on_command(command, &mut answer).await {
                        break outcome;
                    }
                }
                message = streams.progress.recv(), if open[0] => match message {
                    Some(m) => {
                        if let Some(update) = decode::<ProgressUpdate>(&m) {
                            let cues = self.reconciler.apply_snapshot(update.game);
                            self.emit(cues, &mut dice_timer);
                        }
                    }
                    None => open[0] = closed(&self.game, "progress"),
                },
                message = streams.dice.recv(), if open[1] => match message {
                    Some(m) => {
                        if let Some(snapshot) = decode::<GameSnapshot>(&m) {
                            let cues = self.reconciler.apply_snapshot(snapshot);
                            self.emit(cues, &mut dice_timer);
                        }
                    }
                    None => open[1] = closed(&self.game, "dice"),
                },
                message = streams.disconnect.recv(), if open[2] => match message {
                    Some(m) => {
                        if let Some(notice) = decode::<DisconnectNotice>(&m) {
                            let cues = self.reconciler.apply_disconnect(notice);
                            self.emit(cues, &mut dice_timer);
                        }
                    }
                    None => open[2] = closed(&self.game, "disconnect"),
                },
                message = streams.chat.recv(), if open[3] => match message {
                    Some(m) => {
                        if let Some(chat) = decode::<ChatMessage>(&m) {
                            let cues = self.reconciler.apply_chat(chat);
                            self.emit(cues, &mut dice_timer);
                        }
                    }
                    None => open[3] = closed(&self.game, "chat"),
                },
                () = fire(&mut dice_timer) => {
                    dice_timer = None;
                    if let Some(dice) = self.reconciler.finish_dice_roll() {
                        tracing::debug!(game = %self.game, dice, "dice roll finished");
                    }
                }
                (pushes_at_submit, result) = settle(&mut answer) => {
                    answer = None;
                    self.on_answer(pushes_at_submit, result, &mut dice_timer);
                }
            }
            self.publish();
        };

        if let Some((_, task)) = answer.take() {
            task.abort();
        }
        streams.release().await;
        tracing::debug!(game = %self.game, ?outcome, "game view closed");
        outcome
    }

    async fn subscribe(&self, handed_over: Option<TopicStream>) -> Result<Streams, SessionError> {
        let topics = GameTopics::for_game(&self.game);
        let client = &self.controller.client;

        let handed_over = match handed_over {
            Some(stream) if stream.topic() == &topics.progress => Some(stream),
            Some(stream) => {
                tracing::warn!(topic = %stream.topic(), "handed-over stream is not this game's progress");
                stream.release().await;
                None
            }
            None => None,
        };

        let chat = client.subscribe_queue(topics.chat.clone()).await?;
        let progress = match handed_over {
            Some(stream) => stream,
            None => match client.subscribe_queue(topics.progress.clone()).await {
                Ok(stream) => stream,
                Err(err) => {
                    chat.release().await;
                    return Err(err);
                }
            },
        };
        let dice = match client.subscribe_queue(topics.dice_rolled.clone()).await {
            Ok(stream) => stream,
            Err(err) => {
                chat.release().await;
                progress.release().await;
                return Err(err);
            }
        };
        let disconnect = match client.subscribe_queue(topics.disconnect.clone()).await {
            Ok(stream) => stream,
            Err(err) => {
                chat.release().await;
                progress.release().await;
                dice.release().await;
                return Err(err);
            }
        };
        Ok(Streams {
            chat,
            progress,
            dice,
            disconnect,
        })
    }

    async fn on_command(
        &mut self,
        command: GameCommand,
        answer: &mut Option<(u64, AnswerTask)>,
    ) -> Option<GameOutcome> {
        match command {
            GameCommand::SubmitAnswer(text) => {
                if answer.is_some() {
                    tracing::debug!(game = %self.game, "answer already in flight");
                    return None;
                }
                let submission = self.reconciler.prepare_answer(&text)?;
                let api = Arc::clone(&self.controller.api);
                let pushes = self.reconciler.pushes_seen();
                *answer = Some((
                    pushes,
                    tokio::spawn(async move { api.submit_answer(&submission).await }),
                ));
            }
            GameCommand::SendChat(text) => self.send_chat(&text).await,
            GameCommand::OpenChat => self.reconciler.open_chat(),
            GameCommand::CloseChat => self.reconciler.close_chat(),
            GameCommand::DismissDisconnect(action) => {
                if self.reconciler.dismiss_disconnect(action) == Some(DismissAction::Home) {
                    self.controller.navigator.navigate(Navigation::Home);
                    return Some(GameOutcome::LeftHome);
                }
            }
        }
        None
    }

    async fn send_chat(&self, text: &str) {
        let content = text.trim();
        if content.is_empty() {
            return;
        }
        let message = ChatMessage::outbound(
            self.game.clone(),
            self.controller.local_user.clone(),
            content,
        );
        let destination = Topic::chat_send(&self.game);
        if let Err(err) = self.controller.client.send(&destination, &message).await {
            tracing::warn!(destination = %destination, error = %err, "chat send failed");
        }
    }

    fn on_answer(
        &mut self,
        pushes_at_submit: u64,
        result: Result<Result<GameSnapshot, ApiError>, JoinError>,
        dice_timer: &mut Option<Pin<Box<Sleep>>>,
    ) {
        match result {
            Ok(Ok(snapshot)) => {
                tracing::info!(game = %self.game, "answer accepted");
                let cues = self.reconciler.answer_accepted(snapshot, pushes_at_submit);
                self.emit(cues, dice_timer);
            }
            Ok(Err(err)) => {
                tracing::info!(game = %self.game, error = %err, "answer not accepted");
                self.reconciler.answer_failed(&err);
            }
            Err(err) => {
                tracing::error!(game = %self.game, error = %err, "answer task failed");
                self.reconciler
                    .answer_failed(&ApiError::Request(err.to_string()));
            }
        }
    }

    /// Forwards cues to the UI and (re)starts the dice timer on a roll.
    /// Cues that do not fit in the bounded queue are dropped.
    fn emit(&self, cues: Vec<ViewCue>, dice_timer: &mut Option<Pin<Box<Sleep>>>) {
        for cue in cues {
            if matches!(cue, ViewCue::DiceRollStarted(_) | ViewCue::DiceRollRekeyed(_)) {
                *dice_timer = Some(Box::pin(tokio::time::sleep(
                    self.controller.dice_roll_duration,
                )));
            }
            match self.cues.try_send(cue) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(cue)) => {
                    tracing::warn!(game = %self.game, ?cue, "cue queue full, dropping cue");
                }
            }
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.reconciler.view().clone());
    }
}

fn decode<T: serde::de::DeserializeOwned>(message: &InboundMessage) -> Option<T> {
    match message.decode() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(topic = %message.topic, error = %err, "ignoring malformed payload");
            None
        }
    }
}

fn closed(game: &GameId, stream: &'static str) -> bool {
    tracing::warn!(game = %game, stream, "inbound stream closed");
    false
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn settle(
    answer: &mut Option<(u64, AnswerTask)>,
) -> (u64, Result<Result<GameSnapshot, ApiError>, JoinError>) {
    match answer {
        Some((pushes, task)) => (*pushes, task.await),
        None => std::future::pending().await,
    }
}

/// A mounted game view.
#[derive(Debug)]
pub struct GameHandle {
    view: watch::Receiver<GameView>,
    commands: mpsc::UnboundedSender<GameCommand>,
    cues: mpsc::Receiver<ViewCue>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<GameOutcome>,
}

impl GameHandle {
    /// Current rendered state.
    #[must_use]
    pub fn view(&self) -> GameView {
        self.view.borrow().clone()
    }

    /// Receiver that observes every view change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<GameView> {
        self.view.clone()
    }

    /// Sends a UI command. Returns `false` once the view has ended.
    pub fn command(&self, command: GameCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Submits an answer.
    pub fn submit_answer(&self, answer: impl Into<String>) -> bool {
        self.command(GameCommand::SubmitAnswer(answer.into()))
    }

    /// Sends a chat message.
    pub fn send_chat(&self, content: impl Into<String>) -> bool {
        self.command(GameCommand::SendChat(content.into()))
    }

    /// Expands the chat panel.
    pub fn open_chat(&self) -> bool {
        self.command(GameCommand::OpenChat)
    }

    /// Collapses the chat panel.
    pub fn close_chat(&self) -> bool {
        self.command(GameCommand::CloseChat)
    }

    /// Closes the disconnect modal.
    pub fn dismiss_disconnect(&self, action: DismissAction) -> bool {
        self.command(GameCommand::DismissDisconnect(action))
    }

    /// Waits for the next cue.
    pub async fn next_cue(&mut self) -> Option<ViewCue> {
        self.cues.recv().await
    }

    /// Returns a pending cue without waiting.
    pub fn try_cue(&mut self) -> Option<ViewCue> {
        self.cues.try_recv().ok()
    }

    /// Waits until `predicate` holds for the view, returning that view.
    ///
    /// Returns `None` if the view ended first.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&GameView) -> bool) -> Option<GameView> {
        self.view.wait_for(predicate).await.ok().map(|v| v.clone())
    }

    /// Stops the view and waits for its teardown.
    pub async fn unmount(mut self) -> GameOutcome {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.join().await
    }

    /// Waits for the view to end on its own.
    pub async fn finished(self) -> GameOutcome {
        self.join().await
    }

    async fn join(self) -> GameOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "game task failed");
                GameOutcome::Unmounted
            }
        }
    }
}
