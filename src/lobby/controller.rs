//! Lobby view driver.
//!
//! [`LobbyController::mount`] spawns one task per lobby view. The task
//! owns the progress subscription and the countdown timer, and reports the
//! terminal transition to the [`Navigator`]. Unmounting stops the timer and
//! releases the subscription unless it was already handed to the game.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::countdown::{CountdownPhase, CountdownSynchronizer, Observation, Tick};
use crate::client::RealtimeClient;
use crate::config::ClientConfig;
use crate::domain::{GameId, GameSnapshot, ProgressUpdate, Topic};
use crate::error::SessionError;
use crate::game::GameApi;
use crate::navigation::{Navigation, Navigator};
use crate::router::InboundMessage;
use crate::subscription::TopicStream;

/// What the lobby view renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyState {
    /// Countdown phase.
    pub phase: CountdownPhase,
    /// Seconds on the counter, while counting.
    pub remaining_seconds: Option<u32>,
    /// Latest game data.
    pub game: GameSnapshot,
}

impl LobbyState {
    fn from_sync(sync: &CountdownSynchronizer) -> Self {
        Self {
            phase: sync.phase(),
            remaining_seconds: sync.state().map(|s| s.remaining_seconds),
            game: sync.latest().clone(),
        }
    }
}

/// How a lobby task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyOutcome {
    /// Countdown expired and the game view was requested.
    EnteredGame,
    /// Connect or subscribe failed; home was requested.
    SetupFailed(SessionError),
    /// Unmounted before the countdown expired.
    Unmounted,
}

/// Spawns lobby views.
#[derive(Debug, Clone)]
pub struct LobbyController {
    client: RealtimeClient,
    api: Arc<dyn GameApi>,
    navigator: Arc<dyn Navigator>,
    fallback_secs: u32,
    tick: Duration,
}

impl LobbyController {
    /// Creates a controller sharing `client`.
    #[must_use]
    pub fn new(
        client: RealtimeClient,
        api: Arc<dyn GameApi>,
        navigator: Arc<dyn Navigator>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            client,
            api,
            navigator,
            fallback_secs: config.countdown_fallback_secs,
            tick: config.countdown_tick,
        }
    }

    /// Mounts a lobby view for `game`.
    #[must_use]
    pub fn mount(&self, game: GameId) -> LobbyHandle {
        let sync = CountdownSynchronizer::new(game.clone(), self.fallback_secs);
        let (state_tx, state_rx) = watch::channel(LobbyState::from_sync(&sync));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.clone().run(game, sync, state_tx, shutdown_rx));
        LobbyHandle {
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run(
        self,
        game: GameId,
        mut sync: CountdownSynchronizer,
        state: watch::Sender<LobbyState>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> LobbyOutcome {
        let topic = Topic::game_progress(&game);
        let mut stream = match self.client.subscribe_queue(topic).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(game = %game, error = %err, "lobby setup failed");
                self.navigator.navigate(Navigation::Home);
                return LobbyOutcome::SetupFailed(err);
            }
        };

        match self.api.fetch_game(&game).await {
            Ok(snapshot) => {
                let update = ProgressUpdate {
                    game: snapshot,
                    start_timestamp: None,
                };
                sync.observe(update, now_ms());
            }
            Err(err) => tracing::warn!(game = %game, error = %err, "initial game fetch failed"),
        }
        state.send_replace(LobbyState::from_sync(&sync));

        let mut ticker = sync.is_counting().then(|| self.ticker());
        let mut stream_open = true;

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => break LobbyOutcome::Unmounted,
                message = stream.recv(), if stream_open => {
                    let Some(message) = message else {
                        tracing::warn!(game = %game, "progress stream closed");
                        stream_open = false;
                        continue;
                    };
                    if self.on_progress(&mut sync, &message) && ticker.is_none() {
                        ticker = Some(self.ticker());
                    }
                }
                () = next_tick(&mut ticker) => match sync.tick() {
                    Tick::Remaining(left) => {
                        tracing::debug!(game = %game, left, "countdown");
                    }
                    Tick::Expired(snapshot) => {
                        tracing::info!(game = %game, "countdown expired, entering game");
                        state.send_replace(LobbyState::from_sync(&sync));
                        self.navigator.navigate(Navigation::Game {
                            snapshot,
                            progress: Some(stream),
                        });
                        return LobbyOutcome::EnteredGame;
                    }
                    Tick::Idle => ticker = None,
                },
            }
            state.send_replace(LobbyState::from_sync(&sync));
        };

        release(&mut sync, stream).await;
        state.send_replace(LobbyState::from_sync(&sync));
        outcome
    }

    /// Applies one progress frame; returns `true` if a countdown started.
    fn on_progress(&self, sync: &mut CountdownSynchronizer, message: &InboundMessage) -> bool {
        let update: ProgressUpdate = match message.decode() {
            Ok(update) => update,
            Err(err) => {
                tracing::warn!(topic = %message.topic, error = %err, "ignoring progress frame");
                return false;
            }
        };
        match sync.observe(update, now_ms()) {
            Observation::Armed(seconds) => {
                tracing::info!(topic = %message.topic, seconds, "match starting");
                true
            }
            Observation::Rearmed(seconds) => {
                tracing::debug!(topic = %message.topic, seconds, "countdown resynchronized");
                false
            }
            Observation::Ignored | Observation::Updated | Observation::Kept => false,
        }
    }

    fn ticker(&self) -> Interval {
        let mut interval = tokio::time::interval_at(Instant::now() + self.tick, self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}

async fn release(sync: &mut CountdownSynchronizer, stream: TopicStream) {
    if sync.teardown() {
        stream.release().await;
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A mounted lobby view.
#[derive(Debug)]
pub struct LobbyHandle {
    state: watch::Receiver<LobbyState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<LobbyOutcome>,
}

impl LobbyHandle {
    /// Current rendered state.
    #[must_use]
    pub fn state(&self) -> LobbyState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<LobbyState> {
        self.state.clone()
    }

    /// Stops the view and waits for its teardown.
    pub async fn unmount(mut self) -> LobbyOutcome {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already be done, which drops the receiver.
            let _ = shutdown.send(());
        }
        self.join().await
    }

    /// Waits for the view to end on its own.
    pub async fn finished(self) -> LobbyOutcome {
        self.join().await
    }

    async fn join(self) -> LobbyOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "lobby task failed");
                LobbyOutcome::Unmounted
            }
        }
    }
}
