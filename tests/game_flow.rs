//! Integration tests for the lobby and game views over the in-memory
//! broker: countdown timing, lobby → game hand-off, snapshot
//! reconciliation, chat accounting and the disconnect modal.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

use trivia_realtime::client::RealtimeClient;
use trivia_realtime::config::ClientConfig;
use trivia_realtime::domain::{GameId, GameSnapshot, GameStatus, GameTopics, Topic};
use trivia_realtime::game::reconciler::{EMPTY_ANSWER, WRONG_ANSWER};
use trivia_realtime::game::{
    DismissAction, GameApi, GameController, GameHandle, GameOutcome, MemoryGameApi, ViewCue,
    ViewMode,
};
use trivia_realtime::lobby::{LobbyController, LobbyOutcome};
use trivia_realtime::navigation::Navigation;
use trivia_realtime::session::{CredentialStore, MemoryBroker};

struct Harness {
    broker: MemoryBroker,
    client: RealtimeClient,
    api: Arc<MemoryGameApi>,
    nav_tx: mpsc::UnboundedSender<Navigation>,
    nav: mpsc::UnboundedReceiver<Navigation>,
    config: ClientConfig,
}

impl Harness {
    fn new(game: &str) -> Self {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(
            Arc::new(broker.transport()),
            Arc::new(CredentialStore::with_token("jwt")),
        );
        let api = Arc::new(MemoryGameApi::new());
        api.put_game(GameSnapshot::new(GameId::from(game)));
        let (nav_tx, nav) = mpsc::unbounded_channel::<Navigation>();
        Self {
            broker,
            client,
            api,
            nav_tx,
            nav,
            config: ClientConfig::default(),
        }
    }

    fn lobby(&self) -> LobbyController {
        LobbyController::new(
            self.client.clone(),
            Arc::clone(&self.api) as Arc<dyn GameApi>,
            Arc::new(self.nav_tx.clone()),
            &self.config,
        )
    }

    fn game(&self, local_user: &str) -> GameController {
        GameController::new(
            self.client.clone(),
            Arc::clone(&self.api) as Arc<dyn GameApi>,
            Arc::new(self.nav_tx.clone()),
            local_user,
            &self.config,
        )
    }

    async fn wait_subscribed(&self, topic: &Topic) {
        while self.broker.subscriber_count(topic) == 0 {
            tokio::task::yield_now().await;
        }
    }

    async fn mount_game(&self, game: &str, local_user: &str) -> GameHandle {
        let id = GameId::from(game);
        let handle = self.game(local_user).mount(id.clone(), None);
        let topics = GameTopics::for_game(&id);
        for topic in topics.all() {
            self.wait_subscribed(topic).await;
        }
        handle
    }
}

fn in_progress(game: &str, dice: u8) -> serde_json::Value {
    json!({
        "id": game,
        "gameStatusEnum": "IN_PROGRESS",
        "firstUser": {"username": "bob"},
        "secondUser": {"username": "alice"},
        "firstUserPoints": 0,
        "secondUserPoints": 0,
        "currentQuestion": {"id": 11, "text": "Capital of France?", "points": 10},
        "currentLetter": "P",
        "currentDice": dice,
    })
}

// ─── Lobby ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn countdown_navigates_once_after_five_seconds() {
    let mut h = Harness::new("42");
    let topic = Topic::game_progress(&GameId::from("42"));
    let lobby = h.lobby().mount(GameId::from("42"));
    h.wait_subscribed(&topic).await;

    let started = Instant::now();
    let start_ms = chrono::Utc::now().timestamp_millis() + 5000;
    let event = json!({
        "game": {"id": 42, "gameStatusEnum": "IN_PROGRESS"},
        "startTimestamp": start_ms,
    });
    h.broker.publish_json(&topic, &event);

    let mut state = lobby.watch();
    let Ok(armed) = state.wait_for(|s| s.remaining_seconds.is_some()).await else {
        panic!("lobby should arm");
    };
    assert_eq!(armed.remaining_seconds, Some(5));
    drop(armed);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    h.broker.publish_json(&topic, &json!({"id": 42, "gameStatusEnum": "IN_PROGRESS"}));

    let Some(Navigation::Game { snapshot, progress }) = h.nav.recv().await else {
        panic!("expected navigation into the game");
    };
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(snapshot.id, GameId::from("42"));
    assert!(progress.is_some());
    assert_eq!(lobby.finished().await, LobbyOutcome::EnteredGame);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.nav.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn lobby_hands_progress_stream_to_game() {
    let mut h = Harness::new("42");
    let id = GameId::from("42");
    let topics = GameTopics::for_game(&id);
    let lobby = h.lobby().mount(id.clone());
    h.wait_subscribed(&topics.progress).await;
    h.broker
        .publish_json(&topics.progress, &json!({"id": 42, "gameStatusEnum": "IN_PROGRESS"}));

    let Some(Navigation::Game { snapshot, progress }) = h.nav.recv().await else {
        panic!("expected navigation into the game");
    };
    assert_eq!(lobby.finished().await, LobbyOutcome::EnteredGame);

    let mut game = h.game("bob").mount(snapshot.id.clone(), progress);
    for topic in topics.all() {
        h.wait_subscribed(topic).await;
    }
    assert_eq!(h.broker.subscribe_count(), 4);
    assert_eq!(h.broker.subscriber_count(&topics.progress), 1);

    h.broker.publish_json(&topics.progress, &in_progress("42", 2));
    let Some(view) = game.wait_for(|v| v.current_dice == Some(2)).await else {
        panic!("progress should reach the game");
    };
    assert_eq!(view.current_letter.as_deref(), Some("P"));
    assert_eq!(game.unmount().await, GameOutcome::Unmounted);
    assert_eq!(h.broker.unsubscribe_count(), 4);
}

// ─── Game ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn dice_change_plays_one_roll_keyed_to_latest() {
    let h = Harness::new("42");
    let topics = GameTopics::for_game(&GameId::from("42"));
    let mut game = h.mount_game("42", "bob").await;

    h.broker.publish_json(&topics.progress, &in_progress("42", 3));
    let Some(_) = game.wait_for(|v| v.current_dice == Some(3)).await else {
        panic!("first snapshot");
    };
    assert!(game.try_cue().is_none());

    h.broker.publish_json(&topics.dice_rolled, &in_progress("42", 5));
    assert_eq!(game.next_cue().await, Some(ViewCue::DiceRollStarted(5)));
    assert_eq!(game.view().current_dice, Some(5));
    assert_eq!(game.view().dice_roll, Some(5));
    assert!(game.try_cue().is_none());

    let started = Instant::now();
    let Some(_) = game.wait_for(|v| v.dice_roll.is_none()).await else {
        panic!("roll should end");
    };
    assert_eq!(started.elapsed(), h.config.dice_roll_duration);
    assert!(game.try_cue().is_none());
}

#[tokio::test]
async fn chat_unread_counts_remote_messages() {
    let h = Harness::new("42");
    let topics = GameTopics::for_game(&GameId::from("42"));
    let mut game = h.mount_game("42", "bob").await;

    game.close_chat();
    let Some(_) = game.wait_for(|v| !v.chat_open).await else {
        panic!("panel should close");
    };
    for sender in ["alice", "alice", "bob"] {
        h.broker.publish_json(
            &topics.chat,
            &json!({"gameId": "42", "sender": sender, "content": "hey", "timestamp": "12:00"}),
        );
    }
    let Some(view) = game.wait_for(|v| v.chat_log.len() == 3).await else {
        panic!("three messages");
    };
    assert_eq!(view.unread_count, 2);
    for _ in 0..2 {
        assert_eq!(
            game.next_cue().await,
            Some(ViewCue::ChatNotification {
                sender: "alice".into()
            })
        );
    }

    game.open_chat();
    let Some(view) = game.wait_for(|v| v.chat_open).await else {
        panic!("panel should open");
    };
    assert_eq!(view.unread_count, 0);
}

#[tokio::test]
async fn undrained_cues_are_bounded() {
    let mut h = Harness::new("42");
    h.config.handler_queue_capacity = 2;
    let topics = GameTopics::for_game(&GameId::from("42"));
    let mut game = h.mount_game("42", "bob").await;

    game.close_chat();
    let Some(_) = game.wait_for(|v| !v.chat_open).await else {
        panic!("panel should close");
    };
    for _ in 0..5 {
        h.broker.publish_json(
            &topics.chat,
            &json!({"gameId": "42", "sender": "alice", "content": "hey", "timestamp": "12:00"}),
        );
    }
    let Some(view) = game.wait_for(|v| v.chat_log.len() == 5).await else {
        panic!("five messages");
    };
    assert_eq!(view.unread_count, 5);

    assert!(game.try_cue().is_some());
    assert!(game.try_cue().is_some());
    assert!(game.try_cue().is_none());
}

#[tokio::test]
async fn chat_send_publishes_and_ignores_blank() {
    let h = Harness::new("42");
    let id = GameId::from("42");
    h.broker.route_outbound(Topic::chat_send(&id), Topic::chat(&id));
    let mut game = h.mount_game("42", "bob").await;

    game.send_chat("   ");
    game.send_chat("good luck");
    let Some(view) = game.wait_for(|v| !v.chat_log.is_empty()).await else {
        panic!("echo should arrive");
    };
    assert_eq!(view.chat_log.len(), 1);
    assert_eq!(view.unread_count, 0);

    let outbound = h.broker.outbound();
    assert_eq!(outbound.len(), 1);
    let Some((destination, body)) = outbound.first() else {
        panic!("one frame");
    };
    assert_eq!(destination.as_str(), "/app/chat/42");
    let Ok(sent) = serde_json::from_str::<serde_json::Value>(body) else {
        panic!("json body");
    };
    assert_eq!(sent["sender"], "bob");
    assert_eq!(sent["content"], "good luck");
    assert_eq!(sent["gameId"], "42");
}

#[tokio::test(start_paused = true)]
async fn answers_validate_then_roll_from_next_snapshot() {
    let h = Harness::new("42");
    let id = GameId::from("42");
    let topics = GameTopics::for_game(&id);
    h.api.expect_answer(&id, "Paris");
    let Ok(current) = serde_json::from_value::<GameSnapshot>(in_progress("42", 4)) else {
        panic!("snapshot json");
    };
    h.api.put_game(current);
    let mut game = h.mount_game("42", "bob").await;
    h.broker.publish_json(&topics.progress, &in_progress("42", 4));
    let Some(_) = game.wait_for(|v| v.current_dice == Some(4)).await else {
        panic!("snapshot");
    };

    game.submit_answer("  ");
    let Some(_) = game.wait_for(|v| v.error.as_deref() == Some(EMPTY_ANSWER)).await else {
        panic!("blank answer error");
    };
    game.submit_answer("Lyon");
    let Some(_) = game.wait_for(|v| v.error.as_deref() == Some(WRONG_ANSWER)).await else {
        panic!("wrong answer error");
    };
    game.submit_answer("paris");
    let Some(_) = game.wait_for(|v| v.error.is_none()).await else {
        panic!("accepted answer clears error");
    };
    assert!(game.try_cue().is_none());

    h.broker.publish_json(&topics.dice_rolled, &in_progress("42", 4));
    assert_eq!(game.next_cue().await, Some(ViewCue::DiceRollStarted(4)));
    let submissions = h.api.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions.last().and_then(|s| s.question_id), Some(11));
}

#[tokio::test]
async fn finished_game_ignores_later_snapshots() {
    let h = Harness::new("42");
    let topics = GameTopics::for_game(&GameId::from("42"));
    let mut game = h.mount_game("42", "bob").await;

    h.broker.publish_json(
        &topics.progress,
        &json!({"id": "42", "gameStatusEnum": "FINISHED", "winner": {"username": "alice"}}),
    );
    assert_eq!(
        game.next_cue().await,
        Some(ViewCue::GameFinished {
            winner: Some("alice".into())
        })
    );
    h.broker.publish_json(&topics.dice_rolled, &in_progress("42", 6));
    h.broker.publish_json(
        &topics.chat,
        &json!({"sender": "alice", "content": "gg"}),
    );
    let Some(view) = game.wait_for(|v| !v.chat_log.is_empty()).await else {
        panic!("chat continues after finish");
    };
    assert_eq!(view.status, GameStatus::Finished);
    assert_eq!(view.current_dice, None);
}

#[tokio::test]
async fn disconnect_notice_raises_modal_until_dismissed() {
    let mut h = Harness::new("G42");
    let id = GameId::from("G42");
    let topics = GameTopics::for_game(&id);
    let mut game = h.mount_game("G42", "bob").await;

    h.broker.publish_json(
        &topics.disconnect,
        &json!({"type": "PLAYER_DISCONNECTED", "disconnectedPlayer": "alice"}),
    );
    let Some(ViewCue::DisconnectAlert(modal)) = game.next_cue().await else {
        panic!("disconnect cue expected");
    };
    assert_eq!(modal.participant, "alice");
    assert_eq!(modal.message, "alice has disconnected from game G42!");
    assert!(game.view().is_alerting());

    game.dismiss_disconnect(DismissAction::Home);
    assert_eq!(game.finished().await, GameOutcome::LeftHome);
    let Some(nav) = h.nav.recv().await else {
        panic!("expected navigation home");
    };
    assert!(nav.is_home());
    for topic in topics.all() {
        assert_eq!(h.broker.subscriber_count(topic), 0);
    }
}

#[tokio::test]
async fn dismiss_stay_returns_to_normal_view() {
    let h = Harness::new("G42");
    let topics = GameTopics::for_game(&GameId::from("G42"));
    let mut game = h.mount_game("G42", "bob").await;

    h.broker.publish_json(&topics.disconnect, &json!({"type": "PLAYER_DISCONNECTED"}));
    let Some(view) = game.wait_for(|v| v.is_alerting()).await else {
        panic!("modal");
    };
    let ViewMode::DisconnectAlert(modal) = view.mode else {
        panic!("modal mode");
    };
    assert_eq!(modal.message, "Your opponent has disconnected from game G42!");

    game.dismiss_disconnect(DismissAction::Stay);
    let Some(_) = game.wait_for(|v| !v.is_alerting()).await else {
        panic!("modal should close");
    };
    assert_eq!(game.unmount().await, GameOutcome::Unmounted);
}

#[tokio::test]
async fn game_setup_failure_sets_error() {
    let h = Harness::new("42");
    let id = GameId::from("42");
    h.broker.deny_topic(Topic::dice_rolled(&id), "forbidden");
    let mut game = h.game("bob").mount(id.clone(), None);

    let Some(view) = game.wait_for(|v| v.error.is_some()).await else {
        panic!("error line expected");
    };
    assert_eq!(view.error.as_deref(), Some("Failed to setup game. Please try again."));
    let GameOutcome::SetupFailed(err) = game.finished().await else {
        panic!("setup should fail");
    };
    assert_eq!(err.error_code(), 3001);
    assert!(h.client.registry.is_empty().await);
}
