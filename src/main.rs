//! trivia-realtime demo entry point.
//!
//! Plays one scripted match over the in-process broker: lobby countdown,
//! hand-off into the game, snapshots with a dice roll, chat, and a
//! disconnect notice that sends the player home.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use trivia_realtime::client::RealtimeClient;
use trivia_realtime::config::ClientConfig;
use trivia_realtime::domain::{GameId, GameSnapshot, GameTopics, Player, Topic};
use trivia_realtime::game::{DismissAction, GameApi, GameController, MemoryGameApi, ViewCue};
use trivia_realtime::lobby::LobbyController;
use trivia_realtime::navigation::{Navigation, Navigator};
use trivia_realtime::session::{CredentialStore, MemoryBroker};

const LOCAL_USER: &str = "bob";
const OPPONENT: &str = "alice";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ClientConfig::from_env()?;
    tracing::info!(endpoint = %config.endpoint, "starting trivia-realtime demo");

    // Server side stand-ins
    let broker = MemoryBroker::new();
    let api = Arc::new(MemoryGameApi::new());
    let game = GameId::from("1");
    let topics = GameTopics::for_game(&game);
    let mut waiting = GameSnapshot::new(game.clone());
    waiting.first_user = Some(Player {
        username: LOCAL_USER.into(),
    });
    api.put_game(waiting);
    api.expect_answer(&game, "Paris");
    broker.route_outbound(Topic::chat_send(&game), topics.chat.clone());

    // Client side
    let client = RealtimeClient::with_config(
        Arc::new(broker.transport_at(config.endpoint.as_str())),
        Arc::new(CredentialStore::with_token("demo-token")),
        &config,
    );
    let (nav_tx, mut nav_rx) = mpsc::unbounded_channel::<Navigation>();
    let navigator: Arc<dyn Navigator> = Arc::new(nav_tx);
    let api: Arc<dyn GameApi> = api;

    // Lobby
    let lobby = LobbyController::new(
        client.clone(),
        Arc::clone(&api),
        Arc::clone(&navigator),
        &config,
    )
    .mount(game.clone());
    wait_for_subscriber(&broker, &topics.progress).await;
    let start_ms = chrono::Utc::now().timestamp_millis()
        + i64::from(config.countdown_fallback_secs) * 1000;
    broker.publish_json(
        &topics.progress,
        &json!({
            "game": {
                "id": game.as_str(),
                "gameStatusEnum": "IN_PROGRESS",
                "firstUser": {"username": LOCAL_USER},
                "secondUser": {"username": OPPONENT},
            },
            "startTimestamp": start_ms,
        }),
    );

    let Some(Navigation::Game { snapshot, progress }) = nav_rx.recv().await else {
        anyhow::bail!("lobby ended without entering the game");
    };
    tracing::info!(outcome = ?lobby.finished().await, "lobby closed");

    // Game
    let mut view = GameController::new(client.clone(), api, navigator, LOCAL_USER, &config)
        .mount(snapshot.id.clone(), progress);
    for topic in topics.all() {
        wait_for_subscriber(&broker, topic).await;
    }

    let round = |dice: u8| {
        json!({
            "id": game.as_str(),
            "gameStatusEnum": "IN_PROGRESS",
            "firstUser": {"username": LOCAL_USER},
            "secondUser": {"username": OPPONENT},
            "firstUserPoints": 0,
            "secondUserPoints": 10,
            "currentQuestion": {"id": 1, "text": "Capital of France?", "points": 10},
            "currentLetter": "P",
            "currentDice": dice,
        })
    };
    broker.publish_json(&topics.progress, &round(3));
    view.submit_answer("Paris");
    tokio::time::sleep(Duration::from_millis(50)).await;
    broker.publish_json(&topics.dice_rolled, &round(5));

    view.close_chat();
    tokio::time::sleep(Duration::from_millis(50)).await;
    broker.publish_json(
        &topics.chat,
        &json!({"gameId": game.as_str(), "sender": OPPONENT, "content": "good luck!", "timestamp": "12:00"}),
    );
    view.send_chat("you too");
    broker.publish_json(
        &topics.disconnect,
        &json!({"type": "PLAYER_DISCONNECTED", "disconnectedPlayer": OPPONENT}),
    );

    while let Some(cue) = view.next_cue().await {
        tracing::info!(?cue, "cue");
        if let ViewCue::DisconnectAlert(modal) = cue {
            tracing::info!(message = %modal.message, "modal shown");
            break;
        }
    }
    let state = view.view();
    tracing::info!(
        dice = ?state.current_dice,
        unread = state.unread_count,
        chat = state.chat_log.len(),
        "view before leaving"
    );

    view.dismiss_disconnect(DismissAction::Home);
    tracing::info!(outcome = ?view.finished().await, "game closed");
    if let Some(nav) = nav_rx.recv().await {
        tracing::info!(home = nav.is_home(), "navigated");
    }

    client.disconnect().await;
    tracing::info!(stats = ?client.router_stats(), "demo finished");
    Ok(())
}

async fn wait_for_subscriber(broker: &MemoryBroker, topic: &Topic) {
    while broker.subscriber_count(topic) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
