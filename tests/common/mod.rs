#![allow(dead_code)]

use std::sync::Arc;

use axum::extract::ws::Message;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use mindlink_back::{
    auth::{Identity, SecurityConfig},
    config::AppConfig,
    dao::match_store::memory::InMemoryMatchStore,
    dto::ws::ServerMessage,
    relay::RelayPublisher,
    services::{match_service::ConnectionSession, websocket_service},
    state::{
        AppState, MatchHandle, SharedState,
        game::{BOARD_SIZE, Board, Card, CardColor, Match, TeamColor},
    },
};

pub const TEST_SECRET: &str = "integration-test-secret";

/// Board with reds at 0..9, blues at 9..17, neutrals at 17..24 and the trap at 24.
pub fn fixed_board() -> Board {
    let cards = (0..BOARD_SIZE as u8)
        .map(|position| {
            let color = match position {
                0..=8 => CardColor::Red,
                9..=16 => CardColor::Blue,
                17..=23 => CardColor::Neutral,
                _ => CardColor::Trap,
            };
            Card::new(position, format!("card{position}"), color)
        })
        .collect();
    Board::from_cards(cards, TeamColor::Red)
}

/// State with an in-memory store installed and the given relay.
pub async fn state_with_relay(relay: RelayPublisher) -> (SharedState, Arc<InMemoryMatchStore>) {
    let store = Arc::new(InMemoryMatchStore::new());
    let state = state_sharing(relay, store.clone()).await;
    (state, store)
}

/// Another instance backed by an existing store, as instances sharing one database.
pub async fn state_sharing(relay: RelayPublisher, store: Arc<InMemoryMatchStore>) -> SharedState {
    let state = AppState::new(
        AppConfig::default(),
        SecurityConfig::from_secret(TEST_SECRET),
        Uuid::new_v4(),
        relay,
    );
    state.install_match_store(store).await;
    state
}

/// State with an in-memory store and no broker.
pub async fn test_state() -> (SharedState, Arc<InMemoryMatchStore>) {
    state_with_relay(RelayPublisher::disabled()).await
}

/// Register an empty waiting match on the fixed board.
pub fn seed_match(state: &SharedState, code: &str) -> Arc<MatchHandle> {
    match state
        .registry()
        .put(code, Match::new(code, fixed_board(), 8))
    {
        Ok(handle) => handle,
        Err(conflict) => panic!("code {} already registered", conflict.0),
    }
}

/// A connection driven directly through the text frame handler.
pub struct TestClient {
    pub session: ConnectionSession,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl TestClient {
    pub fn new(user_id: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let identity = Identity {
            user_id: user_id.to_owned(),
            name: user_id.to_uppercase(),
        };
        Self {
            session: ConnectionSession::new(identity, tx),
            rx,
        }
    }

    pub async fn send(&mut self, state: &SharedState, command: Value) {
        let alive =
            websocket_service::handle_text(state, &mut self.session, &command.to_string()).await;
        assert!(alive, "writer closed unexpectedly");
    }

    /// Everything queued for this connection so far.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Message::Text(text) = message {
                messages.push(
                    serde_json::from_str(text.as_str()).expect("server message should decode"),
                );
            }
        }
        messages
    }
}

pub fn error_messages(messages: &[ServerMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|message| match message {
            ServerMessage::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
