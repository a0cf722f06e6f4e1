//! Real-time match commands. Every command runs validate, mutate, win-check
//! and deliver under the match guard, so deliveries of one match leave in
//! mutation order.

use std::{sync::Arc, time::SystemTime};

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    auth::Identity,
    dao::models::MatchEntity,
    dto::{
        game::MatchSummary,
        ws::{ClientCommand, ServerMessage},
    },
    error::ServiceError,
    relay::{RelayEnvelope, RelayPayload},
    services::websocket_service::send_message_to_websocket,
    state::{
        AppState, ClientConnection, MatchHandle,
        game::{ConnectionId, Match, TeamColor},
        state_machine::{LifecycleEvent, MatchStatus},
        transitions::run_transition,
        visibility::{Viewer, project_board, project_card},
    },
};

/// One authenticated real-time connection and the match it is attached to.
#[derive(Debug)]
pub struct ConnectionSession {
    id: ConnectionId,
    identity: Identity,
    tx: mpsc::UnboundedSender<Message>,
    attached: Option<String>,
}

impl ConnectionSession {
    /// Wrap the writer queue of a freshly authenticated connection.
    pub fn new(identity: Identity, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            identity,
            tx,
            attached: None,
        }
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Owner of the connection.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Join code of the match the connection is attached to.
    pub fn attached(&self) -> Option<&str> {
        self.attached.as_deref()
    }

    /// Send a message to this connection only. Returns `false` once the writer is gone.
    pub fn reply(&self, message: &ServerMessage) -> bool {
        send_message_to_websocket(&self.tx, message, "caller reply")
    }

    fn connection(&self) -> ClientConnection {
        ClientConnection {
            id: self.id,
            user_id: self.identity.user_id.clone(),
            tx: self.tx.clone(),
        }
    }
}

/// Route a decoded command to its handler.
pub async fn dispatch(
    state: &AppState,
    session: &mut ConnectionSession,
    command: ClientCommand,
) -> Result<(), ServiceError> {
    match command {
        ClientCommand::JoinGame { code } => join_game(state, session, &code).await,
        ClientCommand::UpdateTeam {
            code,
            team,
            is_hint_giver,
        } => update_team(state, session, &code, team, is_hint_giver).await,
        ClientCommand::StartGame { code } => start_game(state, session, &code).await,
        ClientCommand::ExecuteGuess { code, positions } => {
            execute_guess(state, session, &code, &positions).await
        }
        ClientCommand::GiveHint { code, word, count } => {
            give_hint(state, session, &code, &word, count).await
        }
        ClientCommand::EndGame { code } => end_game(state, session, &code).await,
    }
}

/// Attach the connection to a match and enter its roster.
///
/// A player already on the roster may re-attach in any status and receives
/// their current board view when the match is no longer waiting. A code
/// hosted by another instance is followed read-only.
pub async fn join_game(
    state: &AppState,
    session: &mut ConnectionSession,
    code: &str,
) -> Result<(), ServiceError> {
    let code = normalize_code(code);
    let Some(handle) = state.registry().get(&code) else {
        return follow_remote(state, session, &code).await;
    };
    let previous = session.attached.clone().filter(|attached| *attached != code);

    {
        let mut game = handle.lock().await;
        // `end_game` may have dropped the match while we waited for the guard.
        let still_live = state
            .registry()
            .get(&code)
            .is_some_and(|live| Arc::ptr_eq(&live, &handle));
        if !still_live {
            return Err(not_found(&code));
        }

        let outcome = game.join(&session.identity.user_id, &session.identity.name)?;
        game.attach_connection(&session.identity.user_id, session.id);
        state.groups().attach(&code, session.connection());
        session.attached = Some(code.clone());

        info!(
            code = %code,
            user_id = %session.identity.user_id,
            newly_joined = outcome.newly_joined,
            total_players = outcome.total_players,
            "player attached to match"
        );

        state.groups().broadcast(
            &code,
            &ServerMessage::PlayerJoined {
                caller_id: session.identity.user_id.clone(),
                player_name: session.identity.name.clone(),
                total_players: outcome.total_players,
            },
        );

        if game.status() != MatchStatus::Waiting {
            let viewer = Viewer::of(game.player(&session.identity.user_id));
            session.reply(&ServerMessage::ReceiveCards {
                cards: project_board(game.board(), viewer),
            });
        }
    }

    if let Some(previous) = previous {
        detach_from(state, session, &previous).await;
    }

    Ok(())
}

/// Follow a match live on another instance.
///
/// The code must exist in storage and not be over. The connection joins the
/// local group only, so it receives the events relayed from the owning
/// instance; the roster and every command stay with the owner.
async fn follow_remote(
    state: &AppState,
    session: &mut ConnectionSession,
    code: &str,
) -> Result<(), ServiceError> {
    let store = state.require_match_store().await?;
    let entity = store
        .find_match(code.to_owned())
        .await?
        .ok_or_else(|| not_found(code))?;
    if entity.status == MatchStatus::Over {
        return Err(ServiceError::InvalidState(format!("match `{code}` is over")));
    }

    let previous = session.attached.clone().filter(|attached| attached != code);
    state.groups().attach(code, session.connection());
    session.attached = Some(code.to_owned());
    info!(
        code = %code,
        user_id = %session.identity.user_id,
        "following match hosted on another instance"
    );

    if entity.status != MatchStatus::Waiting {
        let summary = MatchSummary::from_entity(entity, &session.identity.user_id);
        session.reply(&ServerMessage::ReceiveCards {
            cards: summary.cards,
        });
    }

    if let Some(previous) = previous {
        detach_from(state, session, &previous).await;
    }
    Ok(())
}

/// Pick a team and role while the match is waiting.
pub async fn update_team(
    state: &AppState,
    session: &ConnectionSession,
    code: &str,
    team: TeamColor,
    is_hint_giver: bool,
) -> Result<(), ServiceError> {
    let code = normalize_code(code);
    let handle = lookup(state, &code)?;
    let mut game = handle.lock().await;

    let player = game.assign_team(&session.identity.user_id, team, is_hint_giver)?;
    let message = ServerMessage::PlayerTeamChanged {
        player_id: player.user_id.clone(),
        player_name: player.name.clone(),
        new_team: team,
        is_hint_giver: player.is_hint_giver,
    };
    debug!(code = %code, user_id = %session.identity.user_id, team = ?team, is_hint_giver, "team updated");
    state.groups().broadcast(&code, &message);
    Ok(())
}

/// Start the match: persist, commit, then push the start and every member's board view.
pub async fn start_game(
    state: &AppState,
    session: &ConnectionSession,
    code: &str,
) -> Result<(), ServiceError> {
    let code = normalize_code(code);
    let handle = lookup(state, &code)?;
    let mut game = handle.lock().await;

    game.ensure_member(&session.identity.user_id)?;
    let store = state.require_match_store().await?;
    run_transition(
        &mut game,
        LifecycleEvent::Start,
        state.transition_timeout(),
        |entity| async move { store.save_match(entity).await.map_err(ServiceError::from) },
    )
    .await?;

    let first_team = game.board().starting_team();
    info!(code = %code, first_team = ?first_team, started_by = %session.identity.user_id, "match started");

    state
        .groups()
        .broadcast(&code, &ServerMessage::GameStarted { first_team });
    push_board_views(state, &game);
    publish(state, &mut game, RelayPayload::MatchStarted { first_team });
    Ok(())
}

/// Apply a guess batch, broadcast the revealed cards and refresh every board view.
pub async fn execute_guess(
    state: &AppState,
    session: &ConnectionSession,
    code: &str,
    positions: &[u8],
) -> Result<(), ServiceError> {
    let code = normalize_code(code);
    let handle = lookup(state, &code)?;
    let mut game = handle.lock().await;

    let outcome = game.guess(&session.identity.user_id, positions, SystemTime::now())?;
    let revealed_cards: Vec<_> = outcome
        .revealed
        .iter()
        .map(|card| project_card(card, Viewer::Operative))
        .collect();
    let is_game_over = outcome.winner.is_some();

    debug!(
        code = %code,
        user_id = %session.identity.user_id,
        revealed = revealed_cards.len(),
        turn_passed = outcome.turn_passed,
        "guess applied"
    );

    state.groups().broadcast(
        &code,
        &ServerMessage::GuessExecuted {
            revealed_cards: revealed_cards.clone(),
            is_game_over,
            winner: outcome.winner,
            current_team: outcome.current_team,
        },
    );
    push_board_views(state, &game);
    publish(
        state,
        &mut game,
        RelayPayload::GuessExecuted {
            revealed_cards,
            is_game_over,
            winner: outcome.winner,
            current_team: outcome.current_team,
        },
    );

    if let Some(winner) = outcome.winner {
        info!(code = %code, winner = ?winner, "match won");
        persist_in_background(state, game.entity()).await;
    }

    Ok(())
}

/// Record a hint and broadcast it to the group.
pub async fn give_hint(
    state: &AppState,
    session: &ConnectionSession,
    code: &str,
    word: &str,
    count: u8,
) -> Result<(), ServiceError> {
    let code = normalize_code(code);
    let handle = lookup(state, &code)?;
    let mut game = handle.lock().await;

    let hint = game.give_hint(&session.identity.user_id, word, count, SystemTime::now())?;
    debug!(code = %code, team = ?hint.team, count = hint.count, "hint given");

    state.groups().broadcast(
        &code,
        &ServerMessage::HintGiven {
            word: hint.word.clone(),
            count: hint.count,
            team: hint.team,
        },
    );
    publish(
        state,
        &mut game,
        RelayPayload::HintGiven {
            word: hint.word,
            count: hint.count,
            team: hint.team,
        },
    );
    Ok(())
}

/// Force-terminate the match, persist it and drop it from the registry.
pub async fn end_game(
    state: &AppState,
    session: &mut ConnectionSession,
    code: &str,
) -> Result<(), ServiceError> {
    let code = normalize_code(code);
    let handle = lookup(state, &code)?;

    {
        let mut game = handle.lock().await;
        game.ensure_member(&session.identity.user_id)?;
        let store = state.require_match_store().await?;
        run_transition(
            &mut game,
            LifecycleEvent::End,
            state.transition_timeout(),
            |entity| async move { store.save_match(entity).await.map_err(ServiceError::from) },
        )
        .await?;

        let winner = game.winner();
        info!(code = %code, winner = ?winner, ended_by = %session.identity.user_id, "match ended");

        state
            .groups()
            .broadcast(&code, &ServerMessage::GameEnded { winner });
        publish(state, &mut game, RelayPayload::MatchEnded { winner });
        game.detach_all();
        state.registry().remove(&code);
        state.groups().drop_group(&code);
    }

    if session.attached.as_deref() == Some(code.as_str()) {
        session.attached = None;
    }
    Ok(())
}

/// Detach the connection from its match, if any. Called when the socket closes.
pub async fn leave(state: &AppState, session: &mut ConnectionSession) {
    if let Some(code) = session.attached.clone() {
        detach_from(state, session, &code).await;
    }
}

async fn detach_from(state: &AppState, session: &mut ConnectionSession, code: &str) {
    state.groups().detach(code, session.id);
    if let Some(handle) = state.registry().get(code) {
        let mut game = handle.lock().await;
        game.detach_connection(&session.identity.user_id, session.id);
    }
    if session.attached.as_deref() == Some(code) {
        session.attached = None;
    }
    debug!(code = %code, user_id = %session.identity.user_id, "connection detached");
}

/// Join codes are matched case-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn lookup(state: &AppState, code: &str) -> Result<Arc<MatchHandle>, ServiceError> {
    state.registry().get(code).ok_or_else(|| not_found(code))
}

fn not_found(code: &str) -> ServiceError {
    ServiceError::NotFound(format!("match `{code}` not found"))
}

/// Send every attached connection its own projection of the board.
fn push_board_views(state: &AppState, game: &Match) {
    state.groups().send_each(game.code(), |member| {
        let viewer = Viewer::of(game.player(&member.user_id));
        Some(ServerMessage::ReceiveCards {
            cards: project_board(game.board(), viewer),
        })
    });
}

/// Queue a relay event stamped with the next sequence of `game`.
fn publish(state: &AppState, game: &mut Match, payload: RelayPayload) {
    let sequence = game.next_sequence();
    state.relay().publish(RelayEnvelope::new(
        game.code(),
        sequence,
        state.instance_id(),
        payload,
    ));
}

async fn persist_in_background(state: &AppState, entity: MatchEntity) {
    let Some(store) = state.match_store().await else {
        warn!(code = %entity.code, "storage unavailable; finished match not persisted");
        return;
    };
    tokio::spawn(async move {
        let code = entity.code.clone();
        if let Err(err) = store.save_match(entity).await {
            warn!(code = %code, error = %err, "failed to persist finished match");
        }
    });
}
