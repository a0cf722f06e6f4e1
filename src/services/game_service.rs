use std::sync::Arc;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    auth::Identity,
    dto::{
        game::{CreateMatchRequest, MatchListItem, MatchSummary},
        ws::ServerMessage,
    },
    error::ServiceError,
    relay::{RelayEnvelope, RelayPayload},
    services::match_service::normalize_code,
    state::{
        MatchHandle, SharedState,
        game::{Board, Match},
        registry::{CodeConflict, generate_code},
    },
};

/// Join codes drawn before giving up on a collision streak.
const MAX_CODE_ATTEMPTS: usize = 5;

/// Create a match with a fresh board; the creator enters the roster.
pub async fn create_match(
    state: &SharedState,
    identity: &Identity,
    request: CreateMatchRequest,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_match_store().await?;
    let config = state.config();
    let capacity = request.capacity.unwrap_or(config.match_capacity());

    let handle = {
        let mut rng = rand::rng();
        let starting_team = config.starting_team().pick(&mut rng);
        let board = Board::generate(config.words(), starting_team, &mut rng)
            .map_err(|err| ServiceError::InvalidState(err.to_string()))?;
        register(state, identity, board, capacity, &mut rng)?
    };
    let code = handle.code().to_owned();

    let entity = handle.lock().await.entity();
    let saved = match state.transition_timeout() {
        Some(limit) => match timeout(limit, store.save_match(entity)).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(ServiceError::Timeout),
        },
        None => store.save_match(entity).await.map_err(ServiceError::from),
    };
    if let Err(err) = saved {
        warn!(code = %code, error = %err, "failed to persist new match; dropping it");
        state.registry().remove(&code);
        return Err(err);
    }

    let mut game = handle.lock().await;
    let sequence = game.next_sequence();
    state.relay().publish(RelayEnvelope::new(
        code.clone(),
        sequence,
        state.instance_id(),
        RelayPayload::MatchCreated {
            starting_team: game.board().starting_team(),
            total_players: game.player_count(),
        },
    ));
    info!(code = %code, created_by = %identity.user_id, capacity, "match created");

    Ok(MatchSummary::for_viewer(&game, &identity.user_id))
}

/// Put a new match under a fresh code, retrying on collisions.
fn register<R: rand::Rng + ?Sized>(
    state: &SharedState,
    identity: &Identity,
    board: Board,
    capacity: usize,
    rng: &mut R,
) -> Result<Arc<MatchHandle>, ServiceError> {
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = generate_code(rng);
        let mut game = Match::new(code.clone(), board.clone(), capacity);
        game.join(&identity.user_id, &identity.name)?;
        match state.registry().put(&code, game) {
            Ok(handle) => return Ok(handle),
            Err(CodeConflict(code)) => {
                warn!(code = %code, attempt, "join code collision; drawing another");
            }
        }
    }
    Err(ServiceError::InvalidState(
        "could not allocate a unique match code".into(),
    ))
}

/// Enter the roster of a waiting match without a live connection.
pub async fn join_match(
    state: &SharedState,
    identity: &Identity,
    code: &str,
) -> Result<MatchSummary, ServiceError> {
    let code = normalize_code(code);
    let handle = state
        .registry()
        .get(&code)
        .ok_or_else(|| ServiceError::NotFound(format!("match `{code}` not found")))?;
    let mut game = handle.lock().await;

    let outcome = game.join(&identity.user_id, &identity.name)?;
    if outcome.newly_joined {
        state.groups().broadcast(
            &code,
            &ServerMessage::PlayerJoined {
                caller_id: identity.user_id.clone(),
                player_name: identity.name.clone(),
                total_players: outcome.total_players,
            },
        );
    }

    Ok(MatchSummary::for_viewer(&game, &identity.user_id))
}

/// Summarize a match for the caller: the live state when this instance owns
/// it, the stored record otherwise.
pub async fn get_match(
    state: &SharedState,
    identity: &Identity,
    code: &str,
) -> Result<MatchSummary, ServiceError> {
    let code = normalize_code(code);
    if let Some(handle) = state.registry().get(&code) {
        let game = handle.lock().await;
        return Ok(MatchSummary::for_viewer(&game, &identity.user_id));
    }

    let store = state.require_match_store().await?;
    match store.find_match(code.clone()).await? {
        Some(entity) => Ok(MatchSummary::from_entity(entity, &identity.user_id)),
        None => Err(ServiceError::NotFound(format!("match `{code}` not found"))),
    }
}

/// Matches live on this instance, ordered by code.
pub async fn list_matches(state: &SharedState) -> Vec<MatchListItem> {
    let mut items = Vec::with_capacity(state.registry().count());
    for handle in state.registry().all() {
        let game = handle.lock().await;
        items.push(MatchListItem {
            code: game.code().to_owned(),
            status: game.status(),
            player_count: game.player_count(),
            capacity: game.capacity(),
        });
    }
    items.sort_by(|a, b| a.code.cmp(&b.code));
    items
}
