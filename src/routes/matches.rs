use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    auth::AuthenticatedUser,
    dto::game::{CreateMatchRequest, MatchListItem, MatchSummary},
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// Routes creating, joining and inspecting matches.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", get(list_matches).post(create_match))
        .route("/matches/{code}", get(get_match))
        .route("/matches/{code}/join", post(join_match))
}

/// Create a match; the caller becomes its first player.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    request_body = CreateMatchRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Match created", body = MatchSummary),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_match(
    State(state): State<SharedState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Valid(Json(payload)): Valid<Json<CreateMatchRequest>>,
) -> Result<Json<MatchSummary>, AppError> {
    let summary = game_service::create_match(&state, &identity, payload).await?;
    Ok(Json(summary))
}

/// Enter the roster of a waiting match.
#[utoipa::path(
    post,
    path = "/matches/{code}/join",
    tag = "matches",
    params(("code" = String, Path, description = "Join code of the match")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Joined", body = MatchSummary),
        (status = 404, description = "Unknown code"),
        (status = 409, description = "Match full or already started")
    )
)]
pub async fn join_match(
    State(state): State<SharedState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<Json<MatchSummary>, AppError> {
    let summary = game_service::join_match(&state, &identity, &code).await?;
    Ok(Json(summary))
}

/// Current state of a match, with card colors projected for the caller.
#[utoipa::path(
    get,
    path = "/matches/{code}",
    tag = "matches",
    params(("code" = String, Path, description = "Join code of the match")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Match state", body = MatchSummary),
        (status = 404, description = "Unknown code")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<Json<MatchSummary>, AppError> {
    let summary = game_service::get_match(&state, &identity, &code).await?;
    Ok(Json(summary))
}

/// Matches live on this instance.
#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    responses((status = 200, description = "Active matches", body = [MatchListItem]))
)]
pub async fn list_matches(State(state): State<SharedState>) -> Json<Vec<MatchListItem>> {
    Json(game_service::list_matches(&state).await)
}
