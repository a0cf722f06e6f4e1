use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{auth::AuthenticatedUser, services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "players",
    params(("access_token" = Option<String>, Query, description = "Bearer token when no Authorization header can be sent")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Missing or invalid token")
    )
)]
/// Upgrade an authenticated request into a player WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, identity))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
