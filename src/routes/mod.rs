use axum::Router;

use crate::state::SharedState;

/// OpenAPI JSON and Swagger UI.
pub mod docs;
/// Health check route.
pub mod health;
/// REST match routes.
pub mod matches;
/// WebSocket upgrade route.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(websocket::router())
        .merge(matches::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
