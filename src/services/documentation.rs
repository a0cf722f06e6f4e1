use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI document for MindLink Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::matches::create_match,
        crate::routes::matches::join_match,
        crate::routes::matches::get_match,
        crate::routes::matches::list_matches,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::CreateMatchRequest,
            crate::dto::game::MatchSummary,
            crate::dto::game::MatchListItem,
            crate::dto::ws::ClientCommand,
            crate::dto::ws::ServerMessage,
            crate::state::visibility::CardView,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "matches", description = "Match creation and lookup"),
        (name = "players", description = "WebSocket command channel for players"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` JWT scheme referenced by authenticated routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
