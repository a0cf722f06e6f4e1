/// OpenAPI documentation generation.
pub mod documentation;
/// Match creation and lookup for the REST surface.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Real-time match commands.
pub mod match_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
