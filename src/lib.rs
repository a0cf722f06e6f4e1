//! Library crate for mindlink-back, exposing modules for binaries and integration tests.

/// Bearer token minting, verification and extraction.
pub mod auth;
/// Application configuration loading.
pub mod config;
/// Data access layer for match history.
pub mod dao;
/// Data transfer objects for REST and WebSocket payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// Cross-instance event relay.
pub mod relay;
/// HTTP route definitions.
pub mod routes;
/// Business logic services.
pub mod services;
/// Live match state and connection groups.
pub mod state;
