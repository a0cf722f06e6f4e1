use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Whether match storage is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// A store is installed and answering.
    Ok,
    /// No usable store; lifecycle transitions are refused.
    Degraded,
}

/// Body of `GET /healthcheck`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Whether storage is usable.
    pub status: HealthStatus,
    /// Matches currently live on this instance.
    pub live_matches: usize,
}
