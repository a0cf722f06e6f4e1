use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Check the installed store and report the degraded flag.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_match_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let status = if state.is_degraded().await {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };
    HealthResponse {
        status,
        live_matches: state.registry().count(),
    }
}
