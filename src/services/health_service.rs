use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the current health payload while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.backend().await {
        Some(backend) => {
            if let Err(err) = backend.health_check().await {
                warn!(error = %err, "backend health check failed");
            }
        }
        None => warn!("backend unavailable (degraded mode)"),
    }

    let open_rooms = state.rooms().len();
    if state.is_degraded() {
        HealthResponse::degraded(open_rooms)
    } else {
        HealthResponse::ok(open_rooms)
    }
}
