use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of room sessions currently open.
    pub open_rooms: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(open_rooms: usize) -> Self {
        Self {
            status: "ok".to_string(),
            open_rooms,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(open_rooms: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            open_rooms,
        }
    }
}
