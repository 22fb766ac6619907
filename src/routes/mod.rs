use axum::{Router, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{error::AppError, state::SharedState};

/// Swagger UI and OpenAPI document routes.
pub mod docs;
/// Health check routes.
pub mod health;
/// Room lifecycle and action routes.
pub mod room;
/// Room SSE stream routes.
pub mod sse;

/// Header carrying the authenticated caller's user id.
///
/// Authentication itself is an external collaborator; by the time a
/// request reaches this service the edge has already verified the session
/// and stamped the id. A missing or malformed header is the "not signed
/// in" case and blocks the action.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller identity extracted from [`USER_ID_HEADER`].
pub struct CurrentUser(pub Uuid);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("sign in required".into()))?;

        let user_id = Uuid::parse_str(value)
            .map_err(|_| AppError::Unauthorized("invalid user id header".into()))?;
        Ok(CurrentUser(user_id))
    }
}

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router().merge(sse::router()).merge(room::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
