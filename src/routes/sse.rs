use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    routes::CurrentUser,
    services::{room_service, sse_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/rooms/{event_id}/stream",
    tag = "sse",
    params(("event_id" = Uuid, Path, description = "Event whose room to stream")),
    responses(
        (status = 200, description = "Room view-model stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "No open session")
    )
)]
/// Stream the caller's room view model as server-sent events.
pub async fn room_stream(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let view = room_service::watch_room(&state, event_id, user_id)?;
    info!(%event_id, %user_id, "new room SSE connection");
    Ok(sse_service::room_stream(view))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{event_id}/stream", get(room_stream))
}
