use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::room::{
        AutoJoinRequest, CommandAck, EnergyGiftRequest, ForegroundRequest, GoToRequest,
        PreviewRequest, ReadStateRequest, RoomSnapshot, SendMessageRequest,
    },
    error::AppError,
    room::controller::RoomCommand,
    routes::CurrentUser,
    services::room_service,
    state::{SharedState, run_machine::RunAction},
};

/// Routes handling room sessions: lifecycle, host controls, chat.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{event_id}/open", post(open_room))
        .route("/rooms/{event_id}", get(get_room))
        .route("/rooms/{event_id}/close", post(close_room))
        .route("/rooms/{event_id}/join", post(join_room))
        .route("/rooms/{event_id}/leave", post(leave_room))
        .route("/rooms/{event_id}/host/start", post(host_start))
        .route("/rooms/{event_id}/host/pause", post(host_pause))
        .route("/rooms/{event_id}/host/resume", post(host_resume))
        .route("/rooms/{event_id}/host/end", post(host_end))
        .route("/rooms/{event_id}/host/advance", post(host_advance))
        .route("/rooms/{event_id}/host/restart", post(host_restart))
        .route("/rooms/{event_id}/host/goto", post(host_goto))
        .route("/rooms/{event_id}/preview", post(preview_section))
        .route("/rooms/{event_id}/preview/follow", post(follow_host))
        .route("/rooms/{event_id}/foreground", post(set_foreground))
        .route("/rooms/{event_id}/messages", post(send_message))
        .route("/rooms/{event_id}/energy", post(send_energy))
        .route("/rooms/{event_id}/read", post(set_read_state))
        .route("/prefs/auto-join", post(set_auto_join))
}

fn queue(
    state: &SharedState,
    event_id: Uuid,
    user_id: Uuid,
    command: RoomCommand,
) -> Result<Json<CommandAck>, AppError> {
    room_service::dispatch(state, event_id, user_id, command)?;
    Ok(Json(CommandAck::queued()))
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/open",
    tag = "room",
    params(("event_id" = Uuid, Path, description = "Event whose room to open")),
    responses(
        (status = 200, description = "Session opened or re-attached", body = RoomSnapshot),
        (status = 404, description = "Event not found")
    )
)]
/// Create or re-attach the caller's room session and return its view.
pub async fn open_room(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let snapshot = room_service::open_room(&state, event_id, user_id).await?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    get,
    path = "/rooms/{event_id}",
    tag = "room",
    params(("event_id" = Uuid, Path, description = "Event whose room to read")),
    responses(
        (status = 200, description = "Current view model", body = RoomSnapshot),
        (status = 404, description = "No open session")
    )
)]
/// Return the latest view model of the caller's open session.
pub async fn get_room(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let snapshot = room_service::snapshot(&state, event_id, user_id)?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/close",
    tag = "room",
    params(("event_id" = Uuid, Path, description = "Event whose room to close")),
    responses((status = 200, description = "Session closed", body = CommandAck))
)]
/// Tear down the caller's session (navigation away, not a leave).
pub async fn close_room(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Json<CommandAck> {
    room_service::close_room(&state, event_id, user_id);
    Json(CommandAck::queued())
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/join",
    tag = "presence",
    params(("event_id" = Uuid, Path, description = "Event to join")),
    responses((status = 200, description = "Join queued", body = CommandAck))
)]
/// Manually join the room, setting the sticky preference.
pub async fn join_room(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::Join)
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/leave",
    tag = "presence",
    params(("event_id" = Uuid, Path, description = "Event to leave")),
    responses((status = 200, description = "Leave queued", body = CommandAck))
)]
/// Explicitly leave: delete the presence row and clear the sticky
/// preference.
pub async fn leave_room(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::Leave)
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/host/start",
    tag = "host",
    params(("event_id" = Uuid, Path, description = "Event whose session to start")),
    responses(
        (status = 200, description = "Start queued", body = CommandAck),
        (status = 401, description = "Caller is not the host")
    )
)]
/// Start the session from idle.
pub async fn host_start(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::Host(RunAction::Start))
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/host/pause",
    tag = "host",
    params(("event_id" = Uuid, Path, description = "Event whose session to pause")),
    responses(
        (status = 200, description = "Pause queued", body = CommandAck),
        (status = 401, description = "Caller is not the host")
    )
)]
/// Pause the countdown, banking the elapsed seconds.
pub async fn host_pause(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::Host(RunAction::Pause))
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/host/resume",
    tag = "host",
    params(("event_id" = Uuid, Path, description = "Event whose session to resume")),
    responses(
        (status = 200, description = "Resume queued", body = CommandAck),
        (status = 401, description = "Caller is not the host")
    )
)]
/// Resume the countdown from the banked elapsed seconds.
pub async fn host_resume(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::Host(RunAction::Resume))
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/host/end",
    tag = "host",
    params(("event_id" = Uuid, Path, description = "Event whose session to end")),
    responses(
        (status = 200, description = "End queued", body = CommandAck),
        (status = 401, description = "Caller is not the host")
    )
)]
/// Finish the session.
pub async fn host_end(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::Host(RunAction::End))
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/host/advance",
    tag = "host",
    params(("event_id" = Uuid, Path, description = "Event whose session to advance")),
    responses(
        (status = 200, description = "Advance queued", body = CommandAck),
        (status = 401, description = "Caller is not the host")
    )
)]
/// Manually advance to the next section.
pub async fn host_advance(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::Host(RunAction::Advance))
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/host/restart",
    tag = "host",
    params(("event_id" = Uuid, Path, description = "Event whose session to restart")),
    responses(
        (status = 200, description = "Restart queued", body = CommandAck),
        (status = 401, description = "Caller is not the host")
    )
)]
/// Re-enter a fresh run from the ended state.
pub async fn host_restart(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::Host(RunAction::Restart))
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/host/goto",
    tag = "host",
    params(("event_id" = Uuid, Path, description = "Event whose session to reposition")),
    request_body = GoToRequest,
    responses(
        (status = 200, description = "Jump queued", body = CommandAck),
        (status = 401, description = "Caller is not the host")
    )
)]
/// Jump the shared timer to a specific section with a fresh timer.
pub async fn host_goto(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<GoToRequest>>,
) -> Result<Json<CommandAck>, AppError> {
    queue(
        &state,
        event_id,
        user_id,
        RoomCommand::Host(RunAction::GoTo(payload.index)),
    )
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/preview",
    tag = "room",
    params(("event_id" = Uuid, Path, description = "Event whose script to preview")),
    request_body = PreviewRequest,
    responses((status = 200, description = "Preview set", body = CommandAck))
)]
/// Preview a section locally without touching the shared timer.
pub async fn preview_section(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<PreviewRequest>>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::Preview(payload.index))
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/preview/follow",
    tag = "room",
    params(("event_id" = Uuid, Path, description = "Event whose room to re-follow")),
    responses((status = 200, description = "Following the host again", body = CommandAck))
)]
/// Drop the local preview and follow the host's live section again.
pub async fn follow_host(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CommandAck>, AppError> {
    queue(&state, event_id, user_id, RoomCommand::FollowHost)
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/foreground",
    tag = "presence",
    params(("event_id" = Uuid, Path, description = "Event whose session to update")),
    request_body = ForegroundRequest,
    responses((status = 200, description = "Foreground state recorded", body = CommandAck))
)]
/// Report whether the app is foregrounded; heartbeats pause while it is
/// not.
pub async fn set_foreground(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ForegroundRequest>>,
) -> Result<Json<CommandAck>, AppError> {
    queue(
        &state,
        event_id,
        user_id,
        RoomCommand::SetForeground(payload.foreground),
    )
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/messages",
    tag = "chat",
    params(("event_id" = Uuid, Path, description = "Event to message")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message queued", body = CommandAck),
        (status = 400, description = "Empty or oversized body")
    )
)]
/// Send a chat message into the room.
pub async fn send_message(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SendMessageRequest>>,
) -> Result<Json<CommandAck>, AppError> {
    queue(
        &state,
        event_id,
        user_id,
        RoomCommand::SendMessage { body: payload.body },
    )
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/energy",
    tag = "chat",
    params(("event_id" = Uuid, Path, description = "Event to gift")),
    request_body = EnergyGiftRequest,
    responses(
        (status = 200, description = "Gift queued", body = CommandAck),
        (status = 400, description = "Amount out of range")
    )
)]
/// Send an energy gift into the room.
pub async fn send_energy(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<EnergyGiftRequest>>,
) -> Result<Json<CommandAck>, AppError> {
    queue(
        &state,
        event_id,
        user_id,
        RoomCommand::SendEnergy {
            amount: payload.amount,
        },
    )
}

#[utoipa::path(
    post,
    path = "/rooms/{event_id}/read",
    tag = "chat",
    params(("event_id" = Uuid, Path, description = "Event whose transcript is read")),
    request_body = ReadStateRequest,
    responses((status = 200, description = "Scroll position recorded", body = CommandAck))
)]
/// Report the viewer's transcript scroll position for unread accounting.
pub async fn set_read_state(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(event_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ReadStateRequest>>,
) -> Result<Json<CommandAck>, AppError> {
    queue(
        &state,
        event_id,
        user_id,
        RoomCommand::SetAtBottom(payload.at_bottom),
    )
}

#[utoipa::path(
    post,
    path = "/prefs/auto-join",
    tag = "room",
    request_body = AutoJoinRequest,
    responses((status = 200, description = "Preference recorded", body = CommandAck))
)]
/// Update the caller's global auto-join preference.
pub async fn set_auto_join(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Valid(Json(payload)): Valid<Json<AutoJoinRequest>>,
) -> Json<CommandAck> {
    room_service::set_auto_join(&state, user_id, payload.enabled);
    Json(CommandAck::queued())
}
