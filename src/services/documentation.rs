use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Egregor room backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::room_stream,
        crate::routes::room::open_room,
        crate::routes::room::get_room,
        crate::routes::room::close_room,
        crate::routes::room::join_room,
        crate::routes::room::leave_room,
        crate::routes::room::host_start,
        crate::routes::room::host_pause,
        crate::routes::room::host_resume,
        crate::routes::room::host_end,
        crate::routes::room::host_advance,
        crate::routes::room::host_restart,
        crate::routes::room::host_goto,
        crate::routes::room::preview_section,
        crate::routes::room::follow_host,
        crate::routes::room::set_foreground,
        crate::routes::room::send_message,
        crate::routes::room::send_energy,
        crate::routes::room::set_read_state,
        crate::routes::room::set_auto_join,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::RoomSnapshot,
            crate::dto::room::RunStatusLabel,
            crate::dto::room::ScriptOutline,
            crate::dto::room::SectionOutline,
            crate::dto::room::TimerSnapshot,
            crate::dto::room::PreviewSnapshot,
            crate::dto::room::PresenceSnapshot,
            crate::dto::room::ViewerSnapshot,
            crate::dto::room::MessageSnapshot,
            crate::model::chat::MessageKind,
            crate::dto::room::CommandAck,
            crate::dto::room::GoToRequest,
            crate::dto::room::PreviewRequest,
            crate::dto::room::SendMessageRequest,
            crate::dto::room::EnergyGiftRequest,
            crate::dto::room::ForegroundRequest,
            crate::dto::room::ReadStateRequest,
            crate::dto::room::AutoJoinRequest,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "room", description = "Room session lifecycle and preview"),
        (name = "host", description = "Host-only run-state controls"),
        (name = "presence", description = "Join, leave, and liveness reporting"),
        (name = "chat", description = "Room messages and energy gifts"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
