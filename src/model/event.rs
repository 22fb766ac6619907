use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Scheduled event row consumed by the room layer.
///
/// Events are created and edited elsewhere in the product; the room only
/// needs the identity, the designated host, and the attached script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    /// Primary key of the event.
    pub id: Uuid,
    /// Display title of the session.
    pub title: String,
    /// User designated as the event's host and sole run-state writer.
    pub host_user_id: Uuid,
    /// Script attached to the event, if any.
    pub script_id: Option<Uuid>,
    /// Scheduled start of the session.
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
}

impl EventRecord {
    /// Whether the given user is this event's host.
    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.host_user_id == user_id
    }
}
