use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Payload category of a room message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain chat text.
    Text,
    /// Energy gift sent to the room; `amount` carries its size.
    Energy,
}

/// One chat row for an event's room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Primary key. Assigned by the sender before the write confirms so the
    /// real-time echo can be deduplicated against the optimistic entry.
    pub id: Uuid,
    /// Event this message belongs to.
    pub event_id: Uuid,
    /// Author of the message.
    pub user_id: Uuid,
    /// Message category.
    pub kind: MessageKind,
    /// Text body; empty for energy gifts.
    pub body: String,
    /// Gift size when `kind == Energy`.
    #[serde(default)]
    pub amount: Option<u32>,
    /// Creation timestamp used as the primary ordering key.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Locally-generated id carried through the write for optimistic-send
    /// dedupe.
    #[serde(default)]
    pub client_id: Option<Uuid>,
}

impl ChatMessage {
    /// Total ordering key: `(created_at, id)`, so colliding timestamps
    /// still order deterministically.
    pub fn order_key(&self) -> (OffsetDateTime, Uuid) {
        (self.created_at, self.id)
    }
}

