use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::format_timestamp,
    model::{
        chat::{ChatMessage, MessageKind},
        presence::{PresencePartition, PresenceRow},
        script::Script,
    },
    room::countdown::Countdown,
};

/// Coarse run status shown next to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatusLabel {
    /// Event has no usable script; the room is display-only.
    NoScript,
    /// Session has not started yet.
    Waiting,
    /// Countdown is live.
    Live,
    /// Countdown is frozen.
    Paused,
    /// Session is over.
    Ended,
}

/// Outline of the attached script exposed to every viewer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScriptOutline {
    /// Script title.
    pub title: String,
    /// Number of timed sections.
    pub section_count: usize,
    /// Sum of all section durations in seconds.
    pub total_duration_sec: u64,
    /// Per-section outline in play order.
    pub sections: Vec<SectionOutline>,
}

/// One section of the script outline.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SectionOutline {
    /// Section heading.
    pub name: String,
    /// Countdown duration in seconds.
    pub duration_sec: u64,
}

impl From<&Script> for ScriptOutline {
    fn from(script: &Script) -> Self {
        Self {
            title: script.title.clone(),
            section_count: script.sections.len(),
            total_duration_sec: script.total_duration_sec(),
            sections: script
                .sections
                .iter()
                .map(|section| SectionOutline {
                    name: section.name.clone(),
                    duration_sec: section.duration_sec(),
                })
                .collect(),
        }
    }
}

/// Live timer values derived from the shared run state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimerSnapshot {
    /// Section the shared timer points at.
    pub section_index: usize,
    /// Heading of that section.
    pub section_name: String,
    /// Seconds remaining in the section.
    pub seconds_left: u64,
    /// Full duration of the section in seconds.
    pub section_duration_sec: u64,
    /// Percent of the section completed, 0..=100.
    pub section_progress_pct: f64,
    /// Percent of the whole script completed, 0..=100.
    pub total_progress_pct: f64,
}

impl TimerSnapshot {
    /// Build from a derived countdown plus the section heading.
    pub fn from_countdown(countdown: &Countdown, section_name: String) -> Self {
        Self {
            section_index: countdown.section_index,
            section_name,
            seconds_left: countdown.seconds_left,
            section_duration_sec: countdown.section_duration_sec,
            section_progress_pct: countdown.section_progress * 100.0,
            total_progress_pct: countdown.total_progress * 100.0,
        }
    }
}

/// Local-only section preview for a non-host viewer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PreviewSnapshot {
    /// Index of the previewed section.
    pub section_index: usize,
    /// Heading of the previewed section.
    pub name: String,
    /// Full duration shown statically; a preview has no countdown.
    pub duration_sec: u64,
    /// Body text of the previewed section.
    pub text: String,
}

/// One viewer in the presence list.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ViewerSnapshot {
    /// The viewer's user id.
    pub user_id: Uuid,
    /// When the viewer's current join session began (RFC 3339).
    pub joined_at: String,
}

impl From<&PresenceRow> for ViewerSnapshot {
    fn from(row: &PresenceRow) -> Self {
        Self {
            user_id: row.user_id,
            joined_at: format_timestamp(row.joined_at),
        }
    }
}

/// Active/recent presence split for the room header.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PresenceSnapshot {
    /// Viewers with a heartbeat inside the active window.
    pub active: Vec<ViewerSnapshot>,
    /// Viewers past the window who have not explicitly left.
    pub recent: Vec<ViewerSnapshot>,
    /// Convenience count of `active`.
    pub active_count: usize,
}

impl From<&PresencePartition> for PresenceSnapshot {
    fn from(partition: &PresencePartition) -> Self {
        Self {
            active: partition.active.iter().map(Into::into).collect(),
            recent: partition.recent.iter().map(Into::into).collect(),
            active_count: partition.active.len(),
        }
    }
}

/// One rendered chat entry.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageSnapshot {
    /// Row id.
    pub id: Uuid,
    /// Author.
    pub user_id: Uuid,
    /// Message category.
    pub kind: MessageKind,
    /// Text body; empty for energy gifts.
    pub body: String,
    /// Gift size for energy messages.
    pub amount: Option<u32>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

impl From<&ChatMessage> for MessageSnapshot {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id,
            user_id: message.user_id,
            kind: message.kind,
            body: message.body.clone(),
            amount: message.amount,
            created_at: format_timestamp(message.created_at),
        }
    }
}

/// Complete view-model published to one viewer of one room.
///
/// Everything a client renders is here; the action surface lives in the
/// room routes. Snapshots are derived read-only data — clients never
/// mutate shared state through them.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomSnapshot {
    /// Event this room belongs to.
    pub event_id: Uuid,
    /// Event title.
    pub title: String,
    /// Whether this viewer is the event's host.
    pub is_host: bool,
    /// Whether this viewer currently counts as joined.
    pub is_joined: bool,
    /// Whether this viewer's app reports being foregrounded.
    pub foreground: bool,
    /// Whether the service is running without its backend.
    pub degraded: bool,
    /// Coarse run status label.
    pub run_status: RunStatusLabel,
    /// Script outline, absent when no usable script is attached.
    pub script: Option<ScriptOutline>,
    /// Live timer, absent when no usable script is attached.
    pub timer: Option<TimerSnapshot>,
    /// Local-only preview the viewer is reading, if any.
    pub preview: Option<PreviewSnapshot>,
    /// Presence split for the room header.
    pub presence: PresenceSnapshot,
    /// Messages in render order.
    pub messages: Vec<MessageSnapshot>,
    /// Messages that arrived while the viewer was scrolled up.
    pub unread_count: usize,
    /// Last local action failure, cleared by the next success.
    pub last_error: Option<String>,
}

/// Acknowledgement that a room command was queued for the session actor.
#[derive(Debug, Serialize, ToSchema)]
pub struct CommandAck {
    /// Always true; failures surface as error responses instead.
    pub accepted: bool,
}

impl CommandAck {
    /// The command was queued.
    pub fn queued() -> Self {
        Self { accepted: true }
    }
}

/// Request to jump the shared timer to a section.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GoToRequest {
    /// Zero-based section index.
    pub index: usize,
}

/// Request to preview a section locally.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PreviewRequest {
    /// Zero-based section index.
    pub index: usize,
}

/// Request to send a chat message.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SendMessageRequest {
    /// Message body.
    #[validate(length(min = 1, max = 2000, message = "body must be 1..=2000 characters"))]
    pub body: String,
}

/// Request to send an energy gift.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct EnergyGiftRequest {
    /// Gift size.
    #[validate(range(min = 1, max = 108, message = "amount must be 1..=108"))]
    pub amount: u32,
}

/// Report of the app's foreground state.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ForegroundRequest {
    /// True while the app is foregrounded.
    pub foreground: bool,
}

/// Report of the viewer's transcript scroll position.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ReadStateRequest {
    /// True while the viewer is at the bottom of the transcript.
    pub at_bottom: bool,
}

/// Update of the global auto-join preference.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AutoJoinRequest {
    /// Whether rooms with a sticky join should auto-join on open.
    pub enabled: bool,
}
