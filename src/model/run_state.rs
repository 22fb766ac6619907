use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Schema tag written into every run-state document.
pub const RUN_STATE_VERSION: u32 = 1;

/// Playback mode of an event's shared run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// No session has started yet; the timer shows the first section at rest.
    #[default]
    Idle,
    /// The timer is counting down from `started_at`.
    Running,
    /// The timer is frozen at the accumulated elapsed seconds.
    Paused,
    /// The session finished; progress displays pin to 100%.
    Ended,
}

/// Authoritative playback position for one event.
///
/// Exactly one document exists per event once any viewer has opened the
/// room. Only the host writes it; every viewer derives its countdown from
/// this record plus the shared server clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Schema tag, currently [`RUN_STATE_VERSION`].
    pub version: u32,
    /// Current playback mode.
    pub mode: RunMode,
    /// Zero-based index into the attached script's section list.
    pub section_index: usize,
    /// Server timestamp of the last entry into [`RunMode::Running`].
    ///
    /// Present if and only if `mode == Running`.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Elapsed seconds accumulated in the current section by prior run
    /// segments. Reset to 0 whenever the section changes or the session
    /// restarts.
    pub elapsed_before_pause_sec: u64,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            version: RUN_STATE_VERSION,
            mode: RunMode::Idle,
            section_index: 0,
            started_at: None,
            elapsed_before_pause_sec: 0,
        }
    }
}

impl RunState {
    /// Defensively parse a stored run-state document.
    ///
    /// The store is shared infrastructure: rows may be partially written,
    /// hand-edited, or produced by a future schema version. Unknown modes
    /// map to [`RunMode::Idle`], missing or negative numerics coerce to 0,
    /// and unknown fields are ignored. A `running` row without a parsable
    /// `started_at` is demoted to `paused` at its accumulated elapsed
    /// seconds, since no countdown can be derived without the authority
    /// timestamp.
    pub fn normalize(raw: &Value) -> Self {
        let version = raw
            .get("version")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(RUN_STATE_VERSION);

        let mut mode = match raw.get("mode").and_then(Value::as_str) {
            Some("running") => RunMode::Running,
            Some("paused") => RunMode::Paused,
            Some("ended") => RunMode::Ended,
            _ => RunMode::Idle,
        };

        let section_index = raw
            .get("section_index")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        let elapsed_before_pause_sec = raw
            .get("elapsed_before_pause_sec")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let mut started_at = raw
            .get("started_at")
            .and_then(Value::as_str)
            .and_then(|text| OffsetDateTime::parse(text, &Rfc3339).ok());

        match mode {
            RunMode::Running if started_at.is_none() => {
                mode = RunMode::Paused;
            }
            RunMode::Running => {}
            _ => started_at = None,
        }

        Self {
            version,
            mode,
            section_index,
            started_at,
            elapsed_before_pause_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn normalize_fills_defaults_for_garbage() {
        let raw = json!({
            "mode": "bogus",
            "section_index": -3,
            // elapsed_before_pause_sec missing entirely
        });

        let state = RunState::normalize(&raw);
        assert_eq!(state.mode, RunMode::Idle);
        assert_eq!(state.section_index, 0);
        assert_eq!(state.elapsed_before_pause_sec, 0);
        assert_eq!(state.started_at, None);
    }

    #[test]
    fn normalize_roundtrips_a_valid_document() {
        let original = RunState {
            version: RUN_STATE_VERSION,
            mode: RunMode::Running,
            section_index: 2,
            started_at: Some(datetime!(2026-03-01 18:30:00 UTC)),
            elapsed_before_pause_sec: 45,
        };

        let raw = serde_json::to_value(&original).unwrap();
        assert_eq!(RunState::normalize(&raw), original);
    }

    #[test]
    fn normalize_strips_started_at_outside_running() {
        let raw = json!({
            "mode": "paused",
            "section_index": 1,
            "started_at": "2026-03-01T18:30:00Z",
            "elapsed_before_pause_sec": 10,
        });

        let state = RunState::normalize(&raw);
        assert_eq!(state.mode, RunMode::Paused);
        assert_eq!(state.started_at, None);
        assert_eq!(state.elapsed_before_pause_sec, 10);
    }

    #[test]
    fn normalize_demotes_running_without_timestamp() {
        let raw = json!({
            "mode": "running",
            "section_index": 1,
            "elapsed_before_pause_sec": 30,
        });

        let state = RunState::normalize(&raw);
        assert_eq!(state.mode, RunMode::Paused);
        assert_eq!(state.elapsed_before_pause_sec, 30);
    }

    #[test]
    fn normalize_tolerates_future_schema_versions() {
        let raw = json!({
            "version": 7,
            "mode": "ended",
            "section_index": 4,
            "elapsed_before_pause_sec": 0,
            "brand_new_field": {"nested": true},
        });

        let state = RunState::normalize(&raw);
        assert_eq!(state.version, 7);
        assert_eq!(state.mode, RunMode::Ended);
        assert_eq!(state.section_index, 4);
    }
}
