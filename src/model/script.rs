use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One timed section of a guided script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptSection {
    /// Section heading shown above the timer.
    pub name: String,
    /// Planned duration in minutes. Always > 0 in a usable script.
    pub minutes: f64,
    /// Body text read during the section.
    pub text: String,
}

impl ScriptSection {
    /// Countdown duration for this section, floored to whole seconds and
    /// never below one second.
    pub fn duration_sec(&self) -> u64 {
        ((self.minutes * 60.0).floor() as i64).max(1) as u64
    }
}

/// Guided script attached to an event, consumed read-only by the room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Script {
    /// Primary key of the script.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Advertised total length in minutes (informational; timing derives
    /// from the sections).
    #[serde(default)]
    pub duration_minutes: f64,
    /// Tone the script was generated with (e.g. "gentle", "focused").
    #[serde(default)]
    pub tone: String,
    /// Ordered sections the timer advances through.
    pub sections: Vec<ScriptSection>,
    /// Optional host-only notes.
    #[serde(default)]
    pub speaker_notes: Option<String>,
}

impl Script {
    /// Defensively parse a stored script document.
    ///
    /// Returns `None` for anything that cannot drive the timer — missing
    /// title, no sections, or any section without a strictly positive
    /// finite duration. The room then falls back to its "no script
    /// attached" display-only behavior instead of crashing.
    pub fn normalize(raw: &Value) -> Option<Self> {
        let script: Script = serde_json::from_value(raw.clone()).ok()?;
        if script.title.trim().is_empty() || !script.is_usable() {
            return None;
        }
        Some(script)
    }

    /// Whether every section carries a usable duration.
    pub fn is_usable(&self) -> bool {
        !self.sections.is_empty()
            && self
                .sections
                .iter()
                .all(|section| section.minutes.is_finite() && section.minutes > 0.0)
    }

    /// Sum of all section durations in seconds.
    pub fn total_duration_sec(&self) -> u64 {
        self.sections.iter().map(ScriptSection::duration_sec).sum()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn usable_script() -> Value {
        json!({
            "id": "6b0a2f9e-41f3-4a6c-9f2f-6f9f0cb1a001",
            "title": "Evening intention",
            "duration_minutes": 12.0,
            "tone": "gentle",
            "sections": [
                {"name": "Arrival", "minutes": 2.0, "text": "Settle in."},
                {"name": "Core", "minutes": 8.5, "text": "Hold the intention."},
                {"name": "Close", "minutes": 1.5, "text": "Release."},
            ],
        })
    }

    #[test]
    fn normalize_accepts_a_complete_script() {
        let script = Script::normalize(&usable_script()).unwrap();
        assert_eq!(script.sections.len(), 3);
        assert_eq!(script.sections[0].duration_sec(), 120);
        assert_eq!(script.sections[1].duration_sec(), 510);
        assert_eq!(script.total_duration_sec(), 120 + 510 + 90);
    }

    #[test]
    fn normalize_rejects_zero_minute_sections() {
        let mut raw = usable_script();
        raw["sections"][1]["minutes"] = json!(0.0);
        assert!(Script::normalize(&raw).is_none());
    }

    #[test]
    fn normalize_rejects_empty_sections_and_garbage() {
        let mut raw = usable_script();
        raw["sections"] = json!([]);
        assert!(Script::normalize(&raw).is_none());
        assert!(Script::normalize(&json!({"sections": "nope"})).is_none());
        assert!(Script::normalize(&json!(42)).is_none());
    }

    #[test]
    fn sub_minute_sections_floor_to_at_least_one_second() {
        let section = ScriptSection {
            name: "Blink".into(),
            minutes: 0.005,
            text: String::new(),
        };
        assert_eq!(section.duration_sec(), 1);
    }
}
