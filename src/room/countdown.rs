use time::OffsetDateTime;

use crate::model::{
    run_state::{RunMode, RunState},
    script::ScriptSection,
};

/// Derived timer values for one instant of one run state.
///
/// Pure data: producing it never writes anywhere, so every viewer can
/// recompute it on a local display tick as often as it likes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Countdown {
    /// Section the timer points at, clamped into the script.
    pub section_index: usize,
    /// Full duration of that section in seconds.
    pub section_duration_sec: u64,
    /// Raw elapsed seconds within the section, uncapped; this is the
    /// value banked by a pause.
    pub elapsed_sec: u64,
    /// Seconds remaining, floored at zero.
    pub seconds_left: u64,
    /// Fraction of the section completed, in `[0, 1]`; pinned to 1 once
    /// the session has ended.
    pub section_progress: f64,
    /// Fraction of the whole script completed, in `[0, 1]`; pinned to 1
    /// once the session has ended.
    pub total_progress: f64,
}

/// Derive the countdown for `state` against `sections` at `now`.
///
/// Returns `None` when there are no usable sections — the room is then
/// display-only and has no timer at all. `now` must come from the shared
/// server clock; elapsed time is `elapsed_before_pause_sec` plus, while
/// running, the seconds since the server-stamped `started_at`.
pub fn derive(state: &RunState, sections: &[ScriptSection], now: OffsetDateTime) -> Option<Countdown> {
    if sections.is_empty() {
        return None;
    }

    let section_index = state.section_index.min(sections.len() - 1);
    let section_duration_sec = sections[section_index].duration_sec();

    let running_sec = match (state.mode, state.started_at) {
        (RunMode::Running, Some(started_at)) => (now - started_at).whole_seconds().max(0) as u64,
        _ => 0,
    };
    let elapsed_sec = state.elapsed_before_pause_sec + running_sec;
    let seconds_left = section_duration_sec.saturating_sub(elapsed_sec);

    let capped = elapsed_sec.min(section_duration_sec);
    let completed_sec: u64 = sections[..section_index]
        .iter()
        .map(ScriptSection::duration_sec)
        .sum();
    let total_sec: u64 = sections.iter().map(ScriptSection::duration_sec).sum();

    let (section_progress, total_progress) = if state.mode == RunMode::Ended {
        (1.0, 1.0)
    } else {
        (
            capped as f64 / section_duration_sec as f64,
            (completed_sec + capped) as f64 / total_sec as f64,
        )
    };

    Some(Countdown {
        section_index,
        section_duration_sec,
        elapsed_sec,
        seconds_left,
        section_progress,
        total_progress,
    })
}

/// Full duration of a section, for the non-host preview display: a
/// previewed section is static reading, not a second timeline, so it
/// shows its whole duration with no countdown.
pub fn section_duration(sections: &[ScriptSection], index: usize) -> Option<u64> {
    sections.get(index).map(ScriptSection::duration_sec)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::model::run_state::RUN_STATE_VERSION;

    const T0: OffsetDateTime = datetime!(2026-03-01 18:00:00 UTC);

    fn sections() -> Vec<ScriptSection> {
        [("Arrival", 2.0), ("Core", 5.0), ("Close", 3.0)]
            .into_iter()
            .map(|(name, minutes)| ScriptSection {
                name: name.into(),
                minutes,
                text: String::new(),
            })
            .collect()
    }

    fn running(section_index: usize, elapsed_before: u64) -> RunState {
        RunState {
            version: RUN_STATE_VERSION,
            mode: RunMode::Running,
            section_index,
            started_at: Some(T0),
            elapsed_before_pause_sec: elapsed_before,
        }
    }

    #[test]
    fn seconds_left_is_non_increasing_and_exact_at_zero() {
        let sections = sections();
        let state = running(0, 15);
        let deadline = 120 - 15;

        let mut previous = u64::MAX;
        for offset in 0..=deadline + 10 {
            let now = T0 + time::Duration::seconds(offset as i64);
            let countdown = derive(&state, &sections, now).unwrap();
            assert!(countdown.seconds_left <= previous);
            previous = countdown.seconds_left;

            if offset == deadline {
                assert_eq!(countdown.seconds_left, 0);
            }
            if offset == deadline - 1 {
                assert_eq!(countdown.seconds_left, 1);
            }
        }
    }

    #[test]
    fn paused_state_is_frozen_regardless_of_now() {
        let sections = sections();
        let state = RunState {
            mode: RunMode::Paused,
            section_index: 1,
            elapsed_before_pause_sec: 40,
            ..RunState::default()
        };

        for offset in [0i64, 60, 3600] {
            let countdown =
                derive(&state, &sections, T0 + time::Duration::seconds(offset)).unwrap();
            assert_eq!(countdown.elapsed_sec, 40);
            assert_eq!(countdown.seconds_left, 300 - 40);
        }
    }

    #[test]
    fn pause_resume_pause_conserves_elapsed() {
        let sections = sections();

        // Running from T0; the host pauses after e1 = 30s of wall time.
        let e1 = derive(&running(1, 0), &sections, T0 + time::Duration::seconds(30))
            .unwrap()
            .elapsed_sec;
        assert_eq!(e1, 30);

        // Resume later at T1; the banked seconds carry over and the gap
        // between pause and resume contributes nothing.
        let t1 = T0 + time::Duration::minutes(30);
        let resumed = RunState {
            mode: RunMode::Running,
            section_index: 1,
            started_at: Some(t1),
            elapsed_before_pause_sec: e1,
            ..RunState::default()
        };

        // Second pause after e2 = 45s more.
        let e_total = derive(&resumed, &sections, t1 + time::Duration::seconds(45))
            .unwrap()
            .elapsed_sec;
        assert_eq!(e_total, 30 + 45);
    }

    #[test]
    fn idle_shows_the_full_section() {
        let sections = sections();
        let countdown = derive(&RunState::default(), &sections, T0).unwrap();
        assert_eq!(countdown.seconds_left, 120);
        assert_eq!(countdown.section_progress, 0.0);
        assert_eq!(countdown.total_progress, 0.0);
    }

    #[test]
    fn overshoot_floors_at_zero_and_progress_clamps() {
        let sections = sections();
        let state = running(0, 0);
        let countdown = derive(&state, &sections, T0 + time::Duration::seconds(500)).unwrap();
        assert_eq!(countdown.seconds_left, 0);
        assert_eq!(countdown.section_progress, 1.0);
        assert!(countdown.total_progress <= 1.0);
    }

    #[test]
    fn ended_pins_both_progress_displays() {
        let sections = sections();
        let state = RunState {
            mode: RunMode::Ended,
            section_index: 1,
            elapsed_before_pause_sec: 10,
            ..RunState::default()
        };
        let countdown = derive(&state, &sections, T0).unwrap();
        assert_eq!(countdown.section_progress, 1.0);
        assert_eq!(countdown.total_progress, 1.0);
    }

    #[test]
    fn total_progress_accumulates_completed_sections() {
        let sections = sections();
        // Section 1 (300s) at 150s elapsed; section 0 (120s) completed.
        let state = RunState {
            mode: RunMode::Paused,
            section_index: 1,
            elapsed_before_pause_sec: 150,
            ..RunState::default()
        };
        let countdown = derive(&state, &sections, T0).unwrap();
        let expected = (120.0 + 150.0) / 600.0;
        assert!((countdown.total_progress - expected).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_section_index_is_clamped() {
        let sections = sections();
        let state = RunState {
            section_index: 99,
            ..RunState::default()
        };
        let countdown = derive(&state, &sections, T0).unwrap();
        assert_eq!(countdown.section_index, 2);
        assert_eq!(countdown.section_duration_sec, 180);
    }

    #[test]
    fn no_sections_means_no_timer() {
        assert_eq!(derive(&RunState::default(), &[], T0), None);
        assert_eq!(section_duration(&[], 0), None);
        assert_eq!(section_duration(&sections(), 1), Some(300));
    }
}
