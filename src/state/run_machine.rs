use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::model::run_state::{RunMode, RunState};

/// Host actions that can be applied to an event's run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAction {
    /// Begin the session from idle.
    Start,
    /// Freeze the countdown, banking the elapsed seconds.
    Pause,
    /// Continue the countdown from the banked elapsed seconds.
    Resume,
    /// Finish the session.
    End,
    /// Move to the next section, or end after the last one.
    Advance,
    /// Jump to a specific section with a fresh timer.
    GoTo(usize),
    /// Re-enter a fresh run from the ended state.
    Restart,
}

/// Write payload produced by a validated plan.
///
/// Field-for-field this is what the store's transition operation persists;
/// `started_at` is stamped by the store from server time, never here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTransition {
    /// Mode the shared state moves to.
    pub mode: RunMode,
    /// Section the timer points at after the write.
    pub section_index: usize,
    /// Banked elapsed seconds carried into the new state.
    pub elapsed_before_pause_sec: u64,
    /// Force the banked seconds to zero and refresh `started_at` when
    /// entering `running`; the start/restart and jump-to-section path.
    pub reset_timer: bool,
}

/// Error returned when an action cannot be applied from the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {action:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Mode the shared state was in when the action was requested.
    pub from: RunMode,
    /// The rejected action.
    pub action: RunAction,
}

/// Errors that can occur when planning a run-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already in flight and must be applied or aborted
    /// before another can be planned.
    AlreadyPending,
    /// The event has no usable script, so there is nothing to time.
    NoTimingScript,
    /// A jump target outside the script's section list.
    SectionOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of sections in the attached script.
        section_count: usize,
    },
    /// The action is not legal from the current mode.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying an in-flight plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently in flight.
    NoPending,
    /// Plan id does not match the in-flight plan.
    IdMismatch {
        /// Id of the in-flight plan.
        expected: PlanId,
        /// Id that was supplied.
        got: PlanId,
    },
}

/// Errors that can occur when aborting an in-flight plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently in flight.
    NoPending,
    /// Plan id does not match the in-flight plan.
    IdMismatch {
        /// Id of the in-flight plan.
        expected: PlanId,
        /// Id that was supplied.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition whose backend write has not yet confirmed.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Mode the plan was computed from.
    pub from: RunMode,
    /// Action that produced the plan.
    pub action: RunAction,
    /// Payload the store will persist.
    pub write: RunTransition,
    /// When the plan was created; in-flight age for diagnostics.
    pub pending_since: Instant,
}

/// Planner enforcing the run-state mode machine on the host's side.
///
/// The store trusts the host and does not validate transitions
/// server-side, so legality lives here: an action is first planned
/// against the last confirmed state, the backend write runs, and the
/// plan is applied on success or aborted on failure. The single pending
/// slot doubles as the auto-advance re-entrancy guard — while a
/// transition is in flight no second one can be planned, however many
/// display ticks observe `seconds_left == 0` in the meantime.
#[derive(Debug, Default)]
pub struct RunPlanner {
    pending: Option<RunPlan>,
}

impl RunPlanner {
    /// Planner with no transition in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// The in-flight plan, if any.
    pub fn pending(&self) -> Option<&RunPlan> {
        self.pending.as_ref()
    }

    /// Validate `action` against the last confirmed state and put the
    /// resulting transition in flight.
    ///
    /// `elapsed_sec` is the caller's derived elapsed time within the
    /// current section at the moment of the action; it is banked by
    /// pause and end. `section_count` is the attached script's section
    /// count, zero when no usable script exists.
    pub fn plan(
        &mut self,
        current: &RunState,
        elapsed_sec: u64,
        section_count: usize,
        action: RunAction,
    ) -> Result<RunPlan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let write = compute_transition(current, elapsed_sec, section_count, action)?;

        let plan = RunPlan {
            id: Uuid::new_v4(),
            from: current.mode,
            action,
            write,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Confirm the in-flight plan after its write succeeded.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RunTransition, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        Ok(plan.write)
    }

    /// Discard the in-flight plan after its write failed or timed out.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }
}

/// Compute the write for an action if it is legal from the current mode.
fn compute_transition(
    current: &RunState,
    elapsed_sec: u64,
    section_count: usize,
    action: RunAction,
) -> Result<RunTransition, PlanError> {
    if section_count == 0 {
        return Err(PlanError::NoTimingScript);
    }

    let section = current.section_index.min(section_count - 1);

    let write = match (current.mode, action) {
        (RunMode::Idle, RunAction::Start) => RunTransition {
            mode: RunMode::Running,
            section_index: section,
            elapsed_before_pause_sec: 0,
            reset_timer: true,
        },
        (RunMode::Running, RunAction::Pause) => RunTransition {
            mode: RunMode::Paused,
            section_index: section,
            elapsed_before_pause_sec: elapsed_sec,
            reset_timer: false,
        },
        (RunMode::Paused, RunAction::Resume) => RunTransition {
            mode: RunMode::Running,
            section_index: section,
            elapsed_before_pause_sec: current.elapsed_before_pause_sec,
            reset_timer: false,
        },
        (RunMode::Running | RunMode::Paused, RunAction::End) => RunTransition {
            mode: RunMode::Ended,
            section_index: section,
            elapsed_before_pause_sec: elapsed_sec,
            reset_timer: false,
        },
        (RunMode::Running, RunAction::Advance) => {
            if section + 1 < section_count {
                RunTransition {
                    mode: RunMode::Running,
                    section_index: section + 1,
                    elapsed_before_pause_sec: 0,
                    reset_timer: true,
                }
            } else {
                // Last section ran out: the session ends rather than the
                // index running past the script.
                RunTransition {
                    mode: RunMode::Ended,
                    section_index: section,
                    elapsed_before_pause_sec: 0,
                    reset_timer: true,
                }
            }
        }
        (RunMode::Idle | RunMode::Running | RunMode::Paused, RunAction::GoTo(index)) => {
            if index >= section_count {
                return Err(PlanError::SectionOutOfRange {
                    index,
                    section_count,
                });
            }
            RunTransition {
                mode: current.mode,
                section_index: index,
                elapsed_before_pause_sec: 0,
                reset_timer: true,
            }
        }
        (RunMode::Ended, RunAction::Restart) => RunTransition {
            mode: RunMode::Running,
            section_index: 0,
            elapsed_before_pause_sec: 0,
            reset_timer: true,
        },
        (from, action) => {
            return Err(PlanError::InvalidTransition(InvalidTransition {
                from,
                action,
            }));
        }
    };

    Ok(write)
}
