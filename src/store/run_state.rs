use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    backend::{DataBackend, error::BackendResult},
    model::run_state::{RUN_STATE_VERSION, RunMode, RunState},
    state::run_machine::RunTransition,
};

/// Single source of truth for one event's synchronized playback position.
///
/// Thin repository over the backend's run-state table: reads pass through
/// [`RunState::normalize`], the initial row is created idempotently, and
/// transition writes stamp `started_at` from the backend's server time so
/// viewer clock drift can never desynchronize the timer.
#[derive(Clone)]
pub struct RunStateStore {
    backend: Arc<dyn DataBackend>,
}

impl RunStateStore {
    /// Store backed by the given data backend.
    pub fn new(backend: Arc<dyn DataBackend>) -> Self {
        Self { backend }
    }

    /// Return the event's current state, creating the default `idle`
    /// document if none exists yet.
    ///
    /// Safe under concurrent first-open by multiple viewers: the insert is
    /// create-if-absent and every caller reads back whichever row won.
    pub async fn ensure(&self, event_id: Uuid) -> BackendResult<RunState> {
        if let Some(raw) = self.backend.fetch_run_state(event_id).await? {
            return Ok(RunState::normalize(&raw));
        }

        let initial = serde_json::to_value(RunState::default())
            .expect("default run state always serializes");
        let stored = self.backend.init_run_state(event_id, initial).await?;
        Ok(RunState::normalize(&stored))
    }

    /// Re-read the event's state, if present.
    pub async fn fetch(&self, event_id: Uuid) -> BackendResult<Option<RunState>> {
        let raw = self.backend.fetch_run_state(event_id).await?;
        Ok(raw.as_ref().map(RunState::normalize))
    }

    /// Persist a host transition and return the stored state.
    ///
    /// `started_at` is stamped from the backend's time source whenever the
    /// new mode is `running` — every transition into `running` produced by
    /// the planner either resets the timer or resumes from a pause, and
    /// both refresh the anchor so elapsed time derives from one authority.
    pub async fn transition(
        &self,
        event_id: Uuid,
        write: RunTransition,
    ) -> BackendResult<RunState> {
        let now = self.backend.server_time().await?;

        let next = RunState {
            version: RUN_STATE_VERSION,
            mode: write.mode,
            section_index: write.section_index,
            started_at: (write.mode == RunMode::Running).then_some(now),
            elapsed_before_pause_sec: if write.reset_timer {
                0
            } else {
                write.elapsed_before_pause_sec
            },
        };

        let document =
            serde_json::to_value(&next).expect("run state document always serializes");
        self.backend.put_run_state(event_id, document).await?;
        Ok(next)
    }

    /// Change feed of raw state documents for the event. Not gap-free;
    /// pair with periodic [`RunStateStore::fetch`] resyncs.
    pub fn subscribe(&self, event_id: Uuid) -> broadcast::Receiver<Value> {
        self.backend.subscribe_run_state(event_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::backend::memory::MemoryBackend;

    const START: time::OffsetDateTime = datetime!(2026-03-01 18:00:00 UTC);

    fn store() -> (RunStateStore, MemoryBackend, crate::backend::memory::ManualClock) {
        let (backend, clock) = MemoryBackend::with_manual_clock(START);
        (
            RunStateStore::new(Arc::new(backend.clone())),
            backend,
            clock,
        )
    }

    #[tokio::test]
    async fn concurrent_ensure_creates_exactly_one_row() {
        let (store, _backend, _clock) = store();
        let event_id = Uuid::new_v4();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { store.ensure(event_id).await }));
        }

        let mut states = Vec::new();
        for task in tasks {
            states.push(task.await.unwrap().unwrap());
        }

        let first = &states[0];
        assert_eq!(first.mode, RunMode::Idle);
        assert_eq!(first.section_index, 0);
        assert!(states.iter().all(|state| state == first));
    }

    #[tokio::test]
    async fn transition_into_running_stamps_server_time() {
        let (store, _backend, clock) = store();
        let event_id = Uuid::new_v4();
        store.ensure(event_id).await.unwrap();

        clock.advance(Duration::from_secs(42));
        let state = store
            .transition(
                event_id,
                RunTransition {
                    mode: RunMode::Running,
                    section_index: 0,
                    elapsed_before_pause_sec: 0,
                    reset_timer: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(state.started_at, Some(START + time::Duration::seconds(42)));
        assert_eq!(state.elapsed_before_pause_sec, 0);
    }

    #[tokio::test]
    async fn pause_clears_started_at_and_banks_elapsed() {
        let (store, _backend, _clock) = store();
        let event_id = Uuid::new_v4();

        let state = store
            .transition(
                event_id,
                RunTransition {
                    mode: RunMode::Paused,
                    section_index: 1,
                    elapsed_before_pause_sec: 37,
                    reset_timer: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(state.mode, RunMode::Paused);
        assert_eq!(state.started_at, None);
        assert_eq!(state.elapsed_before_pause_sec, 37);

        // The stored document round-trips through normalize unchanged.
        assert_eq!(store.fetch(event_id).await.unwrap().unwrap(), state);
    }

    #[tokio::test]
    async fn reset_timer_overrides_carried_elapsed() {
        let (store, _backend, _clock) = store();
        let event_id = Uuid::new_v4();

        let state = store
            .transition(
                event_id,
                RunTransition {
                    mode: RunMode::Running,
                    section_index: 2,
                    elapsed_before_pause_sec: 99,
                    reset_timer: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(state.elapsed_before_pause_sec, 0);
    }

    #[tokio::test]
    async fn writes_reach_the_change_feed() {
        let (store, _backend, _clock) = store();
        let event_id = Uuid::new_v4();
        let mut feed = store.subscribe(event_id);

        store.ensure(event_id).await.unwrap();
        let raw = feed.recv().await.unwrap();
        assert_eq!(RunState::normalize(&raw).mode, RunMode::Idle);
    }
}
