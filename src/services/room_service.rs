use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    dto::room::RoomSnapshot,
    error::ServiceError,
    room::controller::{self, RoomCommand, RoomHandle, RoomSession},
    state::{RoomKey, SharedState},
};

/// Create-or-attach the caller's session for an event room.
///
/// One session exists per (event, viewer) pair; reopening an already-open
/// room returns the live session instead of spawning a duplicate with its
/// own timers.
pub async fn open_room(
    state: &SharedState,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<RoomSnapshot, ServiceError> {
    let key = RoomKey { event_id, user_id };
    if let Some(handle) = live_handle(state, key) {
        return Ok(handle.snapshot());
    }

    let backend = state.require_backend().await?;
    let (session, feeds) = RoomSession::open(
        backend,
        state.prefs(),
        state.config(),
        state.degraded_watcher(),
        event_id,
        user_id,
    )
    .await?;

    let handle = controller::spawn(session, feeds);
    let snapshot = handle.snapshot();
    state.rooms().insert(key, handle);
    Ok(snapshot)
}

/// Latest view model for the caller's open session.
pub fn snapshot(
    state: &SharedState,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<RoomSnapshot, ServiceError> {
    Ok(require_handle(state, event_id, user_id)?.snapshot())
}

/// Subscribe to view-model updates for the caller's open session.
pub fn watch_room(
    state: &SharedState,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<watch::Receiver<RoomSnapshot>, ServiceError> {
    Ok(require_handle(state, event_id, user_id)?.watch())
}

/// Forward a command into the caller's open session.
///
/// Host actions are checked against the session's role here as well as in
/// the controller, so a non-host caller gets an immediate 401 instead of
/// a deferred error in the view model.
pub fn dispatch(
    state: &SharedState,
    event_id: Uuid,
    user_id: Uuid,
    command: RoomCommand,
) -> Result<(), ServiceError> {
    let handle = require_handle(state, event_id, user_id)?;

    if matches!(command, RoomCommand::Host(_)) && !handle.is_host() {
        return Err(ServiceError::Unauthorized(
            "only the event host can control the shared timer".into(),
        ));
    }

    handle.send(command)
}

/// Tear down the caller's session. Idempotent: closing a room that is not
/// open is a no-op.
pub fn close_room(state: &SharedState, event_id: Uuid, user_id: Uuid) {
    let key = RoomKey { event_id, user_id };
    if let Some((_, handle)) = state.rooms().remove(&key) {
        let _ = handle.send(RoomCommand::Close);
    }
}

/// Update the caller's global auto-join preference.
pub fn set_auto_join(state: &SharedState, user_id: Uuid, enabled: bool) {
    state.prefs().set_auto_join(user_id, enabled);
}

fn require_handle(
    state: &SharedState,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<RoomHandle, ServiceError> {
    let key = RoomKey { event_id, user_id };
    live_handle(state, key).ok_or_else(|| {
        ServiceError::NotFound(format!("no open room session for event `{event_id}`"))
    })
}

/// Fetch the live handle for a key, reaping it if its session has ended.
fn live_handle(state: &SharedState, key: RoomKey) -> Option<RoomHandle> {
    let existing = state.rooms().get(&key).map(|entry| entry.clone());
    match existing {
        Some(handle) if !handle.is_closed() => Some(handle),
        Some(_) => {
            state.rooms().remove(&key);
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use time::macros::datetime;

    use super::*;
    use crate::{
        backend::memory::MemoryBackend, config::AppConfig, model::event::EventRecord,
        state::AppState,
    };

    async fn seeded_state() -> (SharedState, Uuid, Uuid) {
        let backend = MemoryBackend::new();
        let event_id = Uuid::new_v4();
        let host_id = Uuid::new_v4();
        let script_id = Uuid::new_v4();

        backend.insert_script(
            script_id,
            json!({
                "id": script_id,
                "title": "Morning intention",
                "sections": [{"name": "Whole", "minutes": 5.0, "text": ""}],
            }),
        );
        backend.insert_event(EventRecord {
            id: event_id,
            title: "Sunrise sit".into(),
            host_user_id: host_id,
            script_id: Some(script_id),
            starts_at: datetime!(2026-03-01 06:00:00 UTC),
        });

        let state = AppState::new(AppConfig::default());
        state.install_backend(Arc::new(backend)).await;
        (state, event_id, host_id)
    }

    #[tokio::test]
    async fn reopening_returns_the_same_session() {
        let (state, event_id, host_id) = seeded_state().await;

        open_room(&state, event_id, host_id).await.unwrap();
        assert_eq!(state.rooms().len(), 1);

        open_room(&state, event_id, host_id).await.unwrap();
        assert_eq!(state.rooms().len(), 1, "no duplicate session spawned");
    }

    #[tokio::test]
    async fn host_commands_from_non_hosts_are_rejected_up_front() {
        let (state, event_id, _host_id) = seeded_state().await;
        let viewer = Uuid::new_v4();
        open_room(&state, event_id, viewer).await.unwrap();

        let err = dispatch(
            &state,
            event_id,
            viewer,
            RoomCommand::Host(crate::state::run_machine::RunAction::Start),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn actions_require_an_open_session() {
        let (state, event_id, host_id) = seeded_state().await;
        let err = dispatch(&state, event_id, host_id, RoomCommand::Join).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_event_fails_the_initial_load() {
        let (state, _event_id, host_id) = seeded_state().await;
        let err = open_room(&state, Uuid::new_v4(), host_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_reaps_the_registry() {
        let (state, event_id, host_id) = seeded_state().await;
        open_room(&state, event_id, host_id).await.unwrap();

        close_room(&state, event_id, host_id);
        assert!(state.rooms().is_empty());
        close_room(&state, event_id, host_id);
    }
}
