use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    backend::{DataBackend, error::BackendResult},
    model::presence::PresenceRow,
    sync::FeedEvent,
};

/// Maintains the "who is here now" set for events.
///
/// Writes are naturally partitioned by `(event_id, user_id)` so concurrent
/// viewers never contend. Liveness is interpreted locally: the tracker
/// stores raw rows and consumers partition them into active/recent against
/// the configured window.
#[derive(Clone)]
pub struct PresenceTracker {
    backend: Arc<dyn DataBackend>,
}

impl PresenceTracker {
    /// Tracker backed by the given data backend.
    pub fn new(backend: Arc<dyn DataBackend>) -> Self {
        Self { backend }
    }

    /// Record the user as present, preserving `joined_at` when a row from
    /// the current join session already exists (a rejoin keeps its
    /// original join time until an explicit leave removes the row).
    pub async fn join(&self, event_id: Uuid, user_id: Uuid) -> BackendResult<PresenceRow> {
        let now = self.backend.server_time().await?;
        let joined_at = self
            .backend
            .fetch_presence(event_id, user_id)
            .await?
            .map(|row| row.joined_at)
            .unwrap_or(now);

        let row = PresenceRow {
            event_id,
            user_id,
            joined_at,
            last_seen_at: now,
        };
        self.backend.upsert_presence(row.clone()).await?;
        Ok(row)
    }

    /// Refresh `last_seen_at` only.
    ///
    /// Callers skip this entirely while the app is backgrounded —
    /// heartbeats are a liveness signal, not a keep-alive hack. A missing
    /// row (e.g. cleaned up elsewhere) is re-created so a live viewer
    /// never stays invisible until the next manual join.
    pub async fn heartbeat(&self, event_id: Uuid, user_id: Uuid) -> BackendResult<()> {
        let now = self.backend.server_time().await?;
        let joined_at = self
            .backend
            .fetch_presence(event_id, user_id)
            .await?
            .map(|row| row.joined_at)
            .unwrap_or(now);

        self.backend
            .upsert_presence(PresenceRow {
                event_id,
                user_id,
                joined_at,
                last_seen_at: now,
            })
            .await
    }

    /// Delete the row outright. Distinct from going idle: an explicit
    /// leave is permanent until the user rejoins.
    pub async fn leave(&self, event_id: Uuid, user_id: Uuid) -> BackendResult<()> {
        self.backend.delete_presence(event_id, user_id).await
    }

    /// Full snapshot for the event.
    pub async fn list(&self, event_id: Uuid) -> BackendResult<Vec<PresenceRow>> {
        self.backend.list_presence(event_id).await
    }

    /// Incremental presence feed for the event. Not gap-free; pair with
    /// periodic [`PresenceTracker::list`] resyncs.
    pub fn subscribe(&self, event_id: Uuid) -> broadcast::Receiver<FeedEvent<PresenceRow>> {
        self.backend.subscribe_presence(event_id)
    }
}
