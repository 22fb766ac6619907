/// Backend error types shared by every implementation.
pub mod error;
#[cfg(feature = "memory-store")]
/// In-memory backend used for local development and tests.
pub mod memory;

use futures::future::BoxFuture;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    backend::error::BackendResult,
    model::{chat::ChatMessage, event::EventRecord, presence::PresenceRow},
    sync::FeedEvent,
};

/// Abstraction over the managed data store the rooms ride on.
///
/// The store owns six tables' worth of rows (events, scripts, run states,
/// presence, messages, profiles); this trait exposes only what the room
/// core consumes: row CRUD with the filters it needs, a change feed per
/// table, and a single server-side time source. Run-state and script rows
/// travel as raw JSON documents so readers are forced through the
/// defensive normalizers — the store is shared infrastructure and must
/// tolerate partially-written or future-versioned rows.
///
/// Feed delivery is best-effort: not exactly-once and not gap-free.
/// Consumers pair every subscription with periodic snapshot resyncs.
pub trait DataBackend: Send + Sync {
    /// Current server time, the single authority for `started_at` stamps.
    fn server_time(&self) -> BoxFuture<'static, BackendResult<OffsetDateTime>>;

    /// Fetch one event row.
    fn fetch_event(&self, event_id: Uuid)
    -> BoxFuture<'static, BackendResult<Option<EventRecord>>>;

    /// Fetch a script document as stored.
    fn fetch_script(&self, script_id: Uuid) -> BoxFuture<'static, BackendResult<Option<Value>>>;

    /// Fetch an event's run-state document as stored.
    fn fetch_run_state(&self, event_id: Uuid) -> BoxFuture<'static, BackendResult<Option<Value>>>;

    /// Insert the initial run-state document unless one already exists,
    /// then return whatever is stored. Must be atomic under concurrent
    /// first-open by multiple viewers.
    fn init_run_state(
        &self,
        event_id: Uuid,
        initial: Value,
    ) -> BoxFuture<'static, BackendResult<Value>>;

    /// Replace an event's run-state document.
    fn put_run_state(&self, event_id: Uuid, state: Value)
    -> BoxFuture<'static, BackendResult<()>>;

    /// Fetch one presence row by its composite key.
    fn fetch_presence(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, BackendResult<Option<PresenceRow>>>;

    /// Insert or replace a presence row keyed by `(event_id, user_id)`.
    fn upsert_presence(&self, row: PresenceRow) -> BoxFuture<'static, BackendResult<()>>;

    /// Delete a presence row outright (explicit leave).
    fn delete_presence(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, BackendResult<()>>;

    /// Full presence snapshot for an event.
    fn list_presence(&self, event_id: Uuid)
    -> BoxFuture<'static, BackendResult<Vec<PresenceRow>>>;

    /// Append one chat message.
    fn insert_message(&self, message: ChatMessage) -> BoxFuture<'static, BackendResult<()>>;

    /// Most recent messages for an event in `(created_at, id)` order,
    /// truncated to the newest `limit` rows.
    fn list_messages(
        &self,
        event_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, BackendResult<Vec<ChatMessage>>>;

    /// Change feed of raw run-state documents for one event.
    fn subscribe_run_state(&self, event_id: Uuid) -> broadcast::Receiver<Value>;

    /// Change feed of presence rows for one event.
    fn subscribe_presence(&self, event_id: Uuid) -> broadcast::Receiver<FeedEvent<PresenceRow>>;

    /// Change feed of chat messages for one event.
    fn subscribe_chat(&self, event_id: Uuid) -> broadcast::Receiver<FeedEvent<ChatMessage>>;

    /// Probe store connectivity.
    fn health_check(&self) -> BoxFuture<'static, BackendResult<()>>;
}
