use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    backend::{DataBackend, error::BackendResult},
    model::{chat::ChatMessage, event::EventRecord, presence::PresenceRow},
    sync::FeedEvent,
};

/// Capacity of each per-event feed channel. Lagged subscribers drop
/// events and heal on their next resync, so a small buffer is enough.
const FEED_CAPACITY: usize = 64;

/// In-memory [`DataBackend`] holding every table in process.
///
/// Used for local development and the test suite. Cloning is cheap; all
/// clones share the same tables and feed channels, so concurrent room
/// sessions observe each other exactly as they would through a managed
/// store.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

struct Inner {
    events: DashMap<Uuid, EventRecord>,
    scripts: DashMap<Uuid, Value>,
    run_states: DashMap<Uuid, Value>,
    presence: DashMap<(Uuid, Uuid), PresenceRow>,
    messages: DashMap<Uuid, Vec<ChatMessage>>,
    run_state_feeds: DashMap<Uuid, broadcast::Sender<Value>>,
    presence_feeds: DashMap<Uuid, broadcast::Sender<FeedEvent<PresenceRow>>>,
    chat_feeds: DashMap<Uuid, broadcast::Sender<FeedEvent<ChatMessage>>>,
    clock: ClockSource,
}

/// Where the backend reads "server time" from.
enum ClockSource {
    /// Wall clock of the process.
    System,
    /// Unix seconds driven by a [`ManualClock`] handle.
    Manual(Arc<AtomicI64>),
}

impl ClockSource {
    fn now(&self) -> OffsetDateTime {
        match self {
            ClockSource::System => OffsetDateTime::now_utc(),
            ClockSource::Manual(seconds) => {
                OffsetDateTime::from_unix_timestamp(seconds.load(Ordering::SeqCst))
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH)
            }
        }
    }
}

/// Handle driving a [`MemoryBackend`]'s manual clock.
///
/// Only produced by [`MemoryBackend::with_manual_clock`]; lets tests move
/// server time without sleeping.
#[derive(Clone)]
pub struct ManualClock {
    seconds: Arc<AtomicI64>,
}

impl ManualClock {
    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        self.seconds
            .fetch_add(delta.as_secs() as i64, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, now: OffsetDateTime) {
        self.seconds.store(now.unix_timestamp(), Ordering::SeqCst);
    }

    /// Current reading.
    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.seconds.load(Ordering::SeqCst))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

impl MemoryBackend {
    /// Backend stamping rows from the process wall clock.
    pub fn new() -> Self {
        Self::with_clock(ClockSource::System)
    }

    /// Backend with a test-driven clock starting at `start`.
    pub fn with_manual_clock(start: OffsetDateTime) -> (Self, ManualClock) {
        let seconds = Arc::new(AtomicI64::new(start.unix_timestamp()));
        let clock = ManualClock {
            seconds: seconds.clone(),
        };
        (Self::with_clock(ClockSource::Manual(seconds)), clock)
    }

    fn with_clock(clock: ClockSource) -> Self {
        Self {
            inner: Arc::new(Inner {
                events: DashMap::new(),
                scripts: DashMap::new(),
                run_states: DashMap::new(),
                presence: DashMap::new(),
                messages: DashMap::new(),
                run_state_feeds: DashMap::new(),
                presence_feeds: DashMap::new(),
                chat_feeds: DashMap::new(),
                clock,
            }),
        }
    }

    /// Seed an event row. Events are created by the wider product; rooms
    /// only read them.
    pub fn insert_event(&self, event: EventRecord) {
        self.inner.events.insert(event.id, event);
    }

    /// Seed a script document as it would be stored.
    pub fn insert_script(&self, script_id: Uuid, document: Value) {
        self.inner.scripts.insert(script_id, document);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn emit_run_state(&self, event_id: Uuid, state: &Value) {
        if let Some(sender) = self.run_state_feeds.get(&event_id) {
            let _ = sender.send(state.clone());
        }
    }

    fn emit_presence(&self, event_id: Uuid, event: FeedEvent<PresenceRow>) {
        if let Some(sender) = self.presence_feeds.get(&event_id) {
            let _ = sender.send(event);
        }
    }

    fn emit_chat(&self, event_id: Uuid, event: FeedEvent<ChatMessage>) {
        if let Some(sender) = self.chat_feeds.get(&event_id) {
            let _ = sender.send(event);
        }
    }
}

impl DataBackend for MemoryBackend {
    fn server_time(&self) -> BoxFuture<'static, BackendResult<OffsetDateTime>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.clock.now()) })
    }

    fn fetch_event(
        &self,
        event_id: Uuid,
    ) -> BoxFuture<'static, BackendResult<Option<EventRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.events.get(&event_id).map(|entry| entry.clone())) })
    }

    fn fetch_script(&self, script_id: Uuid) -> BoxFuture<'static, BackendResult<Option<Value>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.scripts.get(&script_id).map(|entry| entry.clone())) })
    }

    fn fetch_run_state(&self, event_id: Uuid) -> BoxFuture<'static, BackendResult<Option<Value>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.run_states.get(&event_id).map(|entry| entry.clone())) })
    }

    fn init_run_state(
        &self,
        event_id: Uuid,
        initial: Value,
    ) -> BoxFuture<'static, BackendResult<Value>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            // entry() holds the shard lock across the check and the
            // insert, which is what makes concurrent first-open safe.
            let mut created = false;
            let stored = inner
                .run_states
                .entry(event_id)
                .or_insert_with(|| {
                    created = true;
                    initial
                })
                .clone();
            if created {
                inner.emit_run_state(event_id, &stored);
            }
            Ok(stored)
        })
    }

    fn put_run_state(
        &self,
        event_id: Uuid,
        state: Value,
    ) -> BoxFuture<'static, BackendResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.run_states.insert(event_id, state.clone());
            inner.emit_run_state(event_id, &state);
            Ok(())
        })
    }

    fn fetch_presence(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, BackendResult<Option<PresenceRow>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .presence
                .get(&(event_id, user_id))
                .map(|entry| entry.clone()))
        })
    }

    fn upsert_presence(&self, row: PresenceRow) -> BoxFuture<'static, BackendResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let event_id = row.event_id;
            let previous = inner.presence.insert((row.event_id, row.user_id), row.clone());
            let event = match previous {
                Some(_) => FeedEvent::Update(row),
                None => FeedEvent::Insert(row),
            };
            inner.emit_presence(event_id, event);
            Ok(())
        })
    }

    fn delete_presence(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, BackendResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if let Some((_, row)) = inner.presence.remove(&(event_id, user_id)) {
                inner.emit_presence(event_id, FeedEvent::Delete(row));
            }
            Ok(())
        })
    }

    fn list_presence(
        &self,
        event_id: Uuid,
    ) -> BoxFuture<'static, BackendResult<Vec<PresenceRow>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .presence
                .iter()
                .filter(|entry| entry.key().0 == event_id)
                .map(|entry| entry.value().clone())
                .collect())
        })
    }

    fn insert_message(&self, message: ChatMessage) -> BoxFuture<'static, BackendResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let event_id = message.event_id;
            inner
                .messages
                .entry(event_id)
                .or_default()
                .push(message.clone());
            inner.emit_chat(event_id, FeedEvent::Insert(message));
            Ok(())
        })
    }

    fn list_messages(
        &self,
        event_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, BackendResult<Vec<ChatMessage>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut rows = inner
                .messages
                .get(&event_id)
                .map(|entry| entry.clone())
                .unwrap_or_default();
            rows.sort_by_key(ChatMessage::order_key);
            if rows.len() > limit {
                rows.drain(..rows.len() - limit);
            }
            Ok(rows)
        })
    }

    fn subscribe_run_state(&self, event_id: Uuid) -> broadcast::Receiver<Value> {
        self.inner
            .run_state_feeds
            .entry(event_id)
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe()
    }

    fn subscribe_presence(&self, event_id: Uuid) -> broadcast::Receiver<FeedEvent<PresenceRow>> {
        self.inner
            .presence_feeds
            .entry(event_id)
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe()
    }

    fn subscribe_chat(&self, event_id: Uuid) -> broadcast::Receiver<FeedEvent<ChatMessage>> {
        self.inner
            .chat_feeds
            .entry(event_id)
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe()
    }

    fn health_check(&self) -> BoxFuture<'static, BackendResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::model::chat::MessageKind;

    #[tokio::test]
    async fn init_run_state_is_first_writer_wins() {
        let backend = MemoryBackend::new();
        let event_id = Uuid::new_v4();

        let first = backend
            .init_run_state(event_id, serde_json::json!({"marker": 1}))
            .await
            .unwrap();
        let second = backend
            .init_run_state(event_id, serde_json::json!({"marker": 2}))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first["marker"], 1);
    }

    #[tokio::test]
    async fn presence_feed_distinguishes_insert_update_delete() {
        let backend = MemoryBackend::new();
        let event_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let mut feed = backend.subscribe_presence(event_id);

        let now = datetime!(2026-03-01 18:00:00 UTC);
        let row = PresenceRow {
            event_id,
            user_id,
            joined_at: now,
            last_seen_at: now,
        };

        backend.upsert_presence(row.clone()).await.unwrap();
        backend.upsert_presence(row.clone()).await.unwrap();
        backend.delete_presence(event_id, user_id).await.unwrap();

        assert_eq!(feed.recv().await.unwrap(), FeedEvent::Insert(row.clone()));
        assert_eq!(feed.recv().await.unwrap(), FeedEvent::Update(row.clone()));
        assert_eq!(feed.recv().await.unwrap(), FeedEvent::Delete(row));
    }

    #[tokio::test]
    async fn list_messages_orders_and_truncates() {
        let backend = MemoryBackend::new();
        let event_id = Uuid::new_v4();
        let base = datetime!(2026-03-01 18:00:00 UTC);

        for offset in [3i64, 1, 2] {
            let message = ChatMessage {
                id: Uuid::new_v4(),
                event_id,
                user_id: Uuid::new_v4(),
                kind: MessageKind::Text,
                body: format!("m{offset}"),
                amount: None,
                created_at: base + time::Duration::seconds(offset),
                client_id: None,
            };
            backend.insert_message(message).await.unwrap();
        }

        let rows = backend.list_messages(event_id, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].body, "m2");
        assert_eq!(rows[1].body, "m3");
    }

    #[tokio::test]
    async fn manual_clock_drives_server_time() {
        let start = datetime!(2026-03-01 18:00:00 UTC);
        let (backend, clock) = MemoryBackend::with_manual_clock(start);

        assert_eq!(backend.server_time().await.unwrap(), start);
        clock.advance(Duration::from_secs(90));
        assert_eq!(
            backend.server_time().await.unwrap(),
            start + time::Duration::seconds(90)
        );
    }
}
