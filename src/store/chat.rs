use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    backend::{DataBackend, error::BackendResult},
    model::chat::{ChatMessage, MessageKind},
    sync::FeedEvent,
};

/// Message reads and writes for event rooms.
///
/// Composition and persistence are split so senders can place an
/// optimistic entry in their timeline before the write confirms: the
/// composed message already carries its final id, and the eventual feed
/// echo replaces the optimistic entry instead of producing a second
/// bubble.
#[derive(Clone)]
pub struct ChatLog {
    backend: Arc<dyn DataBackend>,
}

impl ChatLog {
    /// Log backed by the given data backend.
    pub fn new(backend: Arc<dyn DataBackend>) -> Self {
        Self { backend }
    }

    /// Build a text message ready to send, stamped with the caller's best
    /// estimate of server time.
    pub fn compose_text(
        event_id: Uuid,
        user_id: Uuid,
        body: String,
        now: OffsetDateTime,
    ) -> ChatMessage {
        Self::compose(event_id, user_id, MessageKind::Text, body, None, now)
    }

    /// Build an energy gift ready to send.
    pub fn compose_energy(
        event_id: Uuid,
        user_id: Uuid,
        amount: u32,
        now: OffsetDateTime,
    ) -> ChatMessage {
        Self::compose(
            event_id,
            user_id,
            MessageKind::Energy,
            String::new(),
            Some(amount),
            now,
        )
    }

    fn compose(
        event_id: Uuid,
        user_id: Uuid,
        kind: MessageKind,
        body: String,
        amount: Option<u32>,
        now: OffsetDateTime,
    ) -> ChatMessage {
        let id = Uuid::new_v4();
        ChatMessage {
            id,
            event_id,
            user_id,
            kind,
            body,
            amount,
            created_at: now,
            client_id: Some(id),
        }
    }

    /// Persist a composed message.
    pub async fn send(&self, message: ChatMessage) -> BackendResult<()> {
        self.backend.insert_message(message).await
    }

    /// Newest `limit` messages in `(created_at, id)` order.
    pub async fn history(&self, event_id: Uuid, limit: usize) -> BackendResult<Vec<ChatMessage>> {
        self.backend.list_messages(event_id, limit).await
    }

    /// Incremental message feed for the event. Not gap-free; pair with
    /// periodic [`ChatLog::history`] resyncs.
    pub fn subscribe(&self, event_id: Uuid) -> broadcast::Receiver<FeedEvent<ChatMessage>> {
        self.backend.subscribe_chat(event_id)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::backend::memory::MemoryBackend;

    #[tokio::test]
    async fn sent_messages_echo_on_the_feed_with_the_composed_id() {
        let backend = MemoryBackend::new();
        let log = ChatLog::new(Arc::new(backend));
        let event_id = Uuid::new_v4();
        let mut feed = log.subscribe(event_id);

        let message = ChatLog::compose_text(
            event_id,
            Uuid::new_v4(),
            "hello".into(),
            datetime!(2026-03-01 18:00:00 UTC),
        );
        log.send(message.clone()).await.unwrap();

        let FeedEvent::Insert(echo) = feed.recv().await.unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(echo.id, message.id);
        assert_eq!(echo.client_id, Some(message.id));

        let history = log.history(event_id, 10).await.unwrap();
        assert_eq!(history, vec![message]);
    }

    #[tokio::test]
    async fn energy_gifts_carry_their_amount() {
        let backend = MemoryBackend::new();
        let log = ChatLog::new(Arc::new(backend));
        let event_id = Uuid::new_v4();

        let gift = ChatLog::compose_energy(
            event_id,
            Uuid::new_v4(),
            21,
            datetime!(2026-03-01 18:00:00 UTC),
        );
        log.send(gift.clone()).await.unwrap();

        let history = log.history(event_id, 10).await.unwrap();
        assert_eq!(history[0].kind, MessageKind::Energy);
        assert_eq!(history[0].amount, Some(21));
    }
}
