use uuid::Uuid;

use crate::model::chat::ChatMessage;

/// Stably-ordered, duplicate-free message list for one room.
///
/// Maintained from three inputs: optimistic local sends, the real-time
/// insert feed, and periodic history resyncs. Order is `(created_at, id)`
/// ascending; a message already placed never moves except to make room
/// for a late-arriving earlier insert, and that correction touches only
/// the insertion point, never the whole list.
#[derive(Debug)]
pub struct ChatTimeline {
    viewer: Uuid,
    messages: Vec<ChatMessage>,
    unread: usize,
    at_bottom: bool,
}

impl ChatTimeline {
    /// Empty timeline for the given viewer. The viewer starts at the
    /// bottom of the transcript.
    pub fn new(viewer: Uuid) -> Self {
        Self {
            viewer,
            messages: Vec::new(),
            unread: 0,
            at_bottom: true,
        }
    }

    /// Messages in render order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages that arrived while the viewer was scrolled up.
    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Whether the viewer currently follows the bottom of the transcript.
    pub fn is_at_bottom(&self) -> bool {
        self.at_bottom
    }

    /// Record the viewer's scroll position. Returning to the bottom marks
    /// everything read; while scrolled up, incoming messages accumulate in
    /// the unread badge instead of yanking the viewport.
    pub fn set_at_bottom(&mut self, at_bottom: bool) {
        self.at_bottom = at_bottom;
        if at_bottom {
            self.unread = 0;
        }
    }

    /// Place the viewer's own optimistic entry before its write confirms.
    /// The eventual feed echo replaces it by id.
    pub fn insert_local(&mut self, message: ChatMessage) {
        self.merge(message);
    }

    /// Apply one message from the feed or a resync. Returns whether the
    /// list changed.
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        let foreign = message.user_id != self.viewer;
        match self.merge(message) {
            Merge::Added => {
                if foreign && !self.at_bottom {
                    self.unread += 1;
                }
                true
            }
            Merge::Replaced => true,
            Merge::Unchanged => false,
        }
    }

    /// Merge an authoritative history snapshot, healing missed feed
    /// inserts. Optimistic entries whose writes are still in flight are
    /// kept even when the snapshot does not contain them yet. Returns
    /// whether the list changed.
    pub fn reconcile(&mut self, snapshot: Vec<ChatMessage>) -> bool {
        let mut changed = false;
        for message in snapshot {
            changed |= self.insert(message);
        }
        changed
    }

    fn merge(&mut self, message: ChatMessage) -> Merge {
        let existing = self.messages.iter().position(|held| {
            held.id == message.id || message.client_id.is_some_and(|cid| cid == held.id)
        });

        match existing {
            Some(index) => {
                if self.messages[index] == message {
                    return Merge::Unchanged;
                }
                // Redelivery or edit: replace in place, then fix ordering
                // locally if the timestamp moved.
                self.messages[index] = message;
                if !self.ordered_around(index) {
                    let moved = self.messages.remove(index);
                    self.place(moved);
                }
                Merge::Replaced
            }
            None => {
                self.place(message);
                Merge::Added
            }
        }
    }

    /// Insert by bounded backward scan from the end; the common case (new
    /// message, newest timestamp) touches nothing else.
    fn place(&mut self, message: ChatMessage) {
        let key = message.order_key();
        let at = self
            .messages
            .iter()
            .rposition(|held| held.order_key() <= key)
            .map(|index| index + 1)
            .unwrap_or(0);
        self.messages.insert(at, message);
    }

    fn ordered_around(&self, index: usize) -> bool {
        let key = self.messages[index].order_key();
        let before_ok = index == 0 || self.messages[index - 1].order_key() <= key;
        let after_ok =
            index + 1 >= self.messages.len() || key <= self.messages[index + 1].order_key();
        before_ok && after_ok
    }
}

enum Merge {
    Added,
    Replaced,
    Unchanged,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::model::chat::MessageKind;

    const T0: time::OffsetDateTime = datetime!(2026-03-01 18:00:00 UTC);

    fn message(id: Uuid, user_id: Uuid, body: &str, offset_sec: i64) -> ChatMessage {
        ChatMessage {
            id,
            event_id: Uuid::nil(),
            user_id,
            kind: MessageKind::Text,
            body: body.into(),
            amount: None,
            created_at: T0 + time::Duration::seconds(offset_sec),
            client_id: None,
        }
    }

    #[test]
    fn optimistic_echo_yields_exactly_one_bubble() {
        let me = Uuid::new_v4();
        let mut timeline = ChatTimeline::new(me);

        let local_id = Uuid::new_v4();
        let mut optimistic = message(local_id, me, "hi all", 0);
        optimistic.client_id = Some(local_id);
        timeline.insert_local(optimistic);

        // The echo carries the same row id (and client id); server time
        // may differ slightly from the optimistic stamp.
        let mut echo = message(local_id, me, "hi all", 1);
        echo.client_id = Some(local_id);
        timeline.insert(echo);

        assert_eq!(timeline.messages().len(), 1);
        assert_eq!(timeline.messages()[0].created_at, T0 + time::Duration::seconds(1));
    }

    #[test]
    fn echo_with_server_assigned_id_dedupes_via_client_id() {
        let me = Uuid::new_v4();
        let mut timeline = ChatTimeline::new(me);

        let local_id = Uuid::new_v4();
        let mut optimistic = message(local_id, me, "hi", 0);
        optimistic.client_id = Some(local_id);
        timeline.insert_local(optimistic);

        let mut echo = message(Uuid::new_v4(), me, "hi", 0);
        echo.client_id = Some(local_id);
        timeline.insert(echo.clone());

        assert_eq!(timeline.messages().len(), 1);
        assert_eq!(timeline.messages()[0].id, echo.id);
    }

    #[test]
    fn equal_timestamps_order_by_id() {
        let mut timeline = ChatTimeline::new(Uuid::new_v4());
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);

        timeline.insert(message(high, Uuid::new_v4(), "second", 5));
        timeline.insert(message(low, Uuid::new_v4(), "first", 5));

        let bodies: Vec<_> = timeline.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["first", "second"]);
    }

    #[test]
    fn late_insert_lands_in_place_without_disturbing_neighbors() {
        let mut timeline = ChatTimeline::new(Uuid::new_v4());
        timeline.insert(message(Uuid::new_v4(), Uuid::new_v4(), "a", 10));
        timeline.insert(message(Uuid::new_v4(), Uuid::new_v4(), "c", 30));
        timeline.insert(message(Uuid::new_v4(), Uuid::new_v4(), "b", 20));

        let bodies: Vec<_> = timeline.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["a", "b", "c"]);
    }

    #[test]
    fn unread_accumulates_only_while_scrolled_up() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut timeline = ChatTimeline::new(me);

        timeline.insert(message(Uuid::new_v4(), other, "seen", 1));
        assert_eq!(timeline.unread_count(), 0);

        timeline.set_at_bottom(false);
        timeline.insert(message(Uuid::new_v4(), other, "missed", 2));
        timeline.insert(message(Uuid::new_v4(), me, "mine", 3));
        assert_eq!(timeline.unread_count(), 1);

        // Redelivery of an already-held row must not bump the badge.
        let held = timeline.messages()[1].clone();
        timeline.insert(held);
        assert_eq!(timeline.unread_count(), 1);

        timeline.set_at_bottom(true);
        assert_eq!(timeline.unread_count(), 0);
    }

    #[test]
    fn reconcile_heals_a_missed_insert_and_keeps_pending_sends() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut timeline = ChatTimeline::new(me);

        let pending_id = Uuid::new_v4();
        let mut pending = message(pending_id, me, "in flight", 50);
        pending.client_id = Some(pending_id);
        timeline.insert_local(pending);

        let missed = message(Uuid::new_v4(), other, "dropped by feed", 10);
        let changed = timeline.reconcile(vec![missed.clone()]);
        assert!(changed);

        let bodies: Vec<_> = timeline.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["dropped by feed", "in flight"]);

        assert!(!timeline.reconcile(vec![missed]));
    }
}
