//! Resynchronizing-subscription support.
//!
//! Every live collection in the room rides the same dual path: a change
//! feed applied incrementally by key, healed by a periodic full snapshot
//! fetch. [`SyncedMap`] implements the keyed half once so presence and
//! chat do not each grow their own merge logic; correctness degrades to
//! "eventually consistent within one resync interval", never to
//! "permanently wrong".

use std::hash::Hash;

use indexmap::IndexMap;

/// Key extraction for rows merged by a resynchronizing feed.
pub trait Keyed {
    /// Identity under which rows replace each other.
    type Key: Eq + Hash + Clone;

    /// Key of this row.
    fn key(&self) -> Self::Key;
}

/// One change delivered by a table's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent<T> {
    /// A new row appeared.
    Insert(T),
    /// An existing row was rewritten.
    Update(T),
    /// A row was removed; carries its last known value.
    Delete(T),
}

/// Keyed row set maintained from a change feed plus periodic snapshots.
#[derive(Debug, Clone)]
pub struct SyncedMap<T: Keyed> {
    rows: IndexMap<T::Key, T>,
}

impl<T: Keyed> Default for SyncedMap<T> {
    fn default() -> Self {
        Self {
            rows: IndexMap::new(),
        }
    }
}

impl<T: Keyed + Clone + PartialEq> SyncedMap<T> {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one incremental feed event. Returns whether anything changed.
    ///
    /// Inserts and updates are the same operation on purpose: feeds can
    /// redeliver, reorder across reconnects, or surface an update for a
    /// row the consumer never saw inserted.
    pub fn apply(&mut self, event: FeedEvent<T>) -> bool {
        match event {
            FeedEvent::Insert(row) | FeedEvent::Update(row) => {
                let key = row.key();
                match self.rows.get(&key) {
                    Some(existing) if *existing == row => false,
                    _ => {
                        self.rows.insert(key, row);
                        true
                    }
                }
            }
            FeedEvent::Delete(row) => self.rows.shift_remove(&row.key()).is_some(),
        }
    }

    /// Replace the whole set from an authoritative snapshot, healing any
    /// missed feed events. Returns whether anything changed.
    pub fn reconcile(&mut self, snapshot: impl IntoIterator<Item = T>) -> bool {
        let next: IndexMap<T::Key, T> = snapshot.into_iter().map(|row| (row.key(), row)).collect();
        if next == self.rows {
            return false;
        }
        self.rows = next;
        true
    }

    /// Current row for a key.
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.rows.get(key)
    }

    /// Iterate rows in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    /// Number of rows currently held.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Row {
        id: u32,
        value: &'static str,
    }

    impl Keyed for Row {
        type Key = u32;

        fn key(&self) -> u32 {
            self.id
        }
    }

    #[test]
    fn insert_update_delete_roundtrip() {
        let mut set = SyncedMap::new();
        assert!(set.apply(FeedEvent::Insert(Row { id: 1, value: "a" })));
        assert!(set.apply(FeedEvent::Update(Row { id: 1, value: "b" })));
        assert_eq!(set.get(&1).unwrap().value, "b");
        assert!(set.apply(FeedEvent::Delete(Row { id: 1, value: "b" })));
        assert!(set.is_empty());
    }

    #[test]
    fn redelivered_event_is_a_noop() {
        let mut set = SyncedMap::new();
        let row = Row { id: 7, value: "x" };
        assert!(set.apply(FeedEvent::Insert(row.clone())));
        assert!(!set.apply(FeedEvent::Insert(row.clone())));
        assert!(!set.apply(FeedEvent::Update(row)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn reconcile_heals_a_missed_insert_and_a_missed_delete() {
        let mut set = SyncedMap::new();
        set.apply(FeedEvent::Insert(Row { id: 1, value: "kept" }));
        set.apply(FeedEvent::Insert(Row { id: 2, value: "gone" }));

        // The feed dropped an insert of row 3 and the delete of row 2; the
        // snapshot is the truth.
        let changed = set.reconcile([
            Row { id: 1, value: "kept" },
            Row { id: 3, value: "new" },
        ]);
        assert!(changed);
        assert_eq!(set.len(), 2);
        assert!(set.get(&2).is_none());
        assert_eq!(set.get(&3).unwrap().value, "new");
    }

    #[test]
    fn reconcile_with_identical_snapshot_reports_no_change() {
        let mut set = SyncedMap::new();
        set.apply(FeedEvent::Insert(Row { id: 1, value: "a" }));
        assert!(!set.reconcile([Row { id: 1, value: "a" }]));
    }

    #[test]
    fn delete_for_unknown_key_is_a_noop() {
        let mut set: SyncedMap<Row> = SyncedMap::new();
        assert!(!set.apply(FeedEvent::Delete(Row { id: 9, value: "" })));
    }
}
