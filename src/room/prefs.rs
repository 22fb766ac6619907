use dashmap::DashMap;
use uuid::Uuid;

/// Remembered join choices consulted when a room opens.
///
/// Auto-join fires only when both layers agree: the user's global
/// auto-join preference AND the per-event sticky preference left behind by
/// their last manual join. Manual join/leave always override and rewrite
/// the sticky layer.
pub struct JoinPrefs {
    default_auto_join: bool,
    auto_join: DashMap<Uuid, bool>,
    sticky: DashMap<(Uuid, Uuid), bool>,
}

impl JoinPrefs {
    /// Preference store with the given global default.
    pub fn new(default_auto_join: bool) -> Self {
        Self {
            default_auto_join,
            auto_join: DashMap::new(),
            sticky: DashMap::new(),
        }
    }

    /// Whether the user has auto-join enabled.
    pub fn auto_join_enabled(&self, user_id: Uuid) -> bool {
        self.auto_join
            .get(&user_id)
            .map(|entry| *entry)
            .unwrap_or(self.default_auto_join)
    }

    /// Set the user's global auto-join preference.
    pub fn set_auto_join(&self, user_id: Uuid, enabled: bool) {
        self.auto_join.insert(user_id, enabled);
    }

    /// Whether the user chose to stick to this event's room.
    pub fn sticky(&self, user_id: Uuid, event_id: Uuid) -> bool {
        self.sticky
            .get(&(user_id, event_id))
            .map(|entry| *entry)
            .unwrap_or(false)
    }

    /// Remember a manual join for this event.
    pub fn set_sticky(&self, user_id: Uuid, event_id: Uuid) {
        self.sticky.insert((user_id, event_id), true);
    }

    /// Forget the sticky choice after an explicit leave.
    pub fn clear_sticky(&self, user_id: Uuid, event_id: Uuid) {
        self.sticky.remove(&(user_id, event_id));
    }

    /// Whether a freshly opened room should join automatically.
    pub fn should_auto_join(&self, user_id: Uuid, event_id: Uuid) -> bool {
        self.auto_join_enabled(user_id) && self.sticky(user_id, event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_join_requires_both_layers() {
        let prefs = JoinPrefs::new(false);
        let user = Uuid::new_v4();
        let event = Uuid::new_v4();

        assert!(!prefs.should_auto_join(user, event));

        prefs.set_sticky(user, event);
        assert!(!prefs.should_auto_join(user, event), "global still off");

        prefs.set_auto_join(user, true);
        assert!(prefs.should_auto_join(user, event));

        prefs.clear_sticky(user, event);
        assert!(!prefs.should_auto_join(user, event));
    }

    #[test]
    fn global_default_applies_until_overridden() {
        let prefs = JoinPrefs::new(true);
        let user = Uuid::new_v4();
        assert!(prefs.auto_join_enabled(user));
        prefs.set_auto_join(user, false);
        assert!(!prefs.auto_join_enabled(user));
    }
}
