/// Per-viewer room session actor and its gateway handle.
pub mod controller;
/// Pure countdown and progress derivation.
pub mod countdown;
/// Remembered join preferences.
pub mod prefs;
/// Chat ordering, dedupe, and unread accounting.
pub mod timeline;
