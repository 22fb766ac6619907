/// Chat message rows and ordering keys.
pub mod chat;
/// Event records consumed read-only from the backing store.
pub mod event;
/// Presence rows and the active/recent partition.
pub mod presence;
/// Run-state document, mode enum, and the defensive normalizer.
pub mod run_state;
/// Guided script metadata and timing helpers.
pub mod script;
