/// Chat history reads and message writes.
pub mod chat;
/// Presence join/heartbeat/leave lifecycle.
pub mod presence;
/// Authoritative run-state reads, initialization, and transitions.
pub mod run_state;
