//! Application-level configuration loading, including the room timing knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "EGREGOR_BACK_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Timer cadences for every room session.
    pub timing: RoomTiming,
    /// How many messages a room loads on open and on each chat resync.
    pub chat_history_limit: usize,
    /// Global auto-join default for users who never set the preference.
    pub default_auto_join: bool,
}

/// Cadences of the per-room timers.
///
/// The active window must stay several multiples of the heartbeat
/// interval so a couple of missed beats do not flap a viewer between
/// active and recent.
#[derive(Debug, Clone, Copy)]
pub struct RoomTiming {
    /// Display recomputation tick; read-only, purely for smoothness.
    pub display_tick: Duration,
    /// Liveness ping cadence while joined and foregrounded.
    pub heartbeat_interval: Duration,
    /// Age after the last heartbeat during which a user counts as active.
    pub active_window: Duration,
    /// Full presence snapshot refetch cadence.
    pub presence_resync: Duration,
    /// Chat history refetch cadence.
    pub chat_resync: Duration,
    /// Run-state refetch cadence (also refreshes the server-clock anchor).
    pub run_state_resync: Duration,
    /// Upper bound on a host transition's backend write.
    pub transition_timeout: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded room configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize, Default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    display_tick_ms: Option<u64>,
    #[serde(default)]
    heartbeat_interval_sec: Option<u64>,
    #[serde(default)]
    active_window_sec: Option<u64>,
    #[serde(default)]
    presence_resync_sec: Option<u64>,
    #[serde(default)]
    chat_resync_sec: Option<u64>,
    #[serde(default)]
    run_state_resync_sec: Option<u64>,
    #[serde(default)]
    transition_timeout_sec: Option<u64>,
    #[serde(default)]
    chat_history_limit: Option<usize>,
    #[serde(default)]
    default_auto_join: Option<bool>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            timing: RoomTiming {
                display_tick: Duration::from_millis(raw.display_tick_ms.unwrap_or(500)),
                heartbeat_interval: Duration::from_secs(
                    raw.heartbeat_interval_sec.unwrap_or(10),
                ),
                active_window: Duration::from_secs(raw.active_window_sec.unwrap_or(90)),
                presence_resync: Duration::from_secs(raw.presence_resync_sec.unwrap_or(60)),
                chat_resync: Duration::from_secs(raw.chat_resync_sec.unwrap_or(60)),
                run_state_resync: Duration::from_secs(raw.run_state_resync_sec.unwrap_or(60)),
                transition_timeout: Duration::from_secs(raw.transition_timeout_sec.unwrap_or(5)),
            },
            chat_history_limit: raw.chat_history_limit.unwrap_or(200),
            default_auto_join: raw.default_auto_join.unwrap_or(false),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_the_window_clear_of_missed_beats() {
        let config = AppConfig::default();
        let timing = config.timing;
        assert!(timing.active_window >= timing.heartbeat_interval * 3);
        assert_eq!(timing.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(timing.active_window, Duration::from_secs(90));
    }

    #[test]
    fn partial_config_files_fill_in_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{"active_window_sec": 120}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.timing.active_window, Duration::from_secs(120));
        assert_eq!(config.timing.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.chat_history_limit, 200);
    }
}
