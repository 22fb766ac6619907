/// Host-side transition planning for the shared run state.
pub mod run_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{
    backend::DataBackend,
    config::AppConfig,
    error::ServiceError,
    room::{controller::RoomHandle, prefs::JoinPrefs},
};

/// Shared handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Key identifying one viewer's session in one event room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomKey {
    /// Event whose room is open.
    pub event_id: Uuid,
    /// Viewer the session belongs to.
    pub user_id: Uuid,
}

/// Central application state storing the backend handle and open rooms.
pub struct AppState {
    backend: RwLock<Option<Arc<dyn DataBackend>>>,
    degraded: watch::Sender<bool>,
    rooms: DashMap<RoomKey, RoomHandle>,
    prefs: Arc<JoinPrefs>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be
    /// cloned cheaply.
    ///
    /// The application starts in degraded mode until a backend is
    /// installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            backend: RwLock::new(None),
            degraded: degraded_tx,
            rooms: DashMap::new(),
            prefs: Arc::new(JoinPrefs::new(config.default_auto_join)),
            config,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Shared join preference store.
    pub fn prefs(&self) -> Arc<JoinPrefs> {
        self.prefs.clone()
    }

    /// Obtain a handle to the current backend, if one is installed.
    pub async fn backend(&self) -> Option<Arc<dyn DataBackend>> {
        let guard = self.backend.read().await;
        guard.as_ref().cloned()
    }

    /// Backend handle or the degraded-mode error.
    pub async fn require_backend(&self) -> Result<Arc<dyn DataBackend>, ServiceError> {
        self.backend().await.ok_or(ServiceError::Degraded)
    }

    /// Install a backend implementation and leave degraded mode.
    pub async fn install_backend(&self, backend: Arc<dyn DataBackend>) {
        {
            let mut guard = self.backend.write().await;
            *guard = Some(backend);
        }
        self.update_degraded(false);
    }

    /// Remove the current backend and enter degraded mode.
    pub async fn clear_backend(&self) {
        {
            let mut guard = self.backend.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of open room sessions keyed by event and viewer.
    pub fn rooms(&self) -> &DashMap<RoomKey, RoomHandle> {
        &self.rooms
    }
}
