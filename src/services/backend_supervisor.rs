use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    backend::{DataBackend, error::BackendError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Connect to the data backend and keep the shared state in degraded mode
/// while it is unavailable.
///
/// Open rooms keep running through degradation: they freeze live data at
/// last-known values and continue deriving the local countdown until the
/// backend returns.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn DataBackend>, BackendError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(backend) => {
                state.install_backend(backend.clone()).await;
                info!("backend connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match backend.health_check().await {
                        Ok(()) => {
                            if state.is_degraded() {
                                info!("backend healthy again; leaving degraded mode");
                                state.update_degraded(false);
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "backend health check failed; entering degraded mode");
                            state.clear_backend().await;
                            break;
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "backend connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
