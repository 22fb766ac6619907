//! Egregor room backend binary entrypoint wiring REST, SSE, and the data backend.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use egregor_back::{config::AppConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    spawn_backend(app_state.clone());
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the backend supervisor with the bundled in-memory store.
///
/// A managed-store deployment replaces this connector with one that
/// dials the real backend; the supervisor handles reconnects and
/// degraded-mode toggling either way.
#[cfg(feature = "memory-store")]
fn spawn_backend(app_state: egregor_back::state::SharedState) {
    use std::sync::Arc;

    use egregor_back::{
        backend::{DataBackend, memory::MemoryBackend},
        services::backend_supervisor,
    };

    let backend = Arc::new(MemoryBackend::new());
    tokio::spawn(backend_supervisor::run(app_state, move || {
        let backend = backend.clone();
        async move { Ok(backend as Arc<dyn DataBackend>) }
    }));
}

#[cfg(not(feature = "memory-store"))]
fn spawn_backend(_app_state: egregor_back::state::SharedState) {
    tracing::warn!("no backend feature enabled; serving in degraded mode");
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: egregor_back::state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
