//! Decision Drill Back binary entrypoint wiring REST, WebSocket, and SQLite layers.

use std::{env, fs, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use decision_drill_back::{
    config::AppConfig,
    dao::{DecisionStore, sqlite::SqliteStore},
    routes,
    scoring::KeywordOverlapScorer,
    services::cache_persistence,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::load());

    if let Some(parent) = config.database_path.parent() {
        fs::create_dir_all(parent).context("creating data directory")?;
    }
    let store = Arc::new(
        SqliteStore::open(&config.database_path).context("opening sqlite database")?,
    );

    // Seed the scenario set on first boot; existing reference data wins.
    if store.list_scenarios().await?.is_empty() {
        let seed = config.scenario_seed();
        info!(count = seed.len(), "seeding scenarios");
        store.replace_scenarios(seed).await?;
    }

    let state = AppState::bootstrap(config, store, Arc::new(KeywordOverlapScorer)).await?;
    tokio::spawn(cache_persistence::run(state.clone()));

    let app = build_router(state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    // One last synchronous write so a clean stop never loses cache state.
    cache_persistence::flush(&state);
    info!("shutdown complete");

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
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
