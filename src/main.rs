//! PlayDesk Back binary entrypoint wiring REST, SSE, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playdesk_back::{
    config::AppConfig,
    dao::{station_store::MemoryStationStore, subscription_store::MemorySubscriptionStore},
    routes,
    services::plan_service,
    state::{AppState, SharedState, Stores},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());
    start_storage(app_state.clone()).await?;

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

/// Supervise MongoDB when `MONGO_URI` is set, otherwise run on in-memory stores.
async fn start_storage(state: SharedState) -> anyhow::Result<()> {
    #[cfg(feature = "mongo-store")]
    if env::var_os("MONGO_URI").is_some() {
        use playdesk_back::{
            dao::{
                mongodb::{MongoBackend, MongoConfig},
                storage::StorageError,
            },
            services::storage_supervisor,
        };

        tokio::spawn(storage_supervisor::run(state, || async {
            let config = MongoConfig::from_env().await?;
            let backend = MongoBackend::connect(config).await?;
            Ok::<_, StorageError>(Stores {
                stations: Arc::new(backend.clone()),
                subscriptions: Arc::new(backend),
                backend: "mongodb",
            })
        }));
        return Ok(());
    }

    warn!("MONGO_URI not set; data lives in memory and is lost on restart");
    let stores = Stores {
        stations: Arc::new(MemoryStationStore::new()),
        subscriptions: Arc::new(MemorySubscriptionStore::new()),
        backend: "memory",
    };
    plan_service::seed_plans(&stores.subscriptions, &state.config().plans)
        .await
        .context("seeding plans")?;
    state.install_stores(stores).await;
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

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
