//! MindLink Back binary entrypoint wiring REST, WebSocket, storage and the event relay.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use mindlink_back::{
    auth::SecurityConfig,
    config::AppConfig,
    dao::match_store::memory::InMemoryMatchStore,
    relay::{self, BINDING_PATTERN, EventPublisher, EventQueue, RelayPublisher, memory::InMemoryBroker},
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let security = SecurityConfig::from_env();
    let instance_id = resolve_instance_id();
    info!(%instance_id, "instance identity resolved");

    let (broker, queue) = connect_relay(&instance_id).await?;
    let (publisher, _publisher_task) = RelayPublisher::spawn(broker);

    let app_state = AppState::new(config, security, instance_id, publisher);

    tokio::spawn(relay::consumer::run(app_state.clone(), queue));
    start_storage(app_state.clone()).await;

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

/// Stable instance id from `MINDLINK_INSTANCE_ID`, or a fresh one per process.
fn resolve_instance_id() -> Uuid {
    match env::var("MINDLINK_INSTANCE_ID") {
        Ok(value) => match Uuid::parse_str(value.trim()) {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "invalid MINDLINK_INSTANCE_ID; generating one");
                Uuid::new_v4()
            }
        },
        Err(_) => Uuid::new_v4(),
    }
}

/// Connect the broker named by `REDIS_URL`, or fall back to the in-process exchange.
async fn connect_relay(
    instance_id: &Uuid,
) -> anyhow::Result<(Arc<dyn EventPublisher>, Arc<dyn EventQueue>)> {
    let queue_name = relay::queue_name_for(instance_id);

    #[cfg(feature = "redis-relay")]
    {
        if let Ok(url) = env::var("REDIS_URL") {
            use mindlink_back::relay::redis::{RedisStreamPublisher, RedisStreamQueue};

            let publisher = RedisStreamPublisher::connect(&url)
                .await
                .context("connecting relay publisher")?;
            let queue = RedisStreamQueue::open(&url, &queue_name, &instance_id.to_string(), BINDING_PATTERN)
                .await
                .context("opening relay queue")?;
            info!(queue = %queue_name, "event relay using Redis streams");
            return Ok((Arc::new(publisher), Arc::new(queue)));
        }
    }

    let broker = InMemoryBroker::new();
    let queue = broker.bind_queue(BINDING_PATTERN).await;
    info!(queue = %queue_name, "event relay running in-process");
    Ok((Arc::new(broker), Arc::new(queue)))
}

/// Install the in-memory store, or supervise MongoDB when `MONGO_URI` is set.
async fn start_storage(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        if let Ok(uri) = env::var("MONGO_URI") {
            use mindlink_back::{
                dao::{
                    match_store::{
                        MatchStore,
                        mongodb::{MongoConfig, MongoMatchStore},
                    },
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            let db_name = env::var("MONGO_DB").ok();
            tokio::spawn(storage_supervisor::run(state, move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
                    let store = MongoMatchStore::connect(config).await?;
                    Ok::<Arc<dyn MatchStore>, StorageError>(Arc::new(store))
                }
            }));
            return;
        }
    }

    warn!("MONGO_URI not set; match history is kept in memory only");
    state
        .install_match_store(Arc::new(InMemoryMatchStore::new()))
        .await;
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
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
