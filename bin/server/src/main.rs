mod config;
mod error;
mod handlers;
mod sse;
mod state;

use agent_runner_executor::ExecutorConfig;
use agent_runner_store::{InMemoryStore, PostgresStore, Store};
use agent_runner_worker::WorkerConfig;
use axum::routing::{get, post};
use axum::Router;
use config::ServerConfig;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("loaded configuration");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .expect("failed to connect to database");

            tracing::info!("running database migrations");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("failed to run migrations");

            Arc::new(PostgresStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (state is lost on restart)");
            Arc::new(InMemoryStore::new())
        }
    };

    let executor_config = ExecutorConfig::default();
    let worker_config = WorkerConfig {
        check_interval: Duration::from_secs(config.worker_check_interval),
        batch_size: config.worker_batch_size,
        ..WorkerConfig::default()
    };

    let app_state = AppState::new(
        store,
        config.ollama_base_url.clone(),
        Duration::from_secs(config.ollama_heartbeat_interval),
        executor_config,
        worker_config,
    );

    let worker_handle = if config.disable_worker {
        tracing::info!("background worker disabled; Runs only advance via /worker/process");
        None
    } else {
        let worker = app_state.worker.clone();
        Some(tokio::spawn(async move { worker.run_forever().await }))
    };

    let cors = build_cors_layer(&config.cors_origin_list());

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/projects", get(handlers::list_projects).post(handlers::create_project))
        .route("/runs", get(handlers::list_runs).post(handlers::create_run))
        .route("/runs/{id}", get(handlers::get_run))
        .route("/runs/{id}/pause", post(handlers::pause_run))
        .route("/runs/{id}/resume", post(handlers::resume_run))
        .route("/runs/{id}/stop", post(handlers::stop_run))
        .route("/runs/{id}/directive", post(handlers::append_directive))
        .route("/runs/{id}/events", get(handlers::list_events))
        .route("/runs/{id}/events/stream", get(sse::stream_events))
        .route("/worker/status", get(handlers::worker_status))
        .route("/worker/process", post(handlers::worker_process))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(addr = %config.bind_addr, "listening");

    let shutdown_signal = shutdown_signal(app_state.worker.shutdown_token());
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .expect("server error");

    if let Some(handle) = worker_handle {
        // `run_forever` waits out its own shutdown grace period once the
        // token is cancelled, so joining it here is enough to drain.
        let _ = handle.await;
    }
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new().allow_origin(AllowOrigin::list(parsed))
}

async fn shutdown_signal(worker_shutdown: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight runs");
    worker_shutdown.cancel();
}
