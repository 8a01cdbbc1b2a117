//! Library Lending Server
//!
//! Loads configuration, opens the store, and serves the REST API.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, Executor};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_server::{
    api,
    config::{AppConfig, LoggingConfig, StorageBackend},
    repository::Repository,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting Library Server v{}", env!("CARGO_PKG_VERSION"));

    let (repository, pool) = match config.database.backend {
        StorageBackend::Postgres => {
            let statement_timeout_ms = config.database.statement_timeout_ms;
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
                .after_connect(move |conn, _meta| {
                    Box::pin(async move {
                        if statement_timeout_ms > 0 {
                            conn.execute(
                                format!("SET statement_timeout = {}", statement_timeout_ms).as_str(),
                            )
                            .await?;
                        }
                        Ok(())
                    })
                })
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!("Database migrations completed");

            (Repository::postgres(pool.clone()), Some(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown");
            (Repository::in_memory(), None)
        }
    };

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState::new(config, repository);

    state
        .services
        .users
        .ensure_bootstrap_admin()
        .await
        .context("Failed to create bootstrap admin")?;

    let sweeper = state.services.lending.spawn_overdue_sweeper();

    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database pool closed");
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("library_server={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Initiating graceful shutdown...");
}
