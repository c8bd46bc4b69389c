use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;

mod handlers;
mod routes;
mod state;

use common::config::Settings;
use common::db::{DbPool, PgTemplateStore};
use common::dictionary::AttributeDictionary;
use common::orchestrator::Orchestrator;
use common::target::DefaultConnector;
use common::telemetry;
use common::token::TokenRegistry;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Settings::load()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &config.observability.log_level,
        config.observability.tracing_endpoint.as_deref(),
    )?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Configuration loaded"
    );

    let db_pool = DbPool::new(&config.database).await?;
    db_pool.run_migrations().await?;
    tracing::info!("Database connection pool established");

    let metrics_handle = if config.observability.metrics_enabled {
        Some(telemetry::init_metrics()?)
    } else {
        None
    };

    // Token registry is complete before the first request is served
    let registry = TokenRegistry::with_standard_tokens(&config.composer.attributes);
    tracing::info!(registry = ?registry, "Token registry initialized");

    let orchestrator = Orchestrator::new(
        Arc::new(PgTemplateStore::new(db_pool.clone())),
        Arc::new(DefaultConnector::new(config.composer.connect_timeout_seconds)),
        Arc::new(registry),
        Arc::new(AttributeDictionary::new()),
        config.composer.attributes.dictionary_query.clone(),
    );

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let state = AppState::new(orchestrator, db_pool.clone(), config, metrics_handle);
    let app = routes::create_router(state);

    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    telemetry::shutdown_tracer();

    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
