//! relay-gateway server entry point.
//!
//! Starts the connection hub and the Axum HTTP server with REST and
//! WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use relay_gateway::app_state::AppState;
use relay_gateway::config::{DEV_JWT_SECRET, LogFormat, RelayConfig};
use relay_gateway::hub::Hub;
use relay_gateway::persistence::{PostgresUserStore, UserRepository};
use relay_gateway::server::{build_app, shutdown_signal};
use relay_gateway::service::{TokenAuthority, UserService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, "starting relay-gateway");
    if config.jwt_secret == DEV_JWT_SECRET {
        tracing::warn!("JWT_SECRET not set; using an insecure development secret");
    }

    let repository = if config.persistence_enabled {
        let store = PostgresUserStore::connect(&config)
            .await
            .context("connecting to database")?;
        UserRepository::Postgres(store)
    } else {
        tracing::warn!("persistence disabled, users are kept in memory");
        UserRepository::in_memory()
    };
    let tokens = TokenAuthority::new(&config.jwt_secret, config.token_ttl_secs);
    let users = Arc::new(UserService::new(repository, tokens));

    let (hub, hub_task) = Hub::spawn(config.hub.clone());
    let app = build_app(AppState {
        users,
        hub: hub.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    // Close every WebSocket before the server drains.
    let shutdown_hub = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            if let Err(e) = shutdown_hub.shutdown().await {
                tracing::warn!(error = %e, "hub already stopped");
            }
        })
        .await
        .context("server error")?;

    drop(hub);
    if let Err(e) = hub_task.await {
        tracing::error!(error = %e, "hub task failed");
    }
    tracing::info!("relay-gateway stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
