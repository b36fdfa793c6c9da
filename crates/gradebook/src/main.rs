use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gradebook::config::ServerConfig;
use gradebook::portal::PortalClient;
use gradebook::server::create_router;
use gradebook::types::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gradebook=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ServerConfig::from_env().context("Failed to load configuration")?;
    let scales = config.load_scales().context("Failed to load GPA scales")?;
    info!(
        scales = ?scales.names().collect::<Vec<_>>(),
        default_scale = %config.portal.default_scale,
        "GPA scales loaded"
    );

    let client = PortalClient::new(config.portal.clone(), scales)
        .context("Failed to create portal client")?;
    let app_state = Arc::new(AppState::new(client));
    let app = create_router(app_state);

    let address = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!("Starting gradebook server on {}", address);
    if let Some(portal) = &config.portal.base_url {
        info!("Default portal: {}", portal);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        // Keep serving rather than exiting immediately
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
