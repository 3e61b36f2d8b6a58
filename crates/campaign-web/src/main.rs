//! HTTP server for the SMS survey campaign pipeline.
//!
//! Exposes contact upload, invitation generation and dispatch, provider
//! webhooks and a live event stream per operator.

mod auth;
mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use campaign::{DeliveryConfig, DeliveryService, Ingestor, OperatorEvent};
use database::Database;
use fanout::Registry;
use sms_gateway::{ProviderConfig, SmsClient};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(addr = %config.addr, operators = config.operators.len(), "Starting campaign server");

    // Connect to database
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    // SMS provider, reporting status changes back to us
    let mut provider_config =
        ProviderConfig::new(&config.account_sid, &config.auth_token, &config.from_number)
            .with_api_base(&config.api_base)
            .with_status_callback(config.status_webhook_url());
    if let Some(sid) = &config.messaging_service_sid {
        provider_config = provider_config.with_messaging_service(sid);
    } else {
        info!("No messaging service configured, scheduled sends are disabled");
    }
    let provider = Arc::new(SmsClient::new(provider_config)?);

    let delivery = DeliveryService::new(
        db.clone(),
        provider,
        DeliveryConfig::new(
            &config.auth_token,
            config.inbound_webhook_url(),
            config.status_webhook_url(),
        ),
    );
    let ingestor = Ingestor::with_batch_size(db.clone(), config.ingest_batch_size);
    let registry: Arc<Registry<OperatorEvent>> = Arc::new(Registry::new(config.event_buffer));

    // Build application state
    let state = AppState::new(
        db.clone(),
        ingestor,
        delivery,
        Arc::clone(&registry),
        config.operators.clone(),
    );

    // Build router
    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    info!(addr = %config.addr, "Campaign server listening");
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, then ends every open event stream so the
/// server can finish draining connections.
async fn shutdown_signal(registry: Arc<Registry<OperatorEvent>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }

    registry.drain();
}
