//! Exchange Node Binary
//!
//! Opens the book exchange with the HTTP metadata providers and keeps it
//! running until Ctrl-C.

use anyhow::Context;
use exchange_core::{Config, Exchange};
use isbn_adapters::AdapterConfig;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("EXCHANGE_LOG_JSON").is_ok_and(|v| v == "1" || v == "true") {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("Starting book exchange node");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("EXCHANGE_CONFIG").ok());
    let config = match config_path {
        Some(path) => {
            info!(path = %path, "Loading config from file");
            Config::from_file(&path).with_context(|| format!("loading {}", path))?
        }
        None => {
            info!("Loading config from environment variables");
            Config::from_env().context("loading config from environment")?
        }
    };

    let adapters = AdapterConfig::from_env()?;
    let providers = isbn_adapters::default_chain(&adapters)?;

    info!(data_dir = ?config.data_dir, "Opening exchange");
    let exchange = Exchange::open(config, Arc::new(providers)).context("opening exchange")?;

    info!(
        return_confirmation = ?exchange.config().lending.return_confirmation,
        borrow_cost = exchange.config().tariffs.borrow_cost,
        "Exchange node running"
    );

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    if let Ok(text) = exchange.metrics().gather_text() {
        tracing::debug!(metrics = %text, "Final metrics");
    }

    exchange.shutdown()?;
    info!("Exchange node stopped");
    Ok(())
}
