//! # Parley Server
//!
//! Single-process WebSocket chat relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parley
//!
//! # Run with environment variables
//! PARLEY_PORT=9000 PARLEY_HOST=0.0.0.0 parley
//! ```
//!
//! Configuration is read from `parley.toml` if present; see
//! [`config::Config`] for the full set of options.

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting parley relay on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server; a listen failure is the one fatal error.
    handlers::run_server(config).await?;

    Ok(())
}
