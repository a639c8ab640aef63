//! qscope Server - standalone entry point for the inspection API
//!
//! Thin wrapper around `qscope-api` that reads configuration from the
//! environment and serves until Ctrl+C or SIGTERM.

use anyhow::Result;
use qscope_api::{QscopeServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    qscope_api::init_tracing();

    // QSCOPE_PORT wins over PORT; both fall back to 8080
    let config = ServerConfig::from_env();
    tracing::info!(
        addr = %config.addr,
        timeout_secs = config.timeout.as_secs(),
        store_timeout_ms = config.store_timeout.as_millis() as u64,
        batch_concurrency = config.batch_concurrency,
        batch_deadline_secs = config.batch_deadline.as_secs(),
        "Starting qscope server"
    );

    let server = QscopeServer::new(config).await.map_err(|e| {
        tracing::error!("Failed to initialize server: {}", e);
        e
    })?;

    server.run().await.map_err(|e| {
        tracing::error!("Server error during execution: {}", e);
        e
    })?;

    Ok(())
}
