//! http-relay: a forward HTTP/1.1 proxy
//!
//! Accepts HTTP/1.1 requests on a TCP port and forwards each one to a
//! single backend over a fresh connection:
//! - Request parsing and serialization done directly on the socket
//! - Forwarding headers injected on every request
//! - Response header block relayed verbatim, body streamed
//! - Configuration via CLI arguments, environment or TOML file

use http_relay::{Config, Server};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen_addr(),
        backend = %config.backend_url,
        max_connections = config.max_connections,
        error_responses = config.error_responses,
        workers = ?config.workers,
        "Starting http-relay"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    runtime.block_on(run(config))?;
    Ok(())
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::bind(config).await?;
    server.run_until(shutdown_signal()).await
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
