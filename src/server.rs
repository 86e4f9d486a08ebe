//! TCP listener for the proxy.
//!
//! Accepts incoming connections and hands each one to the forwarding engine
//! as an independent task.

use crate::config::Config;
use crate::proxy::Forwarder;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// Listen backlog for the proxy socket
const LISTEN_BACKLOG: i32 = 1024;

/// Pause after the first failed accept; doubled per consecutive failure
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Server instance
pub struct Server {
    listener: TcpListener,
    forwarder: Forwarder,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Bind the listener described by `config`.
    ///
    /// Failing to bind is fatal for the process.
    pub async fn bind(config: Config) -> io::Result<Self> {
        let listen = config.listen_addr();
        let addr = tokio::net::lookup_host(listen.as_str()).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address found for {}", listen),
            )
        })?;
        let listener = TcpListener::from_std(create_listener(addr)?)?;

        info!(
            address = %listener.local_addr()?,
            backend = %config.backend_url,
            max_connections = config.max_connections,
            "Server listening"
        );

        Ok(Server {
            listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            forwarder: Forwarder::new(Arc::new(config)),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the process exits.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut backoff = None;
        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    backoff = None;
                    debug!(peer = %addr, "Accepted connection");
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let forwarder = self.forwarder.clone();
                    tokio::spawn(async move {
                        forwarder.handle_connection(stream, addr).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    drop(permit);
                    let delay = next_accept_backoff(backoff);
                    backoff = Some(delay);
                    error!(error = %e, delay = ?delay, "Failed to accept connection");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Connections already being forwarded keep running in their own tasks.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                Ok(())
            }
        }
    }
}

/// Delay before the next accept after a failure; `None` when the previous
/// accept succeeded.
fn next_accept_backoff(previous: Option<Duration>) -> Duration {
    match previous {
        None => ACCEPT_BACKOFF_MIN,
        Some(delay) => (delay * 2).min(ACCEPT_BACKOFF_MAX),
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
