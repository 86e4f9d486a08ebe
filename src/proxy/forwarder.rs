//! Forwarding of one client connection to the backend.
//!
//! A connection goes through these steps, stopping at the first error:
//! parse the client request, add forwarding headers, dial the backend, write
//! the request, relay the backend header block verbatim, relay the body.
//! Both sockets are owned by this module and dropped on every exit path.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use super::error::ProxyError;
use crate::config::Config;
use crate::http::chunked::relay_chunked;
use crate::http::{BodyFraming, MessageError, Request, Response};
use crate::io::IdleTimeout;

type BackendStream = BufReader<IdleTimeout<TcpStream>>;

/// Forwards client connections to the configured backend.
///
/// Cloning is cheap; every clone shares the same read-only `Config`.
#[derive(Debug, Clone)]
pub struct Forwarder {
    config: Arc<Config>,
}

impl Forwarder {
    pub fn new(config: Arc<Config>) -> Self {
        Forwarder { config }
    }

    /// Handle a single client connection until the response is relayed or
    /// a step fails.
    ///
    /// Failures are logged. With `error_responses` enabled, a failure that
    /// happens before any response byte reached the client is answered with
    /// a synthesized error response.
    pub async fn handle_connection<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut client = BufReader::new(IdleTimeout::new(stream, self.config.idle_timeout));

        match self.forward(&mut client, peer).await {
            Ok(bytes) => trace!(peer = %peer, bytes, "Response relayed"),
            Err(e) => {
                warn!(peer = %peer, error = %e, "Forwarding failed");
                if self.config.error_responses {
                    if let Some(response) = e.error_response() {
                        if let Err(e) = client.write_all(&response.serialize()).await {
                            debug!(peer = %peer, error = %e, "Failed to send error response");
                        }
                    }
                }
            }
        }

        if let Err(e) = client.shutdown().await {
            trace!(peer = %peer, error = %e, "Client shutdown failed");
        }
        debug!(peer = %peer, "Client connection closed");
    }

    /// Run one request/response exchange. Returns the number of response
    /// bytes written to the client.
    async fn forward<C>(&self, client: &mut C, peer: SocketAddr) -> Result<u64, ProxyError>
    where
        C: AsyncBufRead + AsyncWrite + Unpin,
    {
        let request = Request::parse_with_limits(client, &self.config.limits)
            .await
            .map_err(ProxyError::Request)?;
        debug!(
            peer = %peer,
            method = %request.method,
            path = %request.path,
            body = request.body.len(),
            "Request parsed"
        );

        let forwarded = request.with_forwarding_headers(peer);

        let mut backend = self.dial().await?;
        backend
            .write_all(&forwarded.serialize())
            .await
            .map_err(ProxyError::BackendWrite)?;
        backend.flush().await.map_err(ProxyError::BackendWrite)?;

        let mut written = 0u64;
        let response = loop {
            let response =
                Response::parse_headers_only_with_limits(&mut backend, &self.config.limits)
                    .await
                    .map_err(|e| {
                        // a relayed interim head already answered the client
                        if written == 0 {
                            ProxyError::Response(e)
                        } else {
                            ProxyError::Relay(e)
                        }
                    })?;
            if !response.is_interim() {
                break response;
            }

            // 100 Continue and friends precede the final head
            debug!(peer = %peer, status = response.status_code, "Relaying interim response");
            written += write_head(client, &response).await?;
        };
        info!(
            peer = %peer,
            method = %request.method,
            path = %request.path,
            status = response.status_code,
            "Relaying response"
        );
        written += write_head(client, &response).await?;

        let framing = response.body_framing(&request.method);
        trace!(peer = %peer, ?framing, "Relaying body");
        written += relay_body(&mut backend, client, framing)
            .await
            .map_err(ProxyError::Relay)?;
        client.flush().await.map_err(ProxyError::ClientWrite)?;

        Ok(written)
    }

    /// Open a fresh connection to the backend.
    async fn dial(&self) -> Result<BackendStream, ProxyError> {
        let addr = self.config.backend_url.as_str();
        let connect = TcpStream::connect(addr);
        let result = match self.config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| ProxyError::ConnectTimeout(addr.to_string()))?,
            None => connect.await,
        };
        let stream = result.map_err(|source| ProxyError::Dial {
            addr: addr.to_string(),
            source,
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            trace!(error = %e, "Failed to set TCP_NODELAY on backend socket");
        }
        debug!(backend = addr, "Connected to backend");

        Ok(BufReader::new(IdleTimeout::new(stream, self.config.idle_timeout)))
    }
}

/// Write the head of `response` exactly as the backend sent it.
async fn write_head<C>(client: &mut C, response: &Response) -> Result<u64, ProxyError>
where
    C: AsyncWrite + Unpin,
{
    let Some(block) = &response.raw_header_block else {
        return Ok(0);
    };
    client.write_all(block).await.map_err(ProxyError::ClientWrite)?;
    Ok(block.len() as u64)
}

/// Copy the response body from `backend` to `client` according to `framing`.
async fn relay_body<B, C>(
    backend: &mut B,
    client: &mut C,
    framing: BodyFraming,
) -> Result<u64, MessageError>
where
    B: AsyncBufRead + Unpin,
    C: AsyncWrite + Unpin,
{
    match framing {
        BodyFraming::None => Ok(0),
        BodyFraming::Length(len) => {
            // never relay past the declared length
            let copied = tokio::io::copy(&mut (&mut *backend).take(len), client).await?;
            if copied < len {
                return Err(MessageError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("backend closed after {} of {} body bytes", copied, len),
                )));
            }
            Ok(copied)
        }
        BodyFraming::Chunked => relay_chunked(backend, client).await,
        BodyFraming::UntilClose => Ok(tokio::io::copy(backend, client).await?),
    }
}
