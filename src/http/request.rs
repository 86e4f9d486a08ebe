//! HTTP/1.1 request model.

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use tokio::io::AsyncBufRead;

use super::error::MessageError;
use super::method::Method;
use super::wire::{
    line_text, parse_header_map, read_exact_body, read_header_lines, split_start_line,
    HeaderMap, Limits,
};

/// Value injected as `x-forwarded-proto`; the proxy has no TLS front-end
pub const FORWARDED_PROTO: &str = "http";

/// A fully read request: head plus materialized body.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub version: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    /// Parse a request with the default size limits.
    pub async fn parse<R>(reader: &mut R) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        Self::parse_with_limits(reader, &Limits::default()).await
    }

    /// Parse the request line, the headers and a content-length body.
    ///
    /// The method token is not checked against the known verbs, and the path
    /// and version are kept as received.
    pub async fn parse_with_limits<R>(reader: &mut R, limits: &Limits) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        let lines = read_header_lines(reader, limits).await?;
        let Some(request_line) = lines.first() else {
            return Err(MessageError::Malformed("empty request head".to_string()));
        };

        let (method, path, version) = split_start_line(request_line).ok_or_else(|| {
            MessageError::Malformed(format!("request line '{}'", line_text(request_line)))
        })?;

        let headers = parse_header_map(&lines, 1);
        let body = read_exact_body(reader, &headers, limits).await?;

        Ok(Request {
            method: Method::from(method.as_str()),
            path,
            version,
            headers,
            body,
        })
    }

    /// Encode the request as it goes on the wire.
    ///
    /// Header order follows the map and is not meaningful.
    pub fn serialize(&self) -> Bytes {
        let head = format!("{} {} {}\r\n", self.method, self.path, self.version);
        let headers_len: usize = self
            .headers
            .iter()
            .map(|(k, v)| k.len() + v.len() + 4)
            .sum();

        let mut buf = BytesMut::with_capacity(head.len() + headers_len + 2 + self.body.len());
        buf.extend_from_slice(head.as_bytes());
        for (key, value) in &self.headers {
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }

    /// Build the request sent to the backend.
    ///
    /// `x-forwarded-for` and `x-forwarded-proto` replace any value the client
    /// supplied. `self` is left as parsed.
    pub fn with_forwarding_headers(&self, client_addr: SocketAddr) -> Request {
        let overrides = [
            ("x-forwarded-for".to_string(), client_addr.to_string()),
            ("x-forwarded-proto".to_string(), FORWARDED_PROTO.to_string()),
        ];
        let headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .chain(overrides)
            .collect();

        Request {
            method: self.method.clone(),
            path: self.path.clone(),
            version: self.version.clone(),
            headers,
            body: self.body.clone(),
        }
    }
}
