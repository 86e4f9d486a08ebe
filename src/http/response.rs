//! HTTP/1.1 response model.
//!
//! Backend responses are parsed head-only: the header block is kept byte for
//! byte in `raw_header_block` and the body stays on the stream for the caller
//! to relay. Responses built locally carry a materialized `body` instead.

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncBufRead;

use super::error::MessageError;
use super::method::Method;
use super::wire::{
    content_length, is_chunked, line_text, parse_header_map, read_header_lines,
    reconstruct_raw_header_block, split_start_line, HeaderMap, Limits,
};

/// How the body following a response head is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body follows the head
    None,
    /// Exactly this many bytes follow
    Length(u64),
    /// Chunked transfer coding
    Chunked,
    /// Body runs until the backend closes the connection
    UntilClose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub version: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Header section exactly as received, blank line included
    pub raw_header_block: Option<Bytes>,
}

impl Response {
    /// Parse a response head with the default size limits.
    pub async fn parse_headers_only<R>(reader: &mut R) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        Self::parse_headers_only_with_limits(reader, &Limits::default()).await
    }

    /// Parse the status line and headers, leaving the stream at the first
    /// body byte.
    pub async fn parse_headers_only_with_limits<R>(
        reader: &mut R,
        limits: &Limits,
    ) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        let lines = read_header_lines(reader, limits).await?;
        let Some(status_line) = lines.first() else {
            return Err(MessageError::Malformed("empty response head".to_string()));
        };

        let (version, code, status_text) = split_start_line(status_line).ok_or_else(|| {
            MessageError::Malformed(format!("status line '{}'", line_text(status_line)))
        })?;
        let status_code = code
            .parse::<u16>()
            .map_err(|_| MessageError::Malformed(format!("status code '{}'", code)))?;

        Ok(Response {
            version,
            status_code,
            status_text,
            headers: parse_header_map(&lines, 1),
            body: Bytes::new(),
            raw_header_block: Some(reconstruct_raw_header_block(&lines)),
        })
    }

    /// Minimal plain-text response generated by the proxy itself.
    pub fn synthesized(status_code: u16, status_text: &str) -> Self {
        let body = Bytes::from(format!("{} {}\n", status_code, status_text));
        let headers = [
            ("content-type", "text/plain; charset=utf-8".to_string()),
            ("content-length", body.len().to_string()),
            ("connection", "close".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Response {
            version: "HTTP/1.1".to_string(),
            status_code,
            status_text: status_text.to_string(),
            headers,
            body,
            raw_header_block: None,
        }
    }

    /// Encode a locally built response, body included.
    pub fn serialize(&self) -> Bytes {
        let head = format!("{} {} {}\r\n", self.version, self.status_code, self.status_text);
        let mut buf = BytesMut::with_capacity(head.len() + 128 + self.body.len());
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

    /// True for a 1xx head that is followed by another head on the same
    /// stream. `101 Switching Protocols` is final.
    pub fn is_interim(&self) -> bool {
        (100..200).contains(&self.status_code) && self.status_code != 101
    }

    /// Decide how the body after this head is delimited.
    ///
    /// Responses to HEAD and 1xx/204/304 responses never carry a body.
    /// Chunked coding wins over a content-length when both are present.
    pub fn body_framing(&self, request_method: &Method) -> BodyFraming {
        let code = self.status_code;
        if *request_method == Method::Head || (100..200).contains(&code) || code == 204 || code == 304
        {
            return BodyFraming::None;
        }
        if is_chunked(&self.headers) {
            return BodyFraming::Chunked;
        }
        match content_length(&self.headers) {
            Some(len) => BodyFraming::Length(len),
            None => BodyFraming::UntilClose,
        }
    }
}
