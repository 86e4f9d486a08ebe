//! Errors ending a forwarded connection.

use std::io;

use crate::http::{MessageError, Response};

/// Failure of one client connection, tagged with the side that failed
#[derive(Debug)]
pub enum ProxyError {
    /// Reading or parsing the client request failed
    Request(MessageError),
    /// Backend connection could not be established
    Dial { addr: String, source: io::Error },
    /// Backend connection was not established within the connect timeout
    ConnectTimeout(String),
    /// Writing the request to the backend failed
    BackendWrite(io::Error),
    /// Reading or parsing the backend response head failed
    Response(MessageError),
    /// Writing the response head to the client failed
    ClientWrite(io::Error),
    /// Relaying the response body failed
    Relay(MessageError),
}

impl ProxyError {
    /// Response to send to the client for this failure, if one can still be
    /// sent. Nothing is returned once the backend head has been relayed or
    /// when the client side itself is broken.
    pub fn error_response(&self) -> Option<Response> {
        let (code, text) = match self {
            ProxyError::Request(MessageError::Malformed(_)) => (400, "Bad Request"),
            ProxyError::Request(MessageError::HeaderTooLarge(_)) => {
                (431, "Request Header Fields Too Large")
            }
            ProxyError::Request(MessageError::BodyTooLarge(_)) => (413, "Payload Too Large"),
            ProxyError::Request(e) if e.is_timeout() => (408, "Request Timeout"),
            ProxyError::Request(_) => return None,
            ProxyError::ConnectTimeout(_) => (504, "Gateway Timeout"),
            ProxyError::Response(e) if e.is_timeout() => (504, "Gateway Timeout"),
            ProxyError::Dial { .. } | ProxyError::BackendWrite(_) | ProxyError::Response(_) => {
                (502, "Bad Gateway")
            }
            ProxyError::ClientWrite(_) | ProxyError::Relay(_) => return None,
        };
        Some(Response::synthesized(code, text))
    }
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::Request(e) => write!(f, "Failed to read client request: {}", e),
            ProxyError::Dial { addr, source } => {
                write!(f, "Failed to connect to backend {}: {}", addr, source)
            }
            ProxyError::ConnectTimeout(addr) => {
                write!(f, "Timed out connecting to backend {}", addr)
            }
            ProxyError::BackendWrite(e) => write!(f, "Failed to write request to backend: {}", e),
            ProxyError::Response(e) => write!(f, "Failed to read backend response: {}", e),
            ProxyError::ClientWrite(e) => write!(f, "Failed to write headers to client: {}", e),
            ProxyError::Relay(e) => write!(f, "Failed to stream body to client: {}", e),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Request(e) | ProxyError::Response(e) | ProxyError::Relay(e) => Some(e),
            ProxyError::Dial { source, .. } => Some(source),
            ProxyError::BackendWrite(e) | ProxyError::ClientWrite(e) => Some(e),
            ProxyError::ConnectTimeout(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ProxyError) -> Option<u16> {
        err.error_response().map(|r| r.status_code)
    }

    #[test]
    fn test_error_response_codes() {
        assert_eq!(
            status_of(ProxyError::Request(MessageError::Malformed("x".into()))),
            Some(400)
        );
        assert_eq!(
            status_of(ProxyError::Request(MessageError::HeaderTooLarge(10))),
            Some(431)
        );
        assert_eq!(
            status_of(ProxyError::Request(MessageError::BodyTooLarge(10))),
            Some(413)
        );
        assert_eq!(
            status_of(ProxyError::Dial {
                addr: "localhost:1".into(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }),
            Some(502)
        );
        assert_eq!(
            status_of(ProxyError::ConnectTimeout("localhost:1".into())),
            Some(504)
        );
        assert_eq!(
            status_of(ProxyError::Response(MessageError::Io(io::Error::from(
                io::ErrorKind::TimedOut
            )))),
            Some(504)
        );
        assert_eq!(
            status_of(ProxyError::Response(MessageError::Malformed("x".into()))),
            Some(502)
        );
    }

    #[test]
    fn test_no_response_when_client_side_failed() {
        let eof = || MessageError::Io(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(status_of(ProxyError::Request(eof())), None);
        assert_eq!(status_of(ProxyError::Relay(eof())), None);
        assert_eq!(
            status_of(ProxyError::ClientWrite(io::Error::from(
                io::ErrorKind::BrokenPipe
            ))),
            None
        );
    }
}
