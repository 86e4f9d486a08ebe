//! Errors raised while reading or parsing HTTP/1.1 messages.

use std::io;

/// Message parsing errors
#[derive(Debug)]
pub enum MessageError {
    /// Read failure, including the stream closing mid-header or mid-body
    Io(io::Error),
    /// Request or status line is not made of three fields, or the status
    /// code is not an integer
    Malformed(String),
    /// Header block grew past the configured limit
    HeaderTooLarge(usize),
    /// Declared content-length is above the configured limit
    BodyTooLarge(u64),
    /// Chunk-size line of a chunked body could not be decoded
    InvalidChunkSize(String),
}

impl MessageError {
    /// True when the peer closed the stream before the message was complete.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, MessageError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }

    /// True when an idle timeout fired on the underlying stream.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MessageError::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageError::Io(e) => write!(f, "I/O error: {}", e),
            MessageError::Malformed(msg) => write!(f, "Malformed message: {}", msg),
            MessageError::HeaderTooLarge(limit) => {
                write!(f, "Header block exceeds {} bytes", limit)
            }
            MessageError::BodyTooLarge(len) => write!(f, "Body of {} bytes is too large", len),
            MessageError::InvalidChunkSize(line) => write!(f, "Invalid chunk size: {}", line),
        }
    }
}

impl std::error::Error for MessageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MessageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MessageError {
    fn from(e: io::Error) -> Self {
        MessageError::Io(e)
    }
}
