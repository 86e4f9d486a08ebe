//! Forwarding engine: one task per client connection, one backend
//! connection per request.

mod error;
mod forwarder;

pub use error::ProxyError;
pub use forwarder::Forwarder;
