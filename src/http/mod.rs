//! HTTP/1.1 message model over raw byte streams.
//!
//! - `wire`: header-block reading, header maps, content-length bodies
//! - `chunked`: pass-through relay of chunked bodies
//! - `request` / `response`: message entities
//! - `method`: request method tokens

pub mod chunked;
pub mod error;
pub mod method;
pub mod request;
pub mod response;
pub mod wire;

pub use error::MessageError;
pub use method::Method;
pub use request::Request;
pub use response::{BodyFraming, Response};
pub use wire::{HeaderMap, Limits};
