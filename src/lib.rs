//! http-relay: a forward HTTP/1.1 proxy over raw TCP
//!
//! The proxy parses each client request itself, forwards it to a single
//! backend and streams the response back:
//! - Requests gain `x-forwarded-for` and `x-forwarded-proto` headers
//! - Response header blocks are relayed byte for byte
//! - Bodies are relayed by content-length, chunked coding or until close
//! - Configuration via CLI arguments, environment or TOML file

pub mod config;
pub mod http;
pub mod io;
pub mod proxy;
pub mod server;

pub use config::Config;
pub use server::Server;
