//! I/O helpers shared by the listener and the forwarding engine.

mod idle;

pub use idle::IdleTimeout;
