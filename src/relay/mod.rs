//! Relay Sessions
//!
//! Connections handed to the caller after a successful handshake.

pub mod session;

pub use session::{strip_udp_header, Session};
