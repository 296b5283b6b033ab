//! SOCKS5 Protocol Implementation
//!
//! Client side of the SOCKS5 handshake: address codec, wire constants and
//! the negotiation engine.

pub mod constants;
pub mod handler;
pub mod types;

pub use constants::*;
pub use handler::{NegotiationState, Socks5Handshake};
pub use types::*;
