//! socks5-dialer
//!
//! Client side of the SOCKS5 protocol (RFC 1928). Negotiates with a proxy
//! server and returns a [`Session`] that relays TCP bytes, or UDP datagrams
//! framed with the SOCKS5 UDP header.
//!
//! ```no_run
//! use socks5_dialer::{Client, ClientConfig};
//! use tokio::io::AsyncWriteExt;
//!
//! # async fn run() -> Result<(), socks5_dialer::Socks5Error> {
//! let client = Client::new(ClientConfig::new("127.0.0.1:1080"));
//! let mut session = client.dial("tcp", "example.com:80").await?;
//! session.write_all(b"GET / HTTP/1.0\r\n\r\n").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;

pub use client::Client;
pub use config::{ClientConfig, ConfigManager, DialOptions};
pub use error::Socks5Error;
pub use protocol::{AddressSpec, Network, TargetAddr};
pub use relay::{strip_udp_header, Session};

/// Result type for configuration and binary plumbing
pub type Result<T> = anyhow::Result<T>;
