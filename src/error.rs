//! Dial Errors
//!
//! Every failure a dial can surface is classified so callers can tell a
//! misbehaving proxy apart from rejected credentials or a bad target.

use std::io;
use thiserror::Error;

/// Errors returned by [`crate::Client::dial`] and the handshake engine
#[derive(Debug, Error)]
pub enum Socks5Error {
    /// Network kind was neither `tcp` nor `udp`; no I/O was attempted
    #[error("wrong network type: {0}")]
    InvalidNetworkType(String),

    /// Destination is malformed or does not fit the single-byte length fields
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The transport connection to the proxy could not be opened
    #[error("failed to connect to socks5 server: {0}")]
    ConnectFailed(#[source] io::Error),

    /// The proxy broke the expected framing or answered with a failure status
    #[error("socks5 server closed the connection: {0}")]
    ServerClosed(String),

    /// The proxy rejected the configured username/password
    #[error("failed to auth")]
    AuthFailed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Socks5Error {
    pub(crate) fn server_closed(reason: impl Into<String>) -> Self {
        Socks5Error::ServerClosed(reason.into())
    }

    pub fn is_auth_failed(&self) -> bool {
        matches!(self, Socks5Error::AuthFailed)
    }

    pub fn is_server_closed(&self) -> bool {
        matches!(self, Socks5Error::ServerClosed(_))
    }

    /// True when the failure came from a read/write or connect deadline
    pub fn is_timeout(&self) -> bool {
        match self {
            Socks5Error::ConnectFailed(e) | Socks5Error::Io(e) => {
                e.kind() == io::ErrorKind::TimedOut
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Socks5Error::AuthFailed.is_auth_failed());
        assert!(!Socks5Error::AuthFailed.is_server_closed());
        assert!(Socks5Error::server_closed("bad version").is_server_closed());

        let timed_out = Socks5Error::Io(io::Error::new(io::ErrorKind::TimedOut, "read"));
        assert!(timed_out.is_timeout());

        let refused = Socks5Error::ConnectFailed(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(!refused.is_timeout());
        assert!(refused.to_string().contains("failed to connect"));
    }
}
