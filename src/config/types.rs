//! Configuration Types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Socks5Error;
use crate::protocol::constants::SOCKS5_MAX_FIELD_LEN;

/// Applied to any timeout that is unset or zero
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// SOCKS5 client configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Proxy server address (`host:port`)
    pub server: String,
    /// Username for username/password auth, empty disables auth
    pub username: String,
    pub password: String,
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration, write: Duration) -> Self {
        self.connection_timeout = Some(connect);
        self.read_timeout = Some(read);
        self.write_timeout = Some(write);
        self
    }

    /// Username/password pair, only when both are non-empty
    pub fn credentials(&self) -> Result<Option<Credentials>, Socks5Error> {
        if self.username.is_empty() || self.password.is_empty() {
            return Ok(None);
        }
        Credentials::new(&self.username, &self.password).map(Some)
    }

    /// Resolve the options one dial will run with. The config itself is
    /// never touched, so concurrent dials can share it.
    pub fn dial_options(&self) -> Result<DialOptions, Socks5Error> {
        Ok(DialOptions {
            connection_timeout: or_default(self.connection_timeout),
            read_timeout: or_default(self.read_timeout),
            write_timeout: or_default(self.write_timeout),
            credentials: self.credentials()?,
        })
    }
}

fn or_default(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(t) if !t.is_zero() => t,
        _ => DEFAULT_TIMEOUT,
    }
}

/// Per-dial settings, resolved once from [`ClientConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialOptions {
    pub connection_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl DialOptions {
    /// Replace the connect timeout for this call only
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = or_default(Some(timeout));
        self
    }
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            credentials: None,
        }
    }
}

/// Username/password that fit the single-byte length prefixes
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Result<Self, Socks5Error> {
        if username.len() > SOCKS5_MAX_FIELD_LEN {
            return Err(Socks5Error::InvalidAddress(format!(
                "username too long: {} bytes",
                username.len()
            )));
        }
        if password.len() > SOCKS5_MAX_FIELD_LEN {
            return Err(Socks5Error::InvalidAddress(format!(
                "password too long: {} bytes",
                password.len()
            )));
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
