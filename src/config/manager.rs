//! Configuration Manager

use super::ClientConfig;
use crate::protocol::constants::SOCKS5_MAX_FIELD_LEN;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<ClientConfig> {
        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ClientConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()
            .with_context(|| "Configuration validation failed")?;

        tracing::info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<ClientConfig> {
        let mut config = ClientConfig::default();
        Self::apply_env(&mut config)?;
        Ok(config)
    }

    /// Override fields with any `SOCKS5_*` environment variables present
    pub fn apply_env(config: &mut ClientConfig) -> Result<()> {
        if let Ok(server) = std::env::var("SOCKS5_SERVER") {
            config.server = server;
        }

        if let Ok(username) = std::env::var("SOCKS5_USERNAME") {
            config.username = username;
        }

        if let Ok(password) = std::env::var("SOCKS5_PASSWORD") {
            config.password = password;
        }

        if let Ok(timeout) = std::env::var("SOCKS5_CONNECTION_TIMEOUT") {
            config.connection_timeout = Some(parse_timeout("SOCKS5_CONNECTION_TIMEOUT", &timeout)?);
        }

        if let Ok(timeout) = std::env::var("SOCKS5_READ_TIMEOUT") {
            config.read_timeout = Some(parse_timeout("SOCKS5_READ_TIMEOUT", &timeout)?);
        }

        if let Ok(timeout) = std::env::var("SOCKS5_WRITE_TIMEOUT") {
            config.write_timeout = Some(parse_timeout("SOCKS5_WRITE_TIMEOUT", &timeout)?);
        }

        Ok(())
    }
}

fn parse_timeout(var: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).with_context(|| format!("Invalid {}: {}", var, value))
}

impl ClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.is_empty() {
            bail!("server must be set to the SOCKS5 proxy address");
        }

        if !self.server.contains(':') {
            bail!("server must be in host:port form, got {}", self.server);
        }

        if self.username.is_empty() != self.password.is_empty() {
            bail!("username and password must be set together");
        }

        if self.username.len() > SOCKS5_MAX_FIELD_LEN {
            bail!("username exceeds {} bytes", SOCKS5_MAX_FIELD_LEN);
        }

        if self.password.len() > SOCKS5_MAX_FIELD_LEN {
            bail!("password exceeds {} bytes", SOCKS5_MAX_FIELD_LEN);
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        server: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        timeout: Option<Duration>,
    ) {
        if let Some(server) = server {
            self.server = server.to_string();
            tracing::info!("CLI override: server set to {}", server);
        }

        if let Some(username) = username {
            self.username = username.to_string();
            tracing::info!("CLI override: username set to {}", username);
        }

        if let Some(password) = password {
            self.password = password.to_string();
            tracing::info!("CLI override: password set");
        }

        if let Some(timeout) = timeout {
            self.connection_timeout = Some(timeout);
            self.read_timeout = Some(timeout);
            self.write_timeout = Some(timeout);
            tracing::info!("CLI override: timeouts set to {:?}", timeout);
        }
    }
}
