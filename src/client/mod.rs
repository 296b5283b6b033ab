//! SOCKS5 Client
//!
//! Public entry point: dial a `tcp` or `udp` destination through the
//! configured proxy and get back a ready [`Session`].

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::{ClientConfig, DialOptions};
use crate::error::Socks5Error;
use crate::protocol::{AddressSpec, Network, Socks5Handshake};
use crate::relay::Session;

/// Dials destinations through one SOCKS5 proxy
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Timeouts and credentials may be changed between dials
    pub fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    /// Open a relay to `address` (`host:port`). `network` is `tcp` or `udp`.
    pub async fn dial(&self, network: &str, address: &str) -> Result<Session, Socks5Error> {
        let (network, target) = parse_destination(network, address)?;
        let options = self.config.dial_options()?;
        self.dial_with(network, target, options).await
    }

    /// Like [`Client::dial`] with a connect timeout for this call only
    pub async fn dial_timeout(
        &self,
        network: &str,
        address: &str,
        connect_timeout: Duration,
    ) -> Result<Session, Socks5Error> {
        let (network, target) = parse_destination(network, address)?;
        let options = self
            .config
            .dial_options()?
            .with_connection_timeout(connect_timeout);
        self.dial_with(network, target, options).await
    }

    async fn dial_with(
        &self,
        network: Network,
        target: AddressSpec,
        options: DialOptions,
    ) -> Result<Session, Socks5Error> {
        let stream = self.connect(&options).await?;
        let session = Socks5Handshake::new(stream, &options)
            .run(network, &target)
            .await?;

        info!(
            proxy = %self.config.server,
            network = %network,
            target = %target,
            "SOCKS5 session established"
        );
        Ok(session)
    }

    async fn connect(&self, options: &DialOptions) -> Result<TcpStream, Socks5Error> {
        debug!(
            proxy = %self.config.server,
            timeout = ?options.connection_timeout,
            "Connecting to SOCKS5 server"
        );

        match timeout(options.connection_timeout, TcpStream::connect(&self.config.server)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(Socks5Error::ConnectFailed(e)),
            Err(_) => Err(Socks5Error::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "connect to {} timed out after {:?}",
                    self.config.server, options.connection_timeout
                ),
            ))),
        }
    }
}

/// Network kind first, then destination; both fail before any config or I/O
fn parse_destination(network: &str, address: &str) -> Result<(Network, AddressSpec), Socks5Error> {
    let network: Network = network.parse()?;
    let target: AddressSpec = address.parse()?;
    Ok((network, target))
}
