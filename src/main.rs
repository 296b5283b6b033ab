//! socks5-dial - open a relay through a SOCKS5 proxy
//!
//! Dials the target through the proxy, then copies stdin to the session and
//! the session to stdout until either side closes.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use socks5_dialer::{Client, ClientConfig, ConfigManager, Session};

/// CLI arguments for socks5-dial
#[derive(Parser, Debug)]
#[command(name = "socks5-dial")]
#[command(about = "Relay stdin/stdout through a SOCKS5 proxy")]
#[command(version)]
#[command(long_about = "
socks5-dial - relay stdin/stdout through a SOCKS5 proxy

Configuration priority (highest to lowest):
1. Command-line arguments
2. Environment variables
3. Configuration file
4. Built-in defaults (3s timeouts)

Environment variables:
  SOCKS5_SERVER              - Proxy address (e.g., 127.0.0.1:1080)
  SOCKS5_USERNAME            - Username for username/password auth
  SOCKS5_PASSWORD            - Password for username/password auth
  SOCKS5_CONNECTION_TIMEOUT  - Connect timeout (e.g., 3s, 500ms)
  SOCKS5_READ_TIMEOUT        - Handshake read timeout
  SOCKS5_WRITE_TIMEOUT       - Handshake write timeout
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    /// Proxy address (overrides config file)
    #[arg(short, long, help = "SOCKS5 proxy address (e.g., 127.0.0.1:1080)")]
    pub server: Option<String>,

    #[arg(short, long, help = "Username for username/password auth")]
    pub username: Option<String>,

    #[arg(short, long, help = "Password for username/password auth")]
    pub password: Option<String>,

    /// Transport kind
    #[arg(short, long, default_value = "tcp", help = "Network: tcp or udp")]
    pub network: String,

    /// Timeout applied to connect, read and write
    #[arg(long, value_parser = humantime::parse_duration, help = "Handshake timeouts (e.g., 5s)")]
    pub timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", help = "Log level")]
    pub log_level: String,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,

    /// Destination as host:port
    #[arg(required_unless_present = "validate_config", help = "Destination host:port")]
    pub target: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_tracing(&args)?;

    let mut config = match &args.config {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ClientConfig::default(),
    };
    ConfigManager::apply_env(&mut config)?;

    // Apply CLI argument overrides (highest priority)
    config.merge_with_cli_args(
        args.server.as_deref(),
        args.username.as_deref(),
        args.password.as_deref(),
        args.timeout,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Server: {}", config.server);
        info!(
            "  Authentication: {}",
            if config.username.is_empty() { "none" } else { "username/password" }
        );
        let options = config.dial_options()?;
        info!("  Connect timeout: {:?}", options.connection_timeout);
        info!("  Read timeout: {:?}", options.read_timeout);
        info!("  Write timeout: {:?}", options.write_timeout);
        return Ok(());
    }

    let target = args
        .target
        .as_deref()
        .context("A destination host:port is required")?;

    let client = Client::new(config);
    let session = client
        .dial(&args.network, target)
        .await
        .with_context(|| format!("Failed to dial {} {} via {}", args.network, target, client.config().server))?;

    relay_stdio(session).await
}

/// Copy stdin to the session and the session to stdout. Stdin EOF only
/// half-closes the session so the rest of the response still arrives.
async fn relay_stdio(session: Session) -> Result<()> {
    let (mut reader, mut writer) = tokio::io::split(session);

    {
        let upload = async {
            let mut stdin = tokio::io::stdin();
            let n = tokio::io::copy(&mut stdin, &mut writer).await?;
            writer.shutdown().await?;
            Ok::<_, std::io::Error>(n)
        };
        let download = async {
            let mut stdout = tokio::io::stdout();
            let n = tokio::io::copy(&mut reader, &mut stdout).await?;
            stdout.flush().await?;
            Ok::<_, std::io::Error>(n)
        };
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(upload, download, ctrl_c);

        let mut upload_done = false;
        loop {
            tokio::select! {
                sent = &mut upload, if !upload_done => {
                    upload_done = true;
                    match sent {
                        Ok(n) => debug!(bytes = n, "stdin closed, half-closing session"),
                        Err(e) => {
                            warn!("Failed to send to proxy: {}", e);
                            break;
                        }
                    }
                }
                received = &mut download => {
                    if let Err(e) = received {
                        warn!("Failed to receive from proxy: {}", e);
                    }
                    break;
                }
                _ = &mut ctrl_c => {
                    info!("Interrupted, closing session");
                    break;
                }
            }
        }
    }

    let mut session = reader.unsplit(writer);
    if let Err(e) = session.close().await {
        warn!("Error while closing session: {}", e);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    // stdout carries relayed data, logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .with_ansi(false),
        )
        .with(env_filter)
        .init();

    Ok(())
}
