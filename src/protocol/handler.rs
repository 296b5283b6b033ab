//! SOCKS5 Handshake Engine
//!
//! Drives one client-side negotiation over an already connected transport:
//! method selection, optional username/password auth, then CONNECT or
//! UDP ASSOCIATE. The transport is shut down on every failure path.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{AddressSpec, AuthMethod, Network, Socks5Command, Socks5Response};
use crate::config::{Credentials, DialOptions};
use crate::error::Socks5Error;
use crate::protocol::constants::*;
use crate::relay::Session;

const REPLY_DESCRIPTIONS: &[&str] = &[
    "succeeded",
    "general SOCKS server failure",
    "connection not allowed by ruleset",
    "network unreachable",
    "host unreachable",
    "connection refused",
    "TTL expired",
    "command not supported",
    "address type not supported",
];

fn describe_reply(code: u8) -> &'static str {
    REPLY_DESCRIPTIONS
        .get(code as usize)
        .copied()
        .unwrap_or("unknown reply code")
}

/// What has been agreed with the proxy so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationState {
    pub method: Option<AuthMethod>,
    pub authenticated: bool,
}

/// SOCKS5 client handshake over a single transport
pub struct Socks5Handshake<S> {
    stream: S,
    read_timeout: Duration,
    write_timeout: Duration,
    credentials: Option<Credentials>,
    state: NegotiationState,
}

impl<S> Socks5Handshake<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new handshake over the given stream
    pub fn new(stream: S, options: &DialOptions) -> Self {
        Self {
            stream,
            read_timeout: options.read_timeout,
            write_timeout: options.write_timeout,
            credentials: options.credentials.clone(),
            state: NegotiationState::default(),
        }
    }

    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Run the whole negotiation and hand the relayed stream to a [`Session`].
    pub async fn run(mut self, network: Network, target: &AddressSpec) -> Result<Session<S>, Socks5Error> {
        match self.negotiate(network, target).await {
            Ok(response) => {
                debug!(
                    network = %network,
                    target = %target,
                    bound = %response.bind,
                    "SOCKS5 handshake complete"
                );
                Ok(Session::new(self.stream, network, target.clone(), response.bind)
                    .with_pending(response.leftover))
            }
            Err(e) => {
                warn!(network = %network, target = %target, error = %e, "SOCKS5 handshake failed");
                // Best effort, the stream is dropped right after anyway
                let _ = self.stream.shutdown().await;
                Err(e)
            }
        }
    }

    async fn negotiate(&mut self, network: Network, target: &AddressSpec) -> Result<Socks5Response, Socks5Error> {
        let method = self.negotiate_method().await?;
        if method == AuthMethod::UserPass {
            self.authenticate().await?;
        }

        let command = Socks5Command::for_network(network, target);
        self.send_command(&command).await?;
        self.receive_reply().await
    }

    /// Offer no-auth (plus user/pass when configured) and read the selection
    pub async fn negotiate_method(&mut self) -> Result<AuthMethod, Socks5Error> {
        let mut greeting = vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_NONE];
        if self.credentials.is_some() {
            greeting[1] += 1;
            greeting.push(SOCKS5_AUTH_USERPASS);
        }
        debug!(methods = greeting[1], "Sending SOCKS5 greeting");
        self.write_frame("method negotiation", &greeting).await?;

        let mut reply = [0u8; 2];
        self.read_frame("method selection", &mut reply).await?;

        if reply[0] != SOCKS5_VERSION {
            return Err(Socks5Error::server_closed(format!(
                "invalid SOCKS version in method selection: {:#04x}",
                reply[0]
            )));
        }

        let method = match AuthMethod::from_code(reply[1]) {
            AuthMethod::Unsupported(SOCKS5_AUTH_UNSUPPORTED) => {
                return Err(Socks5Error::server_closed("no acceptable authentication method"));
            }
            AuthMethod::Unsupported(code) => {
                return Err(Socks5Error::server_closed(format!(
                    "server selected unsupported method {:#04x}",
                    code
                )));
            }
            method => method,
        };

        debug!(method = ?method, "SOCKS5 server selected method");
        self.state.method = Some(method);
        Ok(method)
    }

    /// Username/password sub-negotiation
    pub async fn authenticate(&mut self) -> Result<(), Socks5Error> {
        let credentials = self.credentials.clone();
        let (username, password) = match &credentials {
            Some(creds) => (creds.username(), creds.password()),
            None => ("", ""),
        };

        let mut request = BytesMut::with_capacity(3 + username.len() + password.len());
        request.put_u8(SOCKS5_USERPASS_VERSION);
        request.put_u8(username.len() as u8);
        request.put_slice(username.as_bytes());
        request.put_u8(password.len() as u8);
        request.put_slice(password.as_bytes());

        debug!(username = %username, "Sending SOCKS5 username/password");
        self.write_frame("authentication", &request).await?;

        let mut reply = [0u8; 2];
        self.read_frame("authentication", &mut reply).await?;

        if reply[0] != SOCKS5_USERPASS_VERSION {
            return Err(Socks5Error::server_closed(format!(
                "invalid auth response version: {:#04x}",
                reply[0]
            )));
        }
        if reply[1] != SOCKS5_USERPASS_SUCCESS {
            warn!(username = %username, status = reply[1], "SOCKS5 server rejected credentials");
            return Err(Socks5Error::AuthFailed);
        }

        self.state.authenticated = true;
        Ok(())
    }

    /// Send CONNECT or UDP ASSOCIATE
    pub async fn send_command(&mut self, command: &Socks5Command) -> Result<(), Socks5Error> {
        debug!(
            command = command.command_code(),
            address = %command.address(),
            "Sending SOCKS5 command"
        );
        let request = command.to_bytes();
        self.write_frame("command request", &request).await
    }

    /// Read the command reply. Only the status byte decides the outcome; the
    /// bound address is decoded when present and well formed.
    pub async fn receive_reply(&mut self) -> Result<Socks5Response, Socks5Error> {
        let stream = &mut self.stream;
        let read = async {
            let mut reply = vec![0u8; SOCKS5_REPLY_BUFFER_LEN];
            let mut n = stream.read(&mut reply).await?;
            // A reply split before the status byte still has to complete it
            while n < 2 {
                let more = stream.read(&mut reply[n..]).await?;
                if more == 0 {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
                }
                n += more;
            }
            reply.truncate(n);
            Ok::<_, io::Error>(reply)
        };

        let reply = deadline("command reply", self.read_timeout, read)
            .await
            .map_err(|e| map_read_error("command reply", e))?;

        let (version, status) = (reply[0], reply[1]);
        if status != SOCKS5_REPLY_SUCCESS {
            return Err(Socks5Error::server_closed(format!(
                "command failed: {} ({:#04x})",
                describe_reply(status),
                status
            )));
        }
        if version != SOCKS5_VERSION {
            debug!(version, "SOCKS5 reply carries unexpected version byte");
        }

        // VER REP RSV, then ATYP ADDR PORT
        let (bind, leftover) = match reply.get(3..).map(AddressSpec::from_bytes) {
            Some(Ok((bind, consumed))) => (bind, Bytes::copy_from_slice(&reply[3 + consumed..])),
            _ => {
                debug!(len = reply.len(), "SOCKS5 reply has no usable bound address");
                (AddressSpec::unspecified(), Bytes::new())
            }
        };

        Ok(Socks5Response {
            reply_code: status,
            bind,
            leftover,
        })
    }

    async fn write_frame(&mut self, phase: &'static str, frame: &[u8]) -> Result<(), Socks5Error> {
        let stream = &mut self.stream;
        deadline(phase, self.write_timeout, async {
            stream.write_all(frame).await?;
            stream.flush().await
        })
        .await
        .map_err(Socks5Error::Io)
    }

    async fn read_frame(&mut self, phase: &'static str, buf: &mut [u8]) -> Result<(), Socks5Error> {
        let stream = &mut self.stream;
        deadline(phase, self.read_timeout, async {
            stream.read_exact(buf).await.map(|_| ())
        })
        .await
        .map_err(|e| map_read_error(phase, e))
    }

    /// Get the underlying stream
    pub fn into_stream(self) -> S {
        self.stream
    }
}

async fn deadline<T, F>(phase: &'static str, limit: Duration, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} timed out after {:?}", phase, limit),
        )),
    }
}

/// Short or malformed replies are protocol violations, anything else is I/O
fn map_read_error(phase: &'static str, e: io::Error) -> Socks5Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            Socks5Error::server_closed(format!("{}: connection closed mid-reply", phase))
        }
        io::ErrorKind::InvalidData => Socks5Error::server_closed(format!("{}: {}", phase, e)),
        _ => Socks5Error::Io(e),
    }
}
