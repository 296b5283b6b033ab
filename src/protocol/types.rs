//! SOCKS5 Protocol Types
//!
//! Address codec plus the small enums the handshake engine works with.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Socks5Error;
use crate::protocol::constants::*;

/// Transport kind requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Udp,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Udp => "udp",
        }
    }
}

impl FromStr for Network {
    type Err = Socks5Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "udp" => Ok(Network::Udp),
            other => Err(Socks5Error::InvalidNetworkType(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target address types supported by SOCKS5
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

impl TargetAddr {
    /// Get the address type code for this address
    pub fn address_type(&self) -> u8 {
        match self {
            TargetAddr::Ipv4(_) => SOCKS5_ADDR_IPV4,
            TargetAddr::Ipv6(_) => SOCKS5_ADDR_IPV6,
            TargetAddr::Domain(_) => SOCKS5_ADDR_DOMAIN,
        }
    }

    /// Classify a host literal. IPv4-mapped IPv6 literals collapse to IPv4.
    pub fn parse_host(host: &str) -> Result<Self, Socks5Error> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(TargetAddr::Ipv4(ip));
        }
        if let Ok(ip) = host.parse::<Ipv6Addr>() {
            return Ok(match ip.to_ipv4_mapped() {
                Some(v4) => TargetAddr::Ipv4(v4),
                None => TargetAddr::Ipv6(ip),
            });
        }
        if host.is_empty() {
            return Err(Socks5Error::InvalidAddress("missing host".to_string()));
        }
        if host.len() > SOCKS5_MAX_FIELD_LEN {
            return Err(Socks5Error::InvalidAddress(format!(
                "domain name too long: {} bytes",
                host.len()
            )));
        }
        Ok(TargetAddr::Domain(host.to_string()))
    }

    fn encoded_len(&self) -> usize {
        match self {
            TargetAddr::Ipv4(_) => 4,
            TargetAddr::Ipv6(_) => 16,
            TargetAddr::Domain(domain) => 1 + domain.len(),
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ipv4(ip) => write!(f, "{}", ip),
            TargetAddr::Ipv6(ip) => write!(f, "[{}]", ip),
            TargetAddr::Domain(domain) => f.write_str(domain),
        }
    }
}

/// A SOCKS5 encoded destination: address plus big-endian port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpec {
    pub addr: TargetAddr,
    pub port: u16,
}

impl AddressSpec {
    pub fn new(addr: TargetAddr, port: u16) -> Self {
        Self { addr, port }
    }

    /// `0.0.0.0:0`, the wildcard sent with UDP ASSOCIATE
    pub fn unspecified() -> Self {
        Self::new(TargetAddr::Ipv4(Ipv4Addr::UNSPECIFIED), 0)
    }

    pub fn from_socket_addr(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::new(TargetAddr::Ipv4(*v4.ip()), v4.port()),
            SocketAddr::V6(v6) => Self::new(TargetAddr::Ipv6(*v6.ip()), v6.port()),
        }
    }

    pub fn address_type(&self) -> u8 {
        self.addr.address_type()
    }

    /// ATYP + address + port
    pub fn serialized_len(&self) -> usize {
        1 + self.addr.encoded_len() + 2
    }

    pub fn write_to_buf(&self, buf: &mut BytesMut) {
        buf.reserve(self.serialized_len());
        buf.put_u8(self.address_type());
        match &self.addr {
            TargetAddr::Ipv4(ip) => buf.put_slice(&ip.octets()),
            TargetAddr::Ipv6(ip) => buf.put_slice(&ip.octets()),
            TargetAddr::Domain(domain) => {
                // parse_host guarantees the length fits
                buf.put_u8(domain.len() as u8);
                buf.put_slice(domain.as_bytes());
            }
        }
        buf.put_u16(self.port);
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.write_to_buf(&mut buf);
        buf
    }

    /// Decode `ATYP ADDR PORT` from the front of `buf`, returning the
    /// address and the number of bytes consumed.
    pub fn from_bytes(buf: &[u8]) -> Result<(Self, usize), Socks5Error> {
        let truncated = || Socks5Error::InvalidAddress("truncated address".to_string());

        let (&atyp, rest) = buf.split_first().ok_or_else(truncated)?;
        let (addr, addr_len) = match atyp {
            SOCKS5_ADDR_IPV4 => {
                let octets: [u8; 4] = rest
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(truncated)?;
                (TargetAddr::Ipv4(Ipv4Addr::from(octets)), 4)
            }
            SOCKS5_ADDR_IPV6 => {
                let octets: [u8; 16] = rest
                    .get(..16)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(truncated)?;
                (TargetAddr::Ipv6(Ipv6Addr::from(octets)), 16)
            }
            SOCKS5_ADDR_DOMAIN => {
                let len = *rest.first().ok_or_else(truncated)? as usize;
                let name = rest.get(1..1 + len).ok_or_else(truncated)?;
                let domain = String::from_utf8(name.to_vec()).map_err(|e| {
                    Socks5Error::InvalidAddress(format!("invalid UTF-8 in domain name: {}", e))
                })?;
                (TargetAddr::Domain(domain), 1 + len)
            }
            other => {
                return Err(Socks5Error::InvalidAddress(format!(
                    "unsupported address type: {:#04x}",
                    other
                )))
            }
        };

        let port_bytes = rest.get(addr_len..addr_len + 2).ok_or_else(truncated)?;
        let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
        Ok((Self::new(addr, port), 1 + addr_len + 2))
    }

    /// Read `ATYP ADDR PORT` from a stream
    pub async fn read_from<R>(stream: &mut R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let atyp = stream.read_u8().await?;
        let addr = match atyp {
            SOCKS5_ADDR_IPV4 => {
                let mut octets = [0u8; 4];
                stream.read_exact(&mut octets).await?;
                TargetAddr::Ipv4(Ipv4Addr::from(octets))
            }
            SOCKS5_ADDR_IPV6 => {
                let mut octets = [0u8; 16];
                stream.read_exact(&mut octets).await?;
                TargetAddr::Ipv6(Ipv6Addr::from(octets))
            }
            SOCKS5_ADDR_DOMAIN => {
                let len = stream.read_u8().await? as usize;
                let mut name = vec![0u8; len];
                stream.read_exact(&mut name).await?;
                let domain = String::from_utf8(name).map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid UTF-8 in domain name: {}", e),
                    )
                })?;
                TargetAddr::Domain(domain)
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsupported address type: {:#04x}", other),
                ))
            }
        };
        let port = stream.read_u16().await?;
        Ok(Self::new(addr, port))
    }
}

impl FromStr for AddressSpec {
    type Err = Socks5Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = split_host_port(s)?;
        let port = port
            .parse::<u16>()
            .map_err(|_| Socks5Error::InvalidAddress(format!("invalid port in {:?}", s)))?;
        Ok(Self::new(TargetAddr::parse_host(host)?, port))
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Split `host:port` or `[v6]:port`
fn split_host_port(s: &str) -> Result<(&str, &str), Socks5Error> {
    let invalid = |reason: &str| Socks5Error::InvalidAddress(format!("{} in {:?}", reason, s));

    if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid("missing ']'"))?;
        let port = tail.strip_prefix(':').ok_or_else(|| invalid("missing port"))?;
        return Ok((host, port));
    }

    let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.contains(':') {
        return Err(invalid("too many colons"));
    }
    Ok((host, port))
}

/// Authentication methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    NoAuth,
    UserPass,
    Unsupported(u8),
}

impl AuthMethod {
    /// Convert to method code
    pub fn method_code(&self) -> u8 {
        match self {
            AuthMethod::NoAuth => SOCKS5_AUTH_NONE,
            AuthMethod::UserPass => SOCKS5_AUTH_USERPASS,
            AuthMethod::Unsupported(code) => *code,
        }
    }

    /// Create from method code
    pub fn from_code(code: u8) -> Self {
        match code {
            SOCKS5_AUTH_NONE => AuthMethod::NoAuth,
            SOCKS5_AUTH_USERPASS => AuthMethod::UserPass,
            other => AuthMethod::Unsupported(other),
        }
    }
}

/// SOCKS5 commands issued by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Socks5Command {
    Connect(AddressSpec),
    UdpAssociate(AddressSpec),
}

impl Socks5Command {
    /// CONNECT to the target, or UDP ASSOCIATE from the wildcard endpoint
    pub fn for_network(network: Network, target: &AddressSpec) -> Self {
        match network {
            Network::Tcp => Socks5Command::Connect(target.clone()),
            Network::Udp => Socks5Command::UdpAssociate(AddressSpec::unspecified()),
        }
    }

    /// Get the command code for this command
    pub fn command_code(&self) -> u8 {
        match self {
            Socks5Command::Connect(_) => SOCKS5_CMD_CONNECT,
            Socks5Command::UdpAssociate(_) => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }

    pub fn address(&self) -> &AddressSpec {
        match self {
            Socks5Command::Connect(addr) | Socks5Command::UdpAssociate(addr) => addr,
        }
    }

    /// VER CMD RSV ATYP ADDR PORT
    pub fn to_bytes(&self) -> BytesMut {
        let addr = self.address();
        let mut buf = BytesMut::with_capacity(3 + addr.serialized_len());
        buf.put_slice(&[SOCKS5_VERSION, self.command_code(), SOCKS5_RESERVED]);
        addr.write_to_buf(&mut buf);
        buf
    }
}

/// SOCKS5 command reply
#[derive(Debug, Clone)]
pub struct Socks5Response {
    pub reply_code: u8,
    pub bind: AddressSpec,
    /// Relayed bytes that arrived in the same read as the reply
    pub leftover: Bytes,
}
