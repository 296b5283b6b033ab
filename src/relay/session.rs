//! Relay Session
//!
//! The connection handed back to the caller once the proxy has accepted the
//! command. TCP sessions pass bytes straight through; UDP sessions prefix
//! every outbound write with the SOCKS5 UDP request header.

use std::future::{poll_fn, Future};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{sleep_until, Instant, Sleep};
use tracing::{debug, info};

use crate::error::Socks5Error;
use crate::protocol::{AddressSpec, Network, SOCKS5_RESERVED, SOCKS5_UDP_FRAG_NONE};

/// An established SOCKS5 relay.
///
/// Implements [`AsyncRead`] and [`AsyncWrite`], so it plugs into
/// `tokio::io::copy`, `BufReader`, `split` and the rest of tokio's io tooling.
#[derive(Debug)]
pub struct Session<S = TcpStream> {
    stream: Option<S>,
    network: Network,
    target: AddressSpec,
    bound: AddressSpec,
    header: Option<Bytes>,
    // relayed bytes that arrived together with the command reply
    pending: Bytes,
    // UDP frame not yet fully handed to the transport
    write_buf: BytesMut,
    frame_payload: usize,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
    read_timer: Option<Pin<Box<Sleep>>>,
    write_timer: Option<Pin<Box<Sleep>>>,
    start_time: Instant,
    bytes_read: u64,
    bytes_written: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream the proxy has already accepted a command on
    pub fn new(stream: S, network: Network, target: AddressSpec, bound: AddressSpec) -> Self {
        let header = match network {
            Network::Tcp => None,
            Network::Udp => Some(udp_header(&target)),
        };
        debug!(network = %network, target = %target, bound = %bound, "Creating relay session");

        Self {
            stream: Some(stream),
            network,
            target,
            bound,
            header,
            pending: Bytes::new(),
            write_buf: BytesMut::new(),
            frame_payload: 0,
            read_deadline: None,
            write_deadline: None,
            read_timer: None,
            write_timer: None,
            start_time: Instant::now(),
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Bytes to hand out before anything is read from the transport
    pub fn with_pending(mut self, pending: Bytes) -> Self {
        self.pending = pending;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn is_udp(&self) -> bool {
        self.header.is_some()
    }

    /// Destination the proxy relays to
    pub fn target(&self) -> &AddressSpec {
        &self.target
    }

    /// Address/port the proxy reported in its command reply
    pub fn bound_addr(&self) -> &AddressSpec {
        &self.bound
    }

    /// Prefix added to every UDP write, `None` for TCP
    pub fn udp_header(&self) -> Option<&[u8]> {
        self.header.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Flush any partly written UDP frame, shut down and release the
    /// transport. Closing again is a no-op.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        let drained = poll_fn(|cx| self.poll_drain_frame(cx)).await;

        match self.stream.take() {
            Some(mut stream) => {
                self.log_stats();
                let shutdown = stream.shutdown().await;
                drained.and(shutdown)
            }
            None => drained,
        }
    }

    /// Set both deadlines; `None` clears them
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }

    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline;
        self.read_timer = None;
    }

    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.write_deadline = deadline;
        self.write_timer = None;
    }

    pub fn read_deadline(&self) -> Option<Instant> {
        self.read_deadline
    }

    pub fn write_deadline(&self) -> Option<Instant> {
        self.write_deadline
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take the raw stream back. UDP framing is not applied past this point.
    pub fn into_inner(mut self) -> io::Result<S> {
        self.stream.take().ok_or_else(not_connected)
    }

    fn poll_drain_frame(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.write_buf.is_empty() {
            let stream = self.stream.as_mut().ok_or_else(not_connected)?;
            let n = ready!(Pin::new(stream).poll_write(cx, &self.write_buf))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.write_buf.advance(n);
        }
        Poll::Ready(Ok(()))
    }

    fn log_stats(&self) {
        info!(
            network = %self.network,
            target = %self.target,
            duration_ms = self.duration().as_millis() as u64,
            bytes_read = self.bytes_read,
            bytes_written = self.bytes_written,
            "Relay session closed"
        );
    }
}

impl Session<TcpStream> {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.as_ref().ok_or_else(not_connected)?.local_addr()
    }

    /// Address of the proxy server
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.as_ref().ok_or_else(not_connected)?.peer_addr()
    }
}

/// Inbound UDP frames still carry their header, see [`strip_udp_header`].
impl<S> AsyncRead for Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let stream = this.stream.as_mut().ok_or_else(not_connected)?;
        poll_deadline(this.read_deadline, &mut this.read_timer, cx)?;

        if !this.pending.is_empty() {
            let n = this.pending.len().min(buf.remaining());
            buf.put_slice(&this.pending.split_to(n));
            this.bytes_read += n as u64;
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(stream).poll_read(cx, buf))?;
        this.bytes_read += (buf.filled().len() - before) as u64;
        Poll::Ready(Ok(()))
    }
}

/// A UDP session turns each write into one `header + payload` frame and
/// reports the payload length once the whole frame is on the wire.
impl<S> AsyncWrite for Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.stream.is_none() {
            return Poll::Ready(Err(not_connected()));
        }
        poll_deadline(this.write_deadline, &mut this.write_timer, cx)?;

        let n = match this.header.clone() {
            None => {
                let stream = this.stream.as_mut().ok_or_else(not_connected)?;
                ready!(Pin::new(stream).poll_write(cx, buf))?
            }
            Some(header) => {
                if this.write_buf.is_empty() {
                    this.write_buf.reserve(header.len() + buf.len());
                    this.write_buf.put_slice(&header);
                    this.write_buf.put_slice(buf);
                    this.frame_payload = buf.len();
                }
                ready!(this.poll_drain_frame(cx))?;
                std::mem::take(&mut this.frame_payload)
            }
        };
        this.bytes_written += n as u64;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.stream.is_none() {
            return Poll::Ready(Err(not_connected()));
        }
        poll_deadline(this.write_deadline, &mut this.write_timer, cx)?;
        ready!(this.poll_drain_frame(cx))?;

        let stream = this.stream.as_mut().ok_or_else(not_connected)?;
        Pin::new(stream).poll_flush(cx)
    }

    /// Shuts down the write half only; relayed bytes can still be read
    /// until [`Session::close`].
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.stream.is_none() {
            return Poll::Ready(Ok(()));
        }
        ready!(this.poll_drain_frame(cx))?;

        let stream = this.stream.as_mut().ok_or_else(not_connected)?;
        Pin::new(stream).poll_shutdown(cx)
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "session is closed")
}

/// RSV RSV FRAG followed by the encoded target
fn udp_header(target: &AddressSpec) -> Bytes {
    let mut header = BytesMut::with_capacity(3 + target.serialized_len());
    header.put_slice(&[SOCKS5_RESERVED, SOCKS5_RESERVED, SOCKS5_UDP_FRAG_NONE]);
    target.write_to_buf(&mut header);
    header.freeze()
}

/// Split a relayed UDP frame into its source address and payload.
/// Fragmented frames are rejected.
pub fn strip_udp_header(frame: &[u8]) -> Result<(AddressSpec, &[u8]), Socks5Error> {
    if frame.len() < 3 {
        return Err(Socks5Error::server_closed("UDP frame shorter than its header"));
    }
    if frame[0] != SOCKS5_RESERVED || frame[1] != SOCKS5_RESERVED {
        return Err(Socks5Error::server_closed("non-zero reserved bytes in UDP frame"));
    }
    if frame[2] != SOCKS5_UDP_FRAG_NONE {
        return Err(Socks5Error::server_closed(format!(
            "fragmented UDP frame (frag {:#04x})",
            frame[2]
        )));
    }

    let (source, consumed) = AddressSpec::from_bytes(&frame[3..])
        .map_err(|e| Socks5Error::server_closed(format!("UDP frame: {}", e)))?;
    Ok((source, &frame[3 + consumed..]))
}

/// Fails once `deadline` has passed, otherwise arms `timer` so the task is
/// woken when it does.
fn poll_deadline(
    deadline: Option<Instant>,
    timer: &mut Option<Pin<Box<Sleep>>>,
    cx: &mut Context<'_>,
) -> io::Result<()> {
    let Some(deadline) = deadline else {
        return Ok(());
    };
    if Instant::now() >= deadline {
        return Err(deadline_exceeded());
    }
    let timer = timer.get_or_insert_with(|| Box::pin(sleep_until(deadline)));
    match timer.as_mut().poll(cx) {
        Poll::Ready(()) => Err(deadline_exceeded()),
        Poll::Pending => Ok(()),
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded")
}
