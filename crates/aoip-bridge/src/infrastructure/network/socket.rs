//! The socket seam between the bridge and the operating system.
//!
//! [`StreamSocket`] is the smallest set of calls the bridge makes on a
//! connected stream socket.  Production code uses [`std::net::TcpStream`];
//! tests use [`super::mock::MockSocket`], which counts every call.
//!
//! [`Connector`] creates sockets.  It is the only place that blocks, and only
//! for as long as the configured connect timeout.

use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use aoip_core::ServerEndpoint;
use tracing::debug;

/// A connected, bidirectional byte stream.
pub trait StreamSocket: Send {
    /// One write attempt.  In non-blocking mode this returns
    /// [`io::ErrorKind::WouldBlock`] instead of waiting.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// One read attempt.  `Ok(0)` with a non-empty buffer means end of stream.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()>;

    /// Local IPv4 address of the socket, if it has one.
    fn local_ipv4(&self) -> Option<Ipv4Addr>;

    /// Shuts down both directions.  The descriptor itself is released on drop.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl StreamSocket for TcpStream {
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn local_ipv4(&self) -> Option<Ipv4Addr> {
        match self.local_addr().ok()?.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(ip) => ip.to_ipv4_mapped(),
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Creates connected sockets.
pub trait Connector: Send + Sync {
    /// Connects to `endpoint`.  On error no socket is left open.
    fn connect(&self, endpoint: &ServerEndpoint) -> io::Result<Box<dyn StreamSocket>>;
}

/// [`Connector`] backed by blocking `TcpStream::connect_timeout`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, endpoint: &ServerEndpoint) -> io::Result<Box<dyn StreamSocket>> {
        let addr = SocketAddr::V4(endpoint.socket_addr());
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        // Each period goes out as soon as it is written.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", endpoint, e);
        }
        Ok(Box::new(stream))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
