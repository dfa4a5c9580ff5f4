//! ConnectionManager: connects to the audio server, performs the registration
//! handshake, and releases the socket when a stream ends.
//!
//! # Connection lifecycle
//!
//! ```text
//!   connect()          register()             release()
//!  ──────────► connected ──────────► registered ──────────► released
//!                  │                                            ▲
//!                  └────────────────────────────────────────────┘
//! ```
//!
//! A [`Connection`] is never reconnected.  Each stream gets a fresh one from
//! [`ConnectionManager::connect`] and gives it back via
//! [`ConnectionManager::release`].

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use aoip_core::{encode_registration, DeviceCapabilities, ProtocolError, ServerEndpoint};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::socket::{Connector, StreamSocket};

/// Error type for [`ConnectionManager::connect`].
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {endpoint} timed out")]
    Timeout { endpoint: ServerEndpoint },
    #[error("connect to {endpoint} failed: {source}")]
    Io {
        endpoint: ServerEndpoint,
        #[source]
        source: io::Error,
    },
}

/// Error type for [`ConnectionManager::register`].
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("connection has no socket")]
    NotConnected,
    #[error(transparent)]
    Encode(#[from] ProtocolError),
    #[error("registration write failed: {0}")]
    Write(#[source] io::Error),
    #[error("server stopped accepting the registration after {written} of {total} bytes")]
    WriteZero { written: usize, total: usize },
}

/// One TCP connection to the audio server, owned by a single stream session.
pub struct Connection {
    endpoint: ServerEndpoint,
    socket: Option<Box<dyn StreamSocket>>,
    registered: bool,
}

impl Connection {
    pub fn endpoint(&self) -> ServerEndpoint {
        self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Local IPv4 address of the socket, `None` once released.
    pub fn local_ipv4(&self) -> Option<Ipv4Addr> {
        self.socket.as_ref().and_then(|s| s.local_ipv4())
    }

    /// Switches the socket between blocking and non-blocking mode.
    ///
    /// # Errors
    ///
    /// [`io::ErrorKind::NotConnected`] if the socket has been released, or
    /// whatever the OS reports.
    pub fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        match self.socket.as_mut() {
            Some(socket) => socket.set_nonblocking(nonblocking),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    /// Mutable access to the socket for the frame transport.
    pub(crate) fn socket_mut(&mut self) -> Option<&mut Box<dyn StreamSocket>> {
        self.socket.as_mut()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.socket.is_some())
            .field("registered", &self.registered)
            .finish()
    }
}

/// Creates, registers and releases [`Connection`]s.
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Opens a new connection to `endpoint`.
    ///
    /// The returned connection has a socket and `registered == false`.
    ///
    /// # Errors
    ///
    /// [`ConnectError::Timeout`] or [`ConnectError::Io`]; in both cases no
    /// socket remains open.
    pub fn connect(&self, endpoint: &ServerEndpoint) -> Result<Connection, ConnectError> {
        debug!("connecting to audio server at {}", endpoint);
        let socket = self.connector.connect(endpoint).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => ConnectError::Timeout {
                endpoint: *endpoint,
            },
            _ => ConnectError::Io {
                endpoint: *endpoint,
                source: e,
            },
        })?;
        info!("connected to audio server at {}", endpoint);
        Ok(Connection {
            endpoint: *endpoint,
            socket: Some(socket),
            registered: false,
        })
    }

    /// Sends the `REGISTER` message once per connection.
    ///
    /// Calling this on an already-registered connection writes nothing.  The
    /// message is written in full: short and interrupted writes are retried
    /// until every byte is out.  The socket is still in blocking mode here.
    ///
    /// # Errors
    ///
    /// Any [`RegisterError`].  `registered` stays `false` on error.
    pub fn register(
        &self,
        connection: &mut Connection,
        capabilities: &DeviceCapabilities,
    ) -> Result<(), RegisterError> {
        if connection.registered {
            debug!("connection to {} already registered", connection.endpoint);
            return Ok(());
        }
        let socket = connection
            .socket
            .as_mut()
            .ok_or(RegisterError::NotConnected)?;

        let payload = encode_registration(capabilities)?;
        write_fully(socket.as_mut(), &payload)?;

        connection.registered = true;
        info!(
            "registered '{}' ({}) with {}",
            capabilities.device_name, capabilities.ip_address, connection.endpoint
        );
        Ok(())
    }

    /// Closes the connection's socket.  Safe to call any number of times.
    pub fn release(&self, connection: &mut Connection) {
        connection.registered = false;
        if let Some(mut socket) = connection.socket.take() {
            if let Err(e) = socket.shutdown() {
                warn!("closing connection to {}: {}", connection.endpoint, e);
            }
            debug!("released connection to {}", connection.endpoint);
        }
    }
}

fn write_fully(socket: &mut dyn StreamSocket, payload: &[u8]) -> Result<(), RegisterError> {
    let mut written = 0;
    while written < payload.len() {
        match socket.try_write(&payload[written..]) {
            Ok(0) => {
                return Err(RegisterError::WriteZero {
                    written,
                    total: payload.len(),
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RegisterError::Write(e)),
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
