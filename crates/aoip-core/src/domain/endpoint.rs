//! The remote audio server endpoint.
//!
//! A [`ServerEndpoint`] is fixed for the lifetime of a stream session.  It is
//! validated once at construction, so the connection manager never has to
//! deal with an unparsable address or a zero port.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for endpoint construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// The address is not a dotted-quad IPv4 literal.
    #[error("invalid IPv4 address: '{0}'")]
    InvalidAddress(String),
    /// Port 0 cannot be connected to.
    #[error("port must be non-zero")]
    ZeroPort,
    /// The `address:port` string has no port component or the port is not a number.
    #[error("invalid endpoint '{0}': expected <ipv4>:<port>")]
    Malformed(String),
}

/// Address and TCP port of the remote audio server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerEndpoint {
    address: Ipv4Addr,
    port: u16,
}

impl ServerEndpoint {
    /// Builds an endpoint from an already-parsed address.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::ZeroPort`] when `port` is 0.
    pub fn new(address: Ipv4Addr, port: u16) -> Result<Self, EndpointError> {
        if port == 0 {
            return Err(EndpointError::ZeroPort);
        }
        Ok(Self { address, port })
    }

    /// Parses a dotted-quad address string and validates the port.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidAddress`] if `address` is not IPv4, or
    /// [`EndpointError::ZeroPort`] if `port` is 0.
    pub fn parse(address: &str, port: u16) -> Result<Self, EndpointError> {
        let ip = address
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|_| EndpointError::InvalidAddress(address.to_string()))?;
        Self::new(ip, port)
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The socket address to hand to `connect`.
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl FromStr for ServerEndpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::Malformed(s.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| EndpointError::Malformed(s.to_string()))?;
        Self::parse(host, port)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
