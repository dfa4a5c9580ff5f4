//! Network infrastructure: the TCP link to the audio server.
//!
//! - **`socket`** – The [`socket::StreamSocket`] / [`socket::Connector`] seam
//!   and its `TcpStream` implementation.
//! - **`connection_manager`** – Connect, register, release.
//! - **`frame_transport`** – One non-blocking send or receive per call.
//! - **`mock`** – Scriptable connector/socket pair used by tests.

pub mod connection_manager;
pub mod frame_transport;
pub mod mock;
pub mod socket;

pub use connection_manager::{ConnectError, Connection, ConnectionManager, RegisterError};
pub use frame_transport::TransportError;
pub use socket::{Connector, StreamSocket, TcpConnector};
