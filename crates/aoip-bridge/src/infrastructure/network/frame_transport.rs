//! Non-blocking movement of audio bytes across a [`Connection`].
//!
//! Each call makes exactly one attempt on the socket.  "Nothing moved right
//! now" is a normal outcome on the audio path, so would-block and interrupted
//! calls are reported as `Ok(0)` rather than as errors.  Retrying is the
//! caller's business: the host audio stack calls again on the next period.

use std::io;

use thiserror::Error;

use super::connection_manager::Connection;

/// Error type for [`send`] and [`recv`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection has no socket (never connected or already released).
    #[error("connection is not open")]
    NotConnected,
    /// The server closed its end of the stream.
    #[error("server closed the connection")]
    Closed,
    /// Any other socket error.
    #[error("socket error: {0}")]
    Fatal(#[source] io::Error),
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Writes as much of `buf` as the socket accepts right now.
///
/// Returns the number of bytes accepted, which may be anything from 0 to
/// `buf.len()`.
///
/// # Errors
///
/// [`TransportError::NotConnected`] without touching any socket when the
/// connection has been released; [`TransportError::Fatal`] for socket errors.
pub fn send(connection: &mut Connection, buf: &[u8]) -> Result<usize, TransportError> {
    let socket = connection
        .socket_mut()
        .ok_or(TransportError::NotConnected)?;
    match socket.try_write(buf) {
        Ok(n) => Ok(n),
        Err(e) if is_transient(&e) => Ok(0),
        Err(e) => Err(TransportError::Fatal(e)),
    }
}

/// Reads whatever is available into `buf`.
///
/// Returns 0 when no data is available yet.  An empty `buf` returns 0 without
/// a socket call.
///
/// # Errors
///
/// [`TransportError::NotConnected`] as for [`send`];
/// [`TransportError::Closed`] on end of stream;
/// [`TransportError::Fatal`] for socket errors.
pub fn recv(connection: &mut Connection, buf: &mut [u8]) -> Result<usize, TransportError> {
    let socket = connection
        .socket_mut()
        .ok_or(TransportError::NotConnected)?;
    if buf.is_empty() {
        return Ok(0);
    }
    match socket.try_read(buf) {
        Ok(0) => Err(TransportError::Closed),
        Ok(n) => Ok(n),
        Err(e) if is_transient(&e) => Ok(0),
        Err(e) => Err(TransportError::Fatal(e)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
