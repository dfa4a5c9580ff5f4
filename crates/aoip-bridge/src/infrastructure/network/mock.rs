//! Mock connector and socket for unit and integration testing.
//!
//! Allows tests to script what the "server" does (accept N bytes, would-block,
//! deliver data, hang up) and to count every socket call the bridge makes,
//! without opening a real socket.
//!
//! A [`MockConnector`] and every [`MockSocket`] it hands out share one state
//! block, so a test keeps a clone of the connector and inspects the counters
//! after the code under test has consumed the socket.

use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

use aoip_core::ServerEndpoint;

use super::socket::{Connector, StreamSocket};

/// Scripted outcome of one `try_write` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedWrite {
    /// Accept at most this many bytes.
    Accept(usize),
    WouldBlock,
    Interrupted,
    Error(io::ErrorKind),
}

/// Scripted outcome of one `try_read` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRead {
    /// Deliver these bytes.  Whatever does not fit the caller's buffer stays
    /// at the front of the script for the next read, as on a real stream.
    Data(Vec<u8>),
    WouldBlock,
    /// Peer closed the stream.
    Eof,
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct MockState {
    connect_failure: Option<io::ErrorKind>,
    local_ip: Option<Ipv4Addr>,
    connects: u32,
    writes: u32,
    reads: u32,
    shutdowns: u32,
    nonblocking: bool,
    written: Vec<u8>,
    write_script: VecDeque<ScriptedWrite>,
    read_script: VecDeque<ScriptedRead>,
}

/// A mock implementation of [`Connector`].
///
/// Unscripted writes accept everything; unscripted reads would-block.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("lock poisoned")
    }

    /// Makes every subsequent `connect` fail with `kind`.
    pub fn fail_connect_with(&self, kind: io::ErrorKind) {
        self.state().connect_failure = Some(kind);
    }

    /// Local address reported by sockets from this connector.
    pub fn set_local_ip(&self, ip: Ipv4Addr) {
        self.state().local_ip = Some(ip);
    }

    pub fn script_write(&self, outcome: ScriptedWrite) {
        self.state().write_script.push_back(outcome);
    }

    pub fn script_read(&self, outcome: ScriptedRead) {
        self.state().read_script.push_back(outcome);
    }

    pub fn connect_count(&self) -> u32 {
        self.state().connects
    }

    pub fn write_count(&self) -> u32 {
        self.state().writes
    }

    pub fn read_count(&self) -> u32 {
        self.state().reads
    }

    pub fn shutdown_count(&self) -> u32 {
        self.state().shutdowns
    }

    /// Writes plus reads plus shutdowns.  Mode changes are not counted.
    pub fn io_call_count(&self) -> u32 {
        let state = self.state();
        state.writes + state.reads + state.shutdowns
    }

    pub fn is_nonblocking(&self) -> bool {
        self.state().nonblocking
    }

    /// Every byte accepted by `try_write` so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    /// Forgets the bytes written so far (counters are kept).
    pub fn clear_written(&self) {
        self.state().written.clear();
    }
}

impl Connector for MockConnector {
    fn connect(&self, _endpoint: &ServerEndpoint) -> io::Result<Box<dyn StreamSocket>> {
        let mut state = self.state();
        if let Some(kind) = state.connect_failure {
            return Err(io::Error::from(kind));
        }
        state.connects += 1;
        Ok(Box::new(MockSocket {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Socket handed out by [`MockConnector`].
#[derive(Debug)]
pub struct MockSocket {
    state: Arc<Mutex<MockState>>,
}

impl MockSocket {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("lock poisoned")
    }
}

impl StreamSocket for MockSocket {
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.writes += 1;
        let outcome = state
            .write_script
            .pop_front()
            .unwrap_or(ScriptedWrite::Accept(usize::MAX));
        match outcome {
            ScriptedWrite::Accept(limit) => {
                let n = limit.min(buf.len());
                state.written.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            ScriptedWrite::WouldBlock => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            ScriptedWrite::Interrupted => Err(io::Error::from(io::ErrorKind::Interrupted)),
            ScriptedWrite::Error(kind) => Err(io::Error::from(kind)),
        }
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.reads += 1;
        match state.read_script.pop_front() {
            Some(ScriptedRead::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    data.drain(..n);
                    state.read_script.push_front(ScriptedRead::Data(data));
                }
                Ok(n)
            }
            Some(ScriptedRead::Eof) => Ok(0),
            Some(ScriptedRead::Error(kind)) => Err(io::Error::from(kind)),
            Some(ScriptedRead::WouldBlock) | None => {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
        }
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.state().nonblocking = nonblocking;
        Ok(())
    }

    fn local_ipv4(&self) -> Option<Ipv4Addr> {
        self.state().local_ip
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.state().shutdowns += 1;
        Ok(())
    }
}
