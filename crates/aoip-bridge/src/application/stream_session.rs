//! StreamSession: the per-stream state machine that binds one server
//! connection to one adapter chain.
//!
//! # State machine
//!
//! ```text
//!          open()                         register + init adapters
//!  Idle ───────────► Connecting ──────► Registering ────────────► Active
//!   │                    │ connect failed                            │
//!   │ close()            ▼                                           │ close()
//!   └──────────────► Closed ◄──────────── Closing ◄──────────────────┘
//! ```
//!
//! Only `Active` allows frame I/O.  `Closed` is terminal.
//!
//! # What is fatal and what is not
//!
//! Only a failed connect aborts `open()`.  A failed registration, a failed
//! adapter, or a failed cleanup is logged, recorded as a [`SessionWarning`]
//! and otherwise ignored, so audio keeps flowing whenever the socket does.
//!
//! # Forced teardown
//!
//! When the server hangs up, or the socket fails `max_transport_failures`
//! times in a row, the session cleans up its adapters and releases the
//! connection on its own.  It stays `Active` so the host can keep calling;
//! every further transfer reports [`SessionError::NotConnected`] until the
//! host closes the stream.
//!
//! # Packets on a byte stream
//!
//! When an active adapter adds framing (an RTP header), every outbound
//! packet goes out behind a two-byte length ([`aoip_core::protocol::framing`])
//! and the inbound side reassembles whole packets before the adapters see
//! them:
//!
//! ```text
//!  send:  payload ─► adapters ─► [len][packet] ─► pending tail ─► socket
//!  recv:  socket ─► reassembly ─► whole packets ─► adapters ─► payload queue ─► host
//! ```
//!
//! A packet the socket took only part of is finished before the next one
//! starts, so the receiver never sees a header in the middle of a payload.
//! Without framing adapters the stream is raw interleaved PCM.

use std::fmt;
use std::sync::Arc;

use aoip_core::{
    decode_frame, write_frame_prefix, CapabilityTemplate, FrameFormat, FramingError,
    ServerEndpoint, StreamDirection, FRAME_PREFIX_LEN, MAX_FRAMED_PACKET,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::adapter_chain::AdapterChain;
use super::device_control::DeviceControl;
use super::protocol_adapter::SessionContext;
use crate::infrastructure::network::frame_transport::{self, TransportError};
use crate::infrastructure::network::{ConnectError, Connection, ConnectionManager};

/// Default number of consecutive socket failures that trigger a teardown.
pub const DEFAULT_MAX_TRANSPORT_FAILURES: u32 = 3;

/// Smallest read attempted when adapters sit on the inbound path.
const RECV_CHUNK: usize = 16 * 1024;

/// Lifecycle state of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Registering,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Registering => "registering",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device is administratively disabled")]
    DeviceDisabled,
    #[error("cannot {operation} while {state}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// The connection was torn down; nothing moves until the stream is reopened.
    #[error("connection to the audio server is gone")]
    NotConnected,
}

/// A contained failure.  The session kept going after each of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionWarning {
    Registration(String),
    AdapterInit {
        adapter: &'static str,
        reason: String,
    },
    /// `direction` is `Playback` for outbound packets, `Capture` for inbound.
    AdapterProcess {
        adapter: &'static str,
        direction: StreamDirection,
        reason: String,
    },
    AdapterCleanup {
        adapter: &'static str,
        reason: String,
    },
    ConnectionLost(String),
}

impl fmt::Display for SessionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionWarning::Registration(reason) => write!(f, "registration failed: {reason}"),
            SessionWarning::AdapterInit { adapter, reason } => {
                write!(f, "adapter '{adapter}' init failed: {reason}")
            }
            SessionWarning::AdapterProcess {
                adapter,
                direction,
                reason,
            } => write!(f, "adapter '{adapter}' failed on {direction} path: {reason}"),
            SessionWarning::AdapterCleanup { adapter, reason } => {
                write!(f, "adapter '{adapter}' cleanup failed: {reason}")
            }
            SessionWarning::ConnectionLost(reason) => write!(f, "connection lost: {reason}"),
        }
    }
}

/// Immutable parameters of one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: ServerEndpoint,
    pub direction: StreamDirection,
    pub format: FrameFormat,
    pub capabilities: CapabilityTemplate,
    pub max_transport_failures: u32,
}

/// One open audio stream's bridging state.
pub struct StreamSession {
    config: SessionConfig,
    control: Arc<DeviceControl>,
    connections: ConnectionManager,
    state: SessionState,
    connection: Option<Connection>,
    adapters: AdapterChain,
    warnings: Vec<SessionWarning>,
    consecutive_failures: u32,
    /// Packets carry a length prefix; fixed at `open`.
    framed: bool,
    /// Largest frame-aligned payload that fits one framed packet.
    max_packet_payload: usize,
    /// Outbound packet being written, and how much of it is out.
    tx: Vec<u8>,
    tx_sent: usize,
    /// Inbound bytes not yet forming a whole packet.
    rx: Vec<u8>,
    /// Decoded payload waiting for the host.
    rx_payload: Vec<u8>,
}

impl StreamSession {
    pub fn new(
        config: SessionConfig,
        control: Arc<DeviceControl>,
        connections: ConnectionManager,
        adapters: AdapterChain,
    ) -> Self {
        Self {
            config,
            control,
            connections,
            state: SessionState::Idle,
            connection: None,
            adapters,
            warnings: Vec::new(),
            consecutive_failures: 0,
            framed: false,
            max_packet_payload: 0,
            tx: Vec::new(),
            tx_sent: 0,
            rx: Vec::new(),
            rx_payload: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn direction(&self) -> StreamDirection {
        self.config.direction
    }

    pub fn format(&self) -> FrameFormat {
        self.config.format
    }

    /// Contained failures recorded so far, oldest first.
    pub fn warnings(&self) -> &[SessionWarning] {
        &self.warnings
    }

    /// `true` while a live connection is attached.
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_connected)
    }

    /// Names of the adapters still processing packets.
    pub fn active_adapters(&self) -> Vec<&'static str> {
        self.adapters.active_names()
    }

    /// Connects, registers, initializes adapters and enters `Active`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::DeviceDisabled`] with no network activity; the
    ///   session stays `Idle`.
    /// - [`SessionError::InvalidState`] unless `Idle`.
    /// - [`SessionError::Connect`]; the session is `Closed`.
    /// - [`SessionError::Transport`] if the socket cannot be made
    ///   non-blocking; adapters are cleaned up and the session is `Closed`.
    pub fn open(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Idle, "open")?;
        if !self.control.is_enabled() {
            info!("open refused: device is disabled");
            return Err(SessionError::DeviceDisabled);
        }

        self.state = SessionState::Connecting;
        let endpoint = self.config.endpoint;
        let mut connection = match self.connections.connect(&endpoint) {
            Ok(connection) => connection,
            Err(e) => {
                error!("cannot open {} stream: {}", self.config.direction, e);
                self.state = SessionState::Closed;
                return Err(e.into());
            }
        };

        self.state = SessionState::Registering;
        let capabilities = self
            .config
            .capabilities
            .resolve(connection.local_ipv4(), &endpoint);
        if let Err(e) = self.connections.register(&mut connection, &capabilities) {
            warn!("registration with {} failed, continuing: {}", endpoint, e);
            self.warnings.push(SessionWarning::Registration(e.to_string()));
        }

        let ctx = SessionContext {
            endpoint,
            direction: self.config.direction,
            format: self.config.format,
            device_name: capabilities.device_name.clone(),
            local_ip: capabilities.ip_address,
        };
        let init_warnings = self.adapters.init_all(&ctx);
        self.warnings.extend(init_warnings);

        if let Err(e) = connection.set_nonblocking(true) {
            error!("cannot switch connection to {} to non-blocking: {}", endpoint, e);
            let cleanup_warnings = self.adapters.cleanup_all();
            self.warnings.extend(cleanup_warnings);
            self.connections.release(&mut connection);
            self.state = SessionState::Closed;
            return Err(TransportError::Fatal(e).into());
        }

        let overhead = self.adapters.framing_overhead();
        let bpf = self.config.format.bytes_per_frame().max(1);
        self.framed = overhead > 0;
        self.max_packet_payload = MAX_FRAMED_PACKET.saturating_sub(overhead) / bpf * bpf;
        self.connection = Some(connection);
        self.state = SessionState::Active;
        info!(
            "{} stream active on {} ({}, adapters: {:?}, framed: {})",
            self.config.direction,
            endpoint,
            self.config.format,
            self.adapters.active_names(),
            self.framed
        );
        Ok(())
    }

    /// Sends one buffer of interleaved PCM.
    ///
    /// Returns how many bytes of `payload` were taken, with adapter framing
    /// already subtracted.  0 means the socket was full.
    ///
    /// With framing adapters a packet the socket took part of counts as
    /// taken: its tail goes out first on the next call, which takes nothing
    /// new until the tail is through.  A payload too long for one packet is
    /// cut at a frame boundary and the rest is left to the caller.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless `Active` (no socket call is made);
    /// [`SessionError::NotConnected`] after a teardown;
    /// [`SessionError::Transport`] for socket failures.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, SessionError> {
        self.expect_state(SessionState::Active, "write")?;
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if self.framed {
            return self.send_framed(payload);
        }

        let packet = if self.adapters.has_active() {
            self.adapters.outbound(payload, &mut self.warnings)
        } else {
            payload
        };
        let framing = packet.len().saturating_sub(payload.len());

        let result = match self.connection.as_mut() {
            Some(connection) => frame_transport::send(connection, packet),
            None => Err(TransportError::NotConnected),
        };
        match result {
            Ok(accepted) => {
                self.consecutive_failures = 0;
                if accepted > 0 && accepted < packet.len() {
                    debug!("partial write: {} of {} bytes", accepted, packet.len());
                }
                Ok(accepted.saturating_sub(framing).min(payload.len()))
            }
            Err(e) => Err(self.on_transport_error(e)),
        }
    }

    fn send_framed(&mut self, payload: &[u8]) -> Result<usize, SessionError> {
        if !self.flush_tx()? {
            return Ok(0);
        }

        let payload = &payload[..payload.len().min(self.max_packet_payload)];
        let packet = self.adapters.outbound(payload, &mut self.warnings);
        self.tx.clear();
        write_frame_prefix(packet.len(), &mut self.tx)?;
        self.tx.extend_from_slice(packet);
        self.tx_sent = 0;

        let flushed = self.flush_tx();
        if self.tx_sent == 0 {
            // Nothing of it went out; the host offers the same frames again.
            self.tx.clear();
        }
        flushed?;
        if self.tx.is_empty() {
            return Ok(0);
        }
        if self.tx_sent < self.tx.len() {
            debug!(
                "partial write: {} of {} bytes, tail kept",
                self.tx_sent,
                self.tx.len()
            );
        }
        Ok(payload.len())
    }

    /// Writes what is left of the pending packet.  `Ok(true)` once nothing is
    /// pending.
    fn flush_tx(&mut self) -> Result<bool, SessionError> {
        if self.tx_sent >= self.tx.len() {
            return Ok(true);
        }
        let result = match self.connection.as_mut() {
            Some(connection) => frame_transport::send(connection, &self.tx[self.tx_sent..]),
            None => Err(TransportError::NotConnected),
        };
        match result {
            Ok(n) => {
                self.consecutive_failures = 0;
                self.tx_sent += n;
                Ok(self.tx_sent >= self.tx.len())
            }
            Err(e) => Err(self.on_transport_error(e)),
        }
    }

    /// Receives whatever audio is available into `out`.
    ///
    /// Returns the number of payload bytes written to `out`; 0 means no data
    /// yet.  With adapters active, payload that does not fit `out` is kept
    /// for the next call, and with framing adapters only whole packets reach
    /// the adapters.
    ///
    /// # Errors
    ///
    /// As for [`StreamSession::send`].  A socket failure after queued payload
    /// was already copied to `out` is counted (and may tear the stream down)
    /// but the call still returns that payload.
    pub fn recv(&mut self, out: &mut [u8]) -> Result<usize, SessionError> {
        self.expect_state(SessionState::Active, "read")?;
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }

        if !self.framed && !self.adapters.has_active() {
            let result = match self.connection.as_mut() {
                Some(connection) => frame_transport::recv(connection, out),
                None => Err(TransportError::NotConnected),
            };
            return match result {
                Ok(n) => {
                    self.consecutive_failures = 0;
                    Ok(n)
                }
                Err(e) => Err(self.on_transport_error(e)),
            };
        }

        let mut filled = self.drain_payload(out);
        if filled == out.len() {
            return Ok(filled);
        }

        let prefix = if self.framed { FRAME_PREFIX_LEN } else { 0 };
        let want = (out.len() - filled + self.adapters.framing_overhead() + prefix).max(RECV_CHUNK);
        let start = self.rx.len();
        self.rx.resize(start + want, 0);
        let result = match self.connection.as_mut() {
            Some(connection) => frame_transport::recv(connection, &mut self.rx[start..]),
            None => Err(TransportError::NotConnected),
        };
        let received = match result {
            Ok(n) => {
                self.consecutive_failures = 0;
                n
            }
            Err(e) => {
                self.rx.truncate(start);
                let e = self.on_transport_error(e);
                return if filled > 0 { Ok(filled) } else { Err(e) };
            }
        };
        self.rx.truncate(start + received);

        if self.framed {
            self.decode_packets();
        } else {
            let payload = self.adapters.inbound(&self.rx, &mut self.warnings);
            self.rx_payload.extend_from_slice(payload);
            self.rx.clear();
        }
        filled += self.drain_payload(&mut out[filled..]);
        Ok(filled)
    }

    /// Runs every whole packet in `rx` through the inbound chain.
    fn decode_packets(&mut self) {
        let mut consumed = 0;
        while let Ok((range, used)) = decode_frame(&self.rx[consumed..]) {
            let packet = &self.rx[consumed + range.start..consumed + range.end];
            if !packet.is_empty() {
                let payload = self.adapters.inbound(packet, &mut self.warnings);
                self.rx_payload.extend_from_slice(payload);
            }
            consumed += used;
        }
        self.rx.drain(..consumed);
    }

    /// Moves queued payload into `out`; returns the bytes moved.
    fn drain_payload(&mut self, out: &mut [u8]) -> usize {
        let n = self.rx_payload.len().min(out.len());
        out[..n].copy_from_slice(&self.rx_payload[..n]);
        self.rx_payload.drain(..n);
        n
    }

    /// Ends the session.
    ///
    /// From `Idle` this goes straight to `Closed`.  From `Active` adapters are
    /// cleaned up in reverse order and the connection is released, unless a
    /// teardown already did both.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] from any other state.
    pub fn close(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Closed;
                Ok(())
            }
            SessionState::Active => {
                self.state = SessionState::Closing;
                let cleanup_warnings = self.adapters.cleanup_all();
                self.warnings.extend(cleanup_warnings);
                if let Some(mut connection) = self.connection.take() {
                    self.connections.release(&mut connection);
                }
                self.state = SessionState::Closed;
                info!(
                    "{} stream closed ({} warning(s))",
                    self.config.direction,
                    self.warnings.len()
                );
                Ok(())
            }
            state => Err(SessionError::InvalidState {
                state,
                operation: "close",
            }),
        }
    }

    fn expect_state(
        &self,
        expected: SessionState,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    fn on_transport_error(&mut self, e: TransportError) -> SessionError {
        match e {
            TransportError::NotConnected => SessionError::NotConnected,
            TransportError::Closed => {
                self.tear_down("server closed the connection".to_string());
                SessionError::Transport(TransportError::Closed)
            }
            TransportError::Fatal(io) => {
                self.consecutive_failures += 1;
                warn!(
                    "transport failure {}/{}: {}",
                    self.consecutive_failures, self.config.max_transport_failures, io
                );
                if self.consecutive_failures >= self.config.max_transport_failures {
                    self.tear_down(format!(
                        "{} consecutive transport failures, last: {}",
                        self.consecutive_failures, io
                    ));
                }
                SessionError::Transport(TransportError::Fatal(io))
            }
        }
    }

    fn tear_down(&mut self, reason: String) {
        error!("tearing down {} stream: {}", self.config.direction, reason);
        let cleanup_warnings = self.adapters.cleanup_all();
        self.warnings.extend(cleanup_warnings);
        if let Some(connection) = self.connection.as_mut() {
            self.connections.release(connection);
        }
        self.warnings.push(SessionWarning::ConnectionLost(reason));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::protocol_adapter::{AdapterError, MockProtocolAdapter};
    use crate::infrastructure::network::mock::{MockConnector, ScriptedRead, ScriptedWrite};
    use aoip_core::{AoipSupport, ChannelProfile};
    use std::io;
    use std::net::Ipv4Addr;

    fn config(direction: StreamDirection) -> SessionConfig {
        SessionConfig {
            endpoint: ServerEndpoint::new(Ipv4Addr::new(203, 0, 113, 5), 50007).unwrap(),
            direction,
            format: FrameFormat::for_profile(ChannelProfile::Extended),
            capabilities: CapabilityTemplate {
                device_ip: Some(Ipv4Addr::new(192, 168, 1, 10)),
                max_channels: 32,
                supported_sample_rates: vec![48_000],
                device_name: "UCYNCU-Device".to_string(),
                aoip_support: AoipSupport::default(),
            },
            max_transport_failures: DEFAULT_MAX_TRANSPORT_FAILURES,
        }
    }

    fn session_with(
        connector: &MockConnector,
        direction: StreamDirection,
        adapters: AdapterChain,
    ) -> StreamSession {
        StreamSession::new(
            config(direction),
            Arc::new(DeviceControl::new(true)),
            ConnectionManager::new(Arc::new(connector.clone())),
            adapters,
        )
    }

    fn session(connector: &MockConnector, direction: StreamDirection) -> StreamSession {
        session_with(connector, direction, AdapterChain::empty())
    }

    fn quiet_adapter(name: &'static str) -> MockProtocolAdapter {
        let mut mock = MockProtocolAdapter::new();
        mock.expect_name().return_const(name);
        mock.expect_init().returning(|_| Ok(()));
        mock.expect_process_outbound().returning(|p, out| {
            out.extend_from_slice(p);
            Ok(())
        });
        mock.expect_process_inbound().returning(|p, out| {
            out.extend_from_slice(p);
            Ok(())
        });
        mock.expect_framing_overhead().return_const(0usize);
        mock
    }

    // ── open ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_open_reaches_active_registered_and_nonblocking() {
        // Arrange
        let connector = MockConnector::new();
        let mut s = session(&connector, StreamDirection::Playback);

        // Act
        s.open().expect("open must succeed");

        // Assert
        assert_eq!(s.state(), SessionState::Active);
        assert!(s.is_connected());
        assert!(connector.is_nonblocking());
        assert_eq!(connector.write_count(), 1, "one registration write");
        assert!(s.warnings().is_empty());
    }

    #[test]
    fn test_open_disabled_device_stays_idle_without_network() {
        // Arrange
        let connector = MockConnector::new();
        let control = Arc::new(DeviceControl::new(false));
        let mut s = StreamSession::new(
            config(StreamDirection::Playback),
            control,
            ConnectionManager::new(Arc::new(connector.clone())),
            AdapterChain::empty(),
        );

        // Act
        let result = s.open();

        // Assert
        assert!(matches!(result, Err(SessionError::DeviceDisabled)));
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(connector.connect_count(), 0);
    }

    #[test]
    fn test_open_connect_failure_closes_session() {
        let connector = MockConnector::new();
        connector.fail_connect_with(io::ErrorKind::ConnectionRefused);
        let mut s = session(&connector, StreamDirection::Playback);

        let result = s.open();

        assert!(matches!(result, Err(SessionError::Connect(_))));
        assert_eq!(s.state(), SessionState::Closed);
        assert!(matches!(
            s.open(),
            Err(SessionError::InvalidState {
                state: SessionState::Closed,
                ..
            })
        ));
    }

    #[test]
    fn test_open_registration_failure_is_a_warning() {
        // Arrange
        let connector = MockConnector::new();
        connector.script_write(ScriptedWrite::Error(io::ErrorKind::BrokenPipe));
        let mut s = session(&connector, StreamDirection::Playback);

        // Act
        s.open().expect("registration failure must not abort open");

        // Assert
        assert_eq!(s.state(), SessionState::Active);
        assert!(matches!(s.warnings(), [SessionWarning::Registration(_)]));
    }

    #[test]
    fn test_open_records_adapter_init_failure() {
        let connector = MockConnector::new();
        let mut broken = MockProtocolAdapter::new();
        broken.expect_name().return_const("broken");
        broken.expect_init().returning(|_| {
            Err(AdapterError::Init {
                adapter: "broken",
                reason: "no license".to_string(),
            })
        });
        broken.expect_cleanup().times(1).returning(|| Ok(()));
        let mut s = session_with(
            &connector,
            StreamDirection::Playback,
            AdapterChain::new(vec![Box::new(broken)]),
        );

        s.open().unwrap();
        s.close().unwrap();

        assert!(matches!(
            s.warnings(),
            [SessionWarning::AdapterInit { adapter: "broken", .. }]
        ));
    }

    // ── I/O ───────────────────────────────────────────────────────────────────

    #[test]
    fn test_io_outside_active_is_rejected_without_socket_calls() {
        // Arrange
        let connector = MockConnector::new();
        let mut s = session(&connector, StreamDirection::Capture);
        let mut buf = [0u8; 128];

        // Act / Assert (Idle)
        assert!(matches!(
            s.send(&buf),
            Err(SessionError::InvalidState {
                state: SessionState::Idle,
                ..
            })
        ));
        assert!(matches!(s.recv(&mut buf), Err(SessionError::InvalidState { .. })));

        // Act / Assert (Closed)
        s.open().unwrap();
        s.close().unwrap();
        let calls = connector.io_call_count();
        assert!(matches!(s.send(&buf), Err(SessionError::InvalidState { .. })));
        assert!(matches!(s.recv(&mut buf), Err(SessionError::InvalidState { .. })));
        assert_eq!(connector.io_call_count(), calls);
    }

    #[test]
    fn test_send_reports_accepted_bytes() {
        let connector = MockConnector::new();
        let mut s = session(&connector, StreamDirection::Playback);
        s.open().unwrap();
        connector.script_write(ScriptedWrite::Accept(256));

        assert_eq!(s.send(&[0u8; 16_384]).unwrap(), 256);
    }

    /// Prepends a 12-byte `0xEE` header on the way out and strips 12 bytes
    /// on the way in.
    fn header_adapter() -> MockProtocolAdapter {
        let mut mock = MockProtocolAdapter::new();
        mock.expect_name().return_const("header");
        mock.expect_init().returning(|_| Ok(()));
        mock.expect_process_outbound().returning(|p, out| {
            out.extend_from_slice(&[0xEE; 12]);
            out.extend_from_slice(p);
            Ok(())
        });
        mock.expect_process_inbound().returning(|p, out| {
            out.extend_from_slice(&p[12..]);
            Ok(())
        });
        mock.expect_framing_overhead().return_const(12usize);
        mock.expect_cleanup().returning(|| Ok(()));
        mock
    }

    fn framed(packet: &[u8]) -> Vec<u8> {
        let mut out = (packet.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(packet);
        out
    }

    #[test]
    fn test_framed_send_prefixes_packet_length() {
        // Arrange
        let connector = MockConnector::new();
        let mut s = session_with(
            &connector,
            StreamDirection::Playback,
            AdapterChain::new(vec![Box::new(header_adapter())]),
        );
        s.open().unwrap();
        connector.clear_written();

        // Act
        let taken = s.send(&[1u8; 512]).unwrap();

        // Assert: 12 + 512 = 0x020C
        assert_eq!(taken, 512);
        let wire = connector.written();
        assert_eq!(wire.len(), 2 + 12 + 512);
        assert_eq!(&wire[..2], &[0x02, 0x0C]);
        assert_eq!(&wire[2..14], &[0xEE; 12]);
    }

    #[test]
    fn test_partial_write_tail_goes_out_before_next_packet() {
        // Arrange
        let connector = MockConnector::new();
        let mut s = session_with(
            &connector,
            StreamDirection::Playback,
            AdapterChain::new(vec![Box::new(header_adapter())]),
        );
        s.open().unwrap();
        connector.clear_written();
        connector.script_write(ScriptedWrite::Accept(100));

        // Act
        let first = s.send(&[1u8; 512]).unwrap();
        let second = s.send(&[2u8; 512]).unwrap();

        // Assert: both packets arrive whole and back to back
        assert_eq!(first, 512);
        assert_eq!(second, 512);
        let wire = connector.written();
        assert_eq!(wire.len(), 2 * 526);
        assert_eq!(&wire[526..528], &[0x02, 0x0C]);
        assert!(wire[14..526].iter().all(|&b| b == 1));
        assert!(wire[540..].iter().all(|&b| b == 2));
    }

    #[test]
    fn test_unflushed_tail_blocks_new_packets() {
        // Arrange
        let connector = MockConnector::new();
        let mut adapter = MockProtocolAdapter::new();
        adapter.expect_name().return_const("header");
        adapter.expect_init().returning(|_| Ok(()));
        adapter.expect_process_outbound().times(1).returning(|p, out| {
            out.extend_from_slice(&[0xEE; 12]);
            out.extend_from_slice(p);
            Ok(())
        });
        adapter.expect_framing_overhead().return_const(12usize);
        adapter.expect_cleanup().returning(|| Ok(()));
        let mut s = session_with(
            &connector,
            StreamDirection::Playback,
            AdapterChain::new(vec![Box::new(adapter)]),
        );
        s.open().unwrap();
        connector.script_write(ScriptedWrite::Accept(10));
        connector.script_write(ScriptedWrite::WouldBlock);

        // Act
        let first = s.send(&[1u8; 512]).unwrap();
        let second = s.send(&[2u8; 512]).unwrap();

        // Assert
        assert_eq!(first, 512);
        assert_eq!(second, 0, "no new packet while the tail is pending");
    }

    #[test]
    fn test_framed_send_would_block_takes_nothing() {
        let connector = MockConnector::new();
        let mut s = session_with(
            &connector,
            StreamDirection::Playback,
            AdapterChain::new(vec![Box::new(header_adapter())]),
        );
        s.open().unwrap();
        connector.clear_written();
        connector.script_write(ScriptedWrite::WouldBlock);

        assert_eq!(s.send(&[1u8; 256]).unwrap(), 0);
        assert_eq!(s.send(&[1u8; 256]).unwrap(), 256);
        assert_eq!(connector.written().len(), 2 + 12 + 256);
    }

    #[test]
    fn test_recv_runs_inbound_chain_on_whole_packets() {
        // Arrange
        let connector = MockConnector::new();
        let mut s = session_with(
            &connector,
            StreamDirection::Capture,
            AdapterChain::new(vec![Box::new(header_adapter())]),
        );
        s.open().unwrap();
        let mut packet = vec![0xEE; 12];
        packet.extend_from_slice(&[1, 2, 3, 4]);
        connector.script_read(ScriptedRead::Data(framed(&packet)));
        let mut out = [0u8; 4];

        // Act
        let n = s.recv(&mut out).unwrap();

        // Assert
        assert_eq!(n, 4);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_recv_keeps_payload_that_does_not_fit() {
        // Arrange
        let connector = MockConnector::new();
        let mut s = session_with(
            &connector,
            StreamDirection::Capture,
            AdapterChain::new(vec![Box::new(header_adapter())]),
        );
        s.open().unwrap();
        let mut packet = vec![0xEE; 12];
        packet.extend(1..=6u8);
        connector.script_read(ScriptedRead::Data(framed(&packet)));
        let mut out = [0u8; 4];

        // Act
        let first = s.recv(&mut out).unwrap();
        let head = out;
        let reads = connector.read_count();
        let second = s.recv(&mut out).unwrap();

        // Assert
        assert_eq!((first, head), (4, [1, 2, 3, 4]));
        assert_eq!(second, 2);
        assert_eq!(&out[..2], &[5, 6]);
        assert_eq!(connector.read_count(), reads + 1);
    }

    #[test]
    fn test_hangup_after_queued_payload_still_delivers_it() {
        // Arrange
        let connector = MockConnector::new();
        let mut s = session_with(
            &connector,
            StreamDirection::Capture,
            AdapterChain::new(vec![Box::new(header_adapter())]),
        );
        s.open().unwrap();
        let mut packet = vec![0xEE; 12];
        packet.extend_from_slice(&[7u8; 6]);
        connector.script_read(ScriptedRead::Data(framed(&packet)));
        connector.script_read(ScriptedRead::Eof);
        let mut out = [0u8; 4];
        s.recv(&mut out).unwrap();

        // Act
        let n = s.recv(&mut out).unwrap();

        // Assert
        assert_eq!(n, 2);
        assert!(!s.is_connected());
        assert!(matches!(s.recv(&mut out), Err(SessionError::NotConnected)));
    }

    #[test]
    fn test_recv_without_data_is_zero() {
        let connector = MockConnector::new();
        let mut s = session(&connector, StreamDirection::Capture);
        s.open().unwrap();

        assert_eq!(s.recv(&mut [0u8; 128]).unwrap(), 0);
    }

    // ── teardown ──────────────────────────────────────────────────────────────

    #[test]
    fn test_peer_close_tears_down_once_and_close_does_not_repeat_cleanup() {
        // Arrange
        let connector = MockConnector::new();
        let mut adapter = quiet_adapter("watcher");
        adapter.expect_cleanup().times(1).returning(|| Ok(()));
        let mut s = session_with(
            &connector,
            StreamDirection::Capture,
            AdapterChain::new(vec![Box::new(adapter)]),
        );
        s.open().unwrap();
        connector.script_read(ScriptedRead::Eof);
        let mut buf = [0u8; 128];

        // Act
        let first = s.recv(&mut buf);
        let second = s.recv(&mut buf);
        s.close().unwrap();

        // Assert
        assert!(matches!(first, Err(SessionError::Transport(TransportError::Closed))));
        assert!(matches!(second, Err(SessionError::NotConnected)));
        assert_eq!(connector.shutdown_count(), 1);
        assert!(s
            .warnings()
            .iter()
            .any(|w| matches!(w, SessionWarning::ConnectionLost(_))));
    }

    #[test]
    fn test_consecutive_fatal_errors_trigger_teardown_at_threshold() {
        // Arrange
        let connector = MockConnector::new();
        let mut s = session(&connector, StreamDirection::Playback);
        s.open().unwrap();
        for _ in 0..3 {
            connector.script_write(ScriptedWrite::Error(io::ErrorKind::ConnectionReset));
        }

        // Act / Assert
        for _ in 0..2 {
            assert!(matches!(s.send(&[0u8; 128]), Err(SessionError::Transport(_))));
            assert!(s.is_connected());
        }
        assert!(matches!(s.send(&[0u8; 128]), Err(SessionError::Transport(_))));
        assert!(!s.is_connected());
        assert!(matches!(s.send(&[0u8; 128]), Err(SessionError::NotConnected)));
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let connector = MockConnector::new();
        let mut s = session(&connector, StreamDirection::Playback);
        s.open().unwrap();
        for outcome in [
            ScriptedWrite::Error(io::ErrorKind::ConnectionReset),
            ScriptedWrite::Error(io::ErrorKind::ConnectionReset),
            ScriptedWrite::WouldBlock,
            ScriptedWrite::Error(io::ErrorKind::ConnectionReset),
            ScriptedWrite::Error(io::ErrorKind::ConnectionReset),
        ] {
            connector.script_write(outcome);
        }

        for _ in 0..5 {
            let _ = s.send(&[0u8; 128]);
        }

        assert!(s.is_connected());
    }

    // ── close ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_close_from_idle_goes_straight_to_closed() {
        let connector = MockConnector::new();
        let mut s = session(&connector, StreamDirection::Playback);

        s.close().unwrap();

        assert_eq!(s.state(), SessionState::Closed);
        assert_eq!(connector.connect_count(), 0);
    }

    #[test]
    fn test_close_twice_is_invalid_state() {
        let connector = MockConnector::new();
        let mut s = session(&connector, StreamDirection::Playback);
        s.open().unwrap();
        s.close().unwrap();

        assert!(matches!(
            s.close(),
            Err(SessionError::InvalidState {
                state: SessionState::Closed,
                operation: "close"
            })
        ));
        assert_eq!(connector.shutdown_count(), 1);
    }
}
