//! PcmDevice: the boundary the host audio stack talks to.
//!
//! The host thinks in frames; the network thinks in bytes.  This module
//! converts between the two, guards direction and buffer size, and starts a
//! fresh [`StreamSession`] for every `open()`.
//!
//! # Frame alignment on capture
//!
//! A TCP read can end in the middle of a frame.  The whole frames are handed
//! to the host and the trailing fragment is kept and placed in front of the
//! next read, so the host never sees a frame split across two periods.
//!
//! # Zero is not an error
//!
//! `read` and `write` return 0 frames when the socket had nothing to give or
//! no room to take, and after the connection has been torn down.  The host
//! simply tries again on its next period.

use std::fmt;
use std::sync::Arc;

use aoip_core::{
    CapabilityTemplate, ChannelProfile, FormatError, FrameFormat, ServerEndpoint, StreamDirection,
};
use thiserror::Error;
use tracing::{debug, info};

use super::adapter_chain::AdapterChain;
use super::device_control::DeviceControl;
use super::protocol_adapter::ProtocolAdapter;
use super::stream_session::{
    SessionConfig, SessionError, SessionState, SessionWarning, StreamSession,
};
use crate::infrastructure::network::ConnectionManager;

/// Builds a fresh, uninitialized adapter set for each new stream.
pub type AdapterFactory = Box<dyn Fn() -> Vec<Box<dyn ProtocolAdapter>> + Send + Sync>;

/// Error type for [`PcmDevice`] operations.
#[derive(Debug, Error)]
pub enum PcmError {
    #[error("cannot {operation}: {reason}")]
    InvalidState {
        operation: &'static str,
        reason: String,
    },
    #[error("buffer too small: {needed} bytes needed, {actual} given")]
    InvalidBuffer { needed: usize, actual: usize },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Transfer counters, cumulative over the device's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_written: u64,
    pub frames_read: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    /// Transfers that moved no bytes at all.
    pub would_block: u64,
    /// Writes where the socket took some but not all of the bytes.
    pub partial_writes: u64,
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames out/in {}/{}, bytes out/in {}/{}, zero-progress {}, partial writes {}",
            self.frames_written,
            self.frames_read,
            self.bytes_written,
            self.bytes_read,
            self.would_block,
            self.partial_writes
        )
    }
}

/// Static device parameters, fixed at construction.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub profile: ChannelProfile,
    pub endpoint: ServerEndpoint,
    pub capabilities: CapabilityTemplate,
    pub max_transport_failures: u32,
}

pub struct PcmDevice {
    settings: DeviceSettings,
    format: FrameFormat,
    control: Arc<DeviceControl>,
    connections: ConnectionManager,
    adapter_factory: AdapterFactory,
    session: Option<StreamSession>,
    carry: Vec<u8>,
    stats: StreamStats,
}

impl PcmDevice {
    pub fn new(
        settings: DeviceSettings,
        control: Arc<DeviceControl>,
        connections: ConnectionManager,
        adapter_factory: AdapterFactory,
    ) -> Self {
        let format = FrameFormat::for_profile(settings.profile);
        Self {
            settings,
            format,
            control,
            connections,
            adapter_factory,
            session: None,
            carry: Vec::new(),
            stats: StreamStats::default(),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// `false` when closed or after the connection was torn down.
    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(StreamSession::is_connected)
    }

    /// State of the current stream, `None` when closed.
    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(StreamSession::state)
    }

    /// Warnings recorded by the current stream.
    pub fn warnings(&self) -> &[SessionWarning] {
        self.session
            .as_ref()
            .map(StreamSession::warnings)
            .unwrap_or_default()
    }

    /// Adapters still processing packets on the current stream.
    pub fn active_adapters(&self) -> Vec<&'static str> {
        self.session
            .as_ref()
            .map(StreamSession::active_adapters)
            .unwrap_or_default()
    }

    /// Opens a stream in `direction` on a brand-new session.
    ///
    /// # Errors
    ///
    /// [`PcmError::InvalidState`] if a stream is already open; otherwise any
    /// [`SessionError`] from [`StreamSession::open`], after which the device
    /// is closed again.
    pub fn open(&mut self, direction: StreamDirection) -> Result<(), PcmError> {
        if self.session.is_some() {
            return Err(PcmError::InvalidState {
                operation: "open",
                reason: "a stream is already open".to_string(),
            });
        }
        let config = SessionConfig {
            endpoint: self.settings.endpoint,
            direction,
            format: self.format,
            capabilities: self.settings.capabilities.clone(),
            max_transport_failures: self.settings.max_transport_failures,
        };
        let adapters = AdapterChain::new((self.adapter_factory)());
        let mut session = StreamSession::new(
            config,
            Arc::clone(&self.control),
            self.connections.clone(),
            adapters,
        );
        session.open()?;
        self.carry.clear();
        self.session = Some(session);
        Ok(())
    }

    /// Closes the current stream.
    ///
    /// # Errors
    ///
    /// [`PcmError::InvalidState`] when no stream is open.
    pub fn close(&mut self) -> Result<(), PcmError> {
        let mut session = self.session.take().ok_or_else(|| PcmError::InvalidState {
            operation: "close",
            reason: "no stream is open".to_string(),
        })?;
        self.carry.clear();
        session.close()?;
        info!("pcm device closed: {}", self.stats);
        Ok(())
    }

    /// Applies a host format request.  Only the fixed device format passes.
    ///
    /// # Errors
    ///
    /// [`PcmError::Format`] naming the first unsupported parameter.
    pub fn set_format(
        &mut self,
        sample_rate: u32,
        channels: u16,
        sample_format: &str,
    ) -> Result<FrameFormat, PcmError> {
        let format =
            FrameFormat::negotiate(self.settings.profile, sample_rate, channels, sample_format)?;
        debug!("format set to {}", format);
        self.format = format;
        Ok(format)
    }

    /// Reads up to `frames` whole frames into `buf`.
    ///
    /// # Errors
    ///
    /// [`PcmError::InvalidState`] unless a capture stream is open;
    /// [`PcmError::InvalidBuffer`] if `buf` cannot hold `frames` frames;
    /// [`PcmError::Session`] for socket failures.
    pub fn read(&mut self, buf: &mut [u8], frames: usize) -> Result<usize, PcmError> {
        let session = active_session(&mut self.session, "read", StreamDirection::Capture)?;
        let bpf = self.format.bytes_per_frame();
        let needed = check_buffer(buf.len(), frames, bpf)?;
        if frames == 0 {
            return Ok(0);
        }

        let carried = self.carry.len();
        buf[..carried].copy_from_slice(&self.carry);
        let received = match session.recv(&mut buf[carried..needed]) {
            Ok(n) => n,
            Err(SessionError::NotConnected) => 0,
            Err(e) => return Err(e.into()),
        };

        let total = carried + received;
        let whole_frames = total / bpf;
        let aligned = whole_frames * bpf;
        self.carry.clear();
        self.carry.extend_from_slice(&buf[aligned..total]);

        self.stats.bytes_read += received as u64;
        self.stats.frames_read += whole_frames as u64;
        if received == 0 {
            self.stats.would_block += 1;
        }
        Ok(whole_frames)
    }

    /// Writes `frames` frames from `buf`; returns how many whole frames the
    /// server accepted.
    ///
    /// # Errors
    ///
    /// [`PcmError::InvalidState`] unless a playback stream is open;
    /// [`PcmError::InvalidBuffer`] if `buf` holds fewer than `frames` frames;
    /// [`PcmError::Session`] for socket failures.
    pub fn write(&mut self, buf: &[u8], frames: usize) -> Result<usize, PcmError> {
        let session = active_session(&mut self.session, "write", StreamDirection::Playback)?;
        let bpf = self.format.bytes_per_frame();
        let needed = check_buffer(buf.len(), frames, bpf)?;
        if frames == 0 {
            return Ok(0);
        }

        let accepted = match session.send(&buf[..needed]) {
            Ok(n) => n,
            Err(SessionError::NotConnected) => 0,
            Err(e) => return Err(e.into()),
        };

        let written = accepted / bpf;
        self.stats.bytes_written += accepted as u64;
        self.stats.frames_written += written as u64;
        if accepted == 0 {
            self.stats.would_block += 1;
        } else if accepted < needed {
            self.stats.partial_writes += 1;
        }
        Ok(written)
    }
}

fn active_session<'a>(
    session: &'a mut Option<StreamSession>,
    operation: &'static str,
    direction: StreamDirection,
) -> Result<&'a mut StreamSession, PcmError> {
    let session = session.as_mut().ok_or_else(|| PcmError::InvalidState {
        operation,
        reason: "no stream is open".to_string(),
    })?;
    if session.direction() != direction {
        return Err(PcmError::InvalidState {
            operation,
            reason: format!("stream is {}", session.direction()),
        });
    }
    Ok(session)
}

fn check_buffer(len: usize, frames: usize, bytes_per_frame: usize) -> Result<usize, PcmError> {
    let needed = frames.saturating_mul(bytes_per_frame);
    if len < needed {
        return Err(PcmError::InvalidBuffer {
            needed,
            actual: len,
        });
    }
    Ok(needed)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
