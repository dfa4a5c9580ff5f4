//! AES67 adapter: wraps each outbound period in a plain RTP header and strips
//! it again on the way in.

use aoip_core::{locate_payload, RtpHeader, RTP_HEADER_LEN};
use tracing::debug;

use crate::application::protocol_adapter::{AdapterError, ProtocolAdapter, SessionContext};

use super::random_u32;

const NAME: &str = "aes67";

/// Dynamic payload type used when none is configured.
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

pub struct Aes67Adapter {
    /// Header of the next outbound packet.
    header: RtpHeader,
    bytes_per_frame: usize,
    initialized: bool,
}

impl Aes67Adapter {
    pub fn new(payload_type: u8) -> Self {
        Self {
            header: RtpHeader {
                marker: false,
                payload_type: payload_type & 0x7F,
                sequence: 0,
                timestamp: 0,
                ssrc: 0,
                extension: None,
            },
            bytes_per_frame: 0,
            initialized: false,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }
}

impl Default for Aes67Adapter {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_TYPE)
    }
}

impl ProtocolAdapter for Aes67Adapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, ctx: &SessionContext) -> Result<(), AdapterError> {
        self.header.ssrc = random_u32();
        self.header.sequence = 0;
        self.header.timestamp = 0;
        self.bytes_per_frame = ctx.format.bytes_per_frame();
        self.initialized = true;
        debug!(
            "aes67 stream ssrc {:#010x}, pt {}",
            self.header.ssrc, self.header.payload_type
        );
        Ok(())
    }

    fn process_outbound(&mut self, packet: &[u8], out: &mut Vec<u8>) -> Result<(), AdapterError> {
        if !self.initialized {
            return Err(AdapterError::NotInitialized { adapter: NAME });
        }
        self.header
            .write_to(out)
            .map_err(|e| AdapterError::Malformed {
                adapter: NAME,
                reason: e.to_string(),
            })?;
        out.extend_from_slice(packet);

        let frames = packet.len().checked_div(self.bytes_per_frame).unwrap_or(0);
        self.header.sequence = self.header.sequence.wrapping_add(1);
        self.header.timestamp = self.header.timestamp.wrapping_add(frames as u32);
        Ok(())
    }

    fn process_inbound(&mut self, packet: &[u8], out: &mut Vec<u8>) -> Result<(), AdapterError> {
        let location = locate_payload(packet).map_err(|e| AdapterError::Malformed {
            adapter: NAME,
            reason: e.to_string(),
        })?;
        out.extend_from_slice(&packet[location.payload]);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), AdapterError> {
        self.initialized = false;
        Ok(())
    }

    fn framing_overhead(&self) -> usize {
        RTP_HEADER_LEN
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
