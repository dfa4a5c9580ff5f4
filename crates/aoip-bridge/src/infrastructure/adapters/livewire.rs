//! Livewire+ adapter.
//!
//! Livewire+ is licensed per device.  The adapter refuses to start without a
//! well-formed license key and derives the 16-bit stream id it stamps on
//! every packet from that key.  Packets carry an RTP header with a one-word
//! extension under profile `0xFA1A`:
//!
//! ```text
//! extension word:  [ stream id (16) | channel count (16) ]
//! ```

use aoip_core::{locate_payload, RtpExtension, RtpHeader, LIVEWIRE_EXT_PROFILE, RTP_HEADER_LEN};
use tracing::debug;

use crate::application::protocol_adapter::{AdapterError, ProtocolAdapter, SessionContext};

use super::random_u32;

const NAME: &str = "livewire";

/// Payload type carried on Livewire+ streams.
const PAYLOAD_TYPE: u8 = 97;

/// Fixed header plus the four-byte extension header plus one extension word.
const OVERHEAD: usize = RTP_HEADER_LEN + 4 + 4;

pub struct LivewireAdapter {
    license_key: String,
    stream_id: u16,
    /// Header of the next outbound packet, built at init.
    header: Option<RtpHeader>,
    bytes_per_frame: usize,
}

impl LivewireAdapter {
    pub fn new(license_key: impl Into<String>) -> Self {
        Self {
            license_key: license_key.into(),
            stream_id: 0,
            header: None,
            bytes_per_frame: 0,
        }
    }

    /// Stream id derived at init; 0 before.
    pub fn stream_id(&self) -> u16 {
        self.stream_id
    }
}

/// `true` for four dash-separated groups of four ASCII alphanumerics.
pub fn is_valid_license_key(key: &str) -> bool {
    let groups: Vec<&str> = key.split('-').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| g.len() == 4 && g.bytes().all(|b| b.is_ascii_alphanumeric()))
}

/// Folds the key into a stable 16-bit id (FNV-1a, xor-folded).
fn stream_id_for(key: &str) -> u16 {
    let hash = key.bytes().fold(0x811C_9DC5u32, |h, b| {
        (h ^ u32::from(b)).wrapping_mul(0x0100_0193)
    });
    ((hash >> 16) ^ (hash & 0xFFFF)) as u16
}

impl ProtocolAdapter for LivewireAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, ctx: &SessionContext) -> Result<(), AdapterError> {
        if !is_valid_license_key(&self.license_key) {
            return Err(AdapterError::Init {
                adapter: NAME,
                reason: "license key must look like XXXX-XXXX-XXXX-XXXX".to_string(),
            });
        }
        self.stream_id = stream_id_for(&self.license_key);
        let channels = ctx.format.channels;
        self.bytes_per_frame = ctx.format.bytes_per_frame();
        self.header = Some(RtpHeader {
            marker: false,
            payload_type: PAYLOAD_TYPE,
            sequence: 0,
            timestamp: 0,
            ssrc: random_u32(),
            extension: Some(RtpExtension {
                profile: LIVEWIRE_EXT_PROFILE,
                data: vec![(u32::from(self.stream_id) << 16) | u32::from(channels)],
            }),
        });
        debug!(
            "livewire stream id {:#06x}, {} channels",
            self.stream_id, channels
        );
        Ok(())
    }

    fn process_outbound(&mut self, packet: &[u8], out: &mut Vec<u8>) -> Result<(), AdapterError> {
        let header = self
            .header
            .as_mut()
            .ok_or(AdapterError::NotInitialized { adapter: NAME })?;
        header.write_to(out).map_err(|e| AdapterError::Malformed {
            adapter: NAME,
            reason: e.to_string(),
        })?;
        out.extend_from_slice(packet);

        let frames = packet.len().checked_div(self.bytes_per_frame).unwrap_or(0);
        header.sequence = header.sequence.wrapping_add(1);
        header.timestamp = header.timestamp.wrapping_add(frames as u32);
        Ok(())
    }

    fn process_inbound(&mut self, packet: &[u8], out: &mut Vec<u8>) -> Result<(), AdapterError> {
        let malformed = |reason: String| AdapterError::Malformed {
            adapter: NAME,
            reason,
        };
        let location = locate_payload(packet).map_err(|e| malformed(e.to_string()))?;
        match location.extension_profile {
            Some(LIVEWIRE_EXT_PROFILE) => {
                out.extend_from_slice(&packet[location.payload]);
                Ok(())
            }
            Some(profile) => Err(malformed(format!(
                "unexpected extension profile {:#06x}",
                profile
            ))),
            None => Err(malformed("missing livewire extension".to_string())),
        }
    }

    fn cleanup(&mut self) -> Result<(), AdapterError> {
        self.header = None;
        Ok(())
    }

    fn framing_overhead(&self) -> usize {
        OVERHEAD
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
