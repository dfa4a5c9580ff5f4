//! JSON codec for the registration handshake.
//!
//! The first thing a device sends on a fresh connection is a single compact
//! JSON object:
//!
//! ```json
//! {"type":"REGISTER","device_type":"DEVICE","ip_address":"192.168.1.10",
//!  "max_channels":32,"audio_format":"WAV","supported_sample_rates":[48000],
//!  "device_name":"UCYNCU-Device",
//!  "aoip_support":{"aes67":true,"dante":false,
//!    "livewire":{"enabled":true,"license_key":"XXXX-XXXX-XXXX-XXXX"}}}
//! ```
//!
//! (Line breaks above are for readability only; the encoded form contains no
//! whitespace and no trailing newline.)
//!
//! # JSON discriminant
//!
//! `#[serde(tag = "type")]` writes the variant name as the first key of the
//! object and flattens the payload's fields after it, so the key order on the
//! wire follows the field order of [`DeviceCapabilities`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::capabilities::DeviceCapabilities;

/// Errors produced by the control-message codec.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode control message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode control message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Messages exchanged on the control path of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Device → server: announce the device and its capabilities.
    #[serde(rename = "REGISTER")]
    Register(DeviceCapabilities),
}

/// Encodes a `REGISTER` message as compact UTF-8 JSON.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_registration(capabilities: &DeviceCapabilities) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(&ControlMessage::Register(capabilities.clone()))
        .map_err(ProtocolError::Encode)
}

/// Decodes a control message.  Used by the server side and by tests that
/// capture what a device wrote.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if `bytes` is not a known control message.
pub fn decode_control_message(bytes: &[u8]) -> Result<ControlMessage, ProtocolError> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capabilities::{AoipSupport, LivewireSupport};
    use std::net::Ipv4Addr;

    fn sample_caps() -> DeviceCapabilities {
        DeviceCapabilities::new(
            Ipv4Addr::new(192, 168, 1, 10),
            32,
            vec![48_000],
            "UCYNCU-Device",
            AoipSupport {
                aes67: true,
                dante: false,
                livewire: LivewireSupport::enabled_with("XXXX-XXXX-XXXX-XXXX"),
            },
        )
    }

    #[test]
    fn test_encode_registration_starts_with_type_tag() {
        let bytes = encode_registration(&sample_caps()).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with(r#"{"type":"REGISTER","device_type":"DEVICE""#));
    }

    #[test]
    fn test_encode_registration_has_no_whitespace_or_newline() {
        let bytes = encode_registration(&sample_caps()).unwrap();
        assert!(!bytes.contains(&b'\n'));
        assert!(!bytes.contains(&b' '));
    }

    #[test]
    fn test_encode_registration_bools_are_lowercase_literals() {
        let bytes = encode_registration(&sample_caps()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""aes67":true,"dante":false"#));
    }

    #[test]
    fn test_decode_reads_back_capabilities() {
        let caps = sample_caps();
        let bytes = encode_registration(&caps).unwrap();
        let ControlMessage::Register(decoded) = decode_control_message(&bytes).unwrap();
        assert_eq!(decoded, caps);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let result = decode_control_message(br#"{"type":"UNREGISTER"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
