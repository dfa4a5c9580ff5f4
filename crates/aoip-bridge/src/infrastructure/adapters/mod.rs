//! Concrete protocol adapters and the factory that builds them from config.
//!
//! - **`aes67`**    – Standards-based RTP framing.
//! - **`livewire`** – Licensed RTP framing with a `0xFA1A` header extension.
//! - **`dante`**    – Discovery announce/withdraw; audio passes through.
//!
//! The order of [`AdapterKind`]s in the configuration is the init order.

use std::fmt;
use std::net::SocketAddr;

use aoip_core::{AoipSupport, LivewireSupport};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::application::protocol_adapter::ProtocolAdapter;

pub mod aes67;
pub mod dante;
pub mod livewire;

pub use aes67::Aes67Adapter;
pub use dante::DanteAdapter;
pub use livewire::LivewireAdapter;

/// The protocol families an adapter can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Livewire,
    Dante,
    Aes67,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdapterKind::Livewire => "livewire",
            AdapterKind::Dante => "dante",
            AdapterKind::Aes67 => "aes67",
        })
    }
}

/// Per-adapter settings taken from the `[aoip]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSettings {
    pub livewire_license_key: String,
    pub dante_announce_addr: Option<SocketAddr>,
    pub aes67_payload_type: u8,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            livewire_license_key: String::new(),
            dante_announce_addr: None,
            aes67_payload_type: aes67::DEFAULT_PAYLOAD_TYPE,
        }
    }
}

/// Builds one fresh adapter per kind, in order.  Repeated kinds are skipped.
pub fn build_adapters(
    kinds: &[AdapterKind],
    settings: &AdapterSettings,
) -> Vec<Box<dyn ProtocolAdapter>> {
    let mut seen = Vec::with_capacity(kinds.len());
    let mut adapters: Vec<Box<dyn ProtocolAdapter>> = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        if seen.contains(&kind) {
            warn!("adapter '{}' listed more than once; ignoring repeat", kind);
            continue;
        }
        seen.push(kind);
        adapters.push(match kind {
            AdapterKind::Livewire => {
                Box::new(LivewireAdapter::new(settings.livewire_license_key.clone()))
            }
            AdapterKind::Dante => Box::new(DanteAdapter::new(settings.dante_announce_addr)),
            AdapterKind::Aes67 => Box::new(Aes67Adapter::new(settings.aes67_payload_type)),
        });
    }
    adapters
}

/// Capability map advertised at registration for the configured adapters.
pub fn aoip_support(kinds: &[AdapterKind], settings: &AdapterSettings) -> AoipSupport {
    AoipSupport {
        aes67: kinds.contains(&AdapterKind::Aes67),
        dante: kinds.contains(&AdapterKind::Dante),
        livewire: if kinds.contains(&AdapterKind::Livewire) {
            LivewireSupport::enabled_with(settings.livewire_license_key.clone())
        } else {
            LivewireSupport::default()
        },
    }
}

/// 32 random bits (RTP SSRCs).
pub(crate) fn random_u32() -> u32 {
    Uuid::new_v4().as_u128() as u32
}

#[cfg(test)]
pub(crate) fn test_context() -> crate::application::protocol_adapter::SessionContext {
    use aoip_core::{ChannelProfile, FrameFormat, ServerEndpoint, StreamDirection};
    use std::net::Ipv4Addr;

    crate::application::protocol_adapter::SessionContext {
        endpoint: ServerEndpoint::new(Ipv4Addr::new(203, 0, 113, 5), 50007)
            .expect("valid endpoint"),
        direction: StreamDirection::Playback,
        format: FrameFormat::for_profile(ChannelProfile::Extended),
        device_name: "UCYNCU-Device".to_string(),
        local_ip: Ipv4Addr::new(192, 168, 1, 10),
    }
}

/// Runs `process_outbound` into a fresh buffer.
#[cfg(test)]
pub(crate) fn encode_with(
    adapter: &mut dyn ProtocolAdapter,
    payload: &[u8],
) -> Result<Vec<u8>, crate::application::protocol_adapter::AdapterError> {
    let mut out = Vec::new();
    adapter.process_outbound(payload, &mut out)?;
    Ok(out)
}

/// Runs `process_inbound` into a fresh buffer.
#[cfg(test)]
pub(crate) fn decode_with(
    adapter: &mut dyn ProtocolAdapter,
    packet: &[u8],
) -> Result<Vec<u8>, crate::application::protocol_adapter::AdapterError> {
    let mut out = Vec::new();
    adapter.process_inbound(packet, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AdapterSettings {
        AdapterSettings {
            livewire_license_key: "XXXX-XXXX-XXXX-XXXX".to_string(),
            ..AdapterSettings::default()
        }
    }

    #[test]
    fn test_build_adapters_preserves_order_and_skips_repeats() {
        // Arrange
        let kinds = [
            AdapterKind::Livewire,
            AdapterKind::Aes67,
            AdapterKind::Livewire,
        ];

        // Act
        let adapters = build_adapters(&kinds, &settings());

        // Assert
        let names: Vec<_> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["livewire", "aes67"]);
    }

    #[test]
    fn test_aoip_support_follows_configured_kinds() {
        let support = aoip_support(&[AdapterKind::Livewire, AdapterKind::Aes67], &settings());

        assert!(support.aes67);
        assert!(!support.dante);
        assert!(support.livewire.enabled);
        assert_eq!(support.livewire.license_key, "XXXX-XXXX-XXXX-XXXX");
    }

    #[test]
    fn test_aoip_support_without_livewire_has_empty_key() {
        let support = aoip_support(&[AdapterKind::Dante], &settings());

        assert!(support.dante);
        assert!(!support.livewire.enabled);
        assert!(support.livewire.license_key.is_empty());
    }

    #[test]
    fn test_adapter_kind_deserializes_lowercase() {
        let kinds: Vec<AdapterKind> = serde_json::from_str(r#"["dante","aes67"]"#).unwrap();
        assert_eq!(kinds, vec![AdapterKind::Dante, AdapterKind::Aes67]);
    }
}
