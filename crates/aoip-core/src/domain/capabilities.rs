//! Device capabilities advertised during registration.
//!
//! A [`DeviceCapabilities`] value is built fresh for every registration
//! attempt from a [`CapabilityTemplate`] and then serialized by
//! [`crate::protocol::registration`].  Field order here is the field order on
//! the wire.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::endpoint::ServerEndpoint;

/// Device type string the audio server expects.
pub const DEVICE_TYPE: &str = "DEVICE";

/// Container format name advertised to the server.
pub const AUDIO_FORMAT: &str = "WAV";

/// Default device name (matches the name the hardware ships with).
pub const DEFAULT_DEVICE_NAME: &str = "UCYNCU-Device";

/// Everything the server learns about the device from the `REGISTER` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub device_type: String,
    pub ip_address: Ipv4Addr,
    pub max_channels: u32,
    pub audio_format: String,
    pub supported_sample_rates: Vec<u32>,
    pub device_name: String,
    pub aoip_support: AoipSupport,
}

/// Per-protocol support flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoipSupport {
    pub aes67: bool,
    pub dante: bool,
    pub livewire: LivewireSupport,
}

/// Livewire+ is licensed, so its entry carries the key alongside the flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivewireSupport {
    pub enabled: bool,
    /// Empty when Livewire+ is disabled.
    pub license_key: String,
}

impl LivewireSupport {
    pub fn enabled_with(license_key: impl Into<String>) -> Self {
        Self {
            enabled: true,
            license_key: license_key.into(),
        }
    }
}

impl DeviceCapabilities {
    /// Capabilities with the fixed device constants filled in.
    pub fn new(
        ip_address: Ipv4Addr,
        max_channels: u32,
        supported_sample_rates: Vec<u32>,
        device_name: impl Into<String>,
        aoip_support: AoipSupport,
    ) -> Self {
        Self {
            device_type: DEVICE_TYPE.to_string(),
            ip_address,
            max_channels,
            audio_format: AUDIO_FORMAT.to_string(),
            supported_sample_rates,
            device_name: device_name.into(),
            aoip_support,
        }
    }
}

/// Everything about the device that is known before a connection exists.
///
/// Only the IP address depends on the connection, so it is resolved at
/// registration time by [`CapabilityTemplate::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTemplate {
    /// Operator-configured device address; wins over anything detected.
    pub device_ip: Option<Ipv4Addr>,
    pub max_channels: u32,
    pub supported_sample_rates: Vec<u32>,
    pub device_name: String,
    pub aoip_support: AoipSupport,
}

impl CapabilityTemplate {
    /// Builds the capabilities for one registration attempt.
    ///
    /// The advertised address is the configured device IP, else the local
    /// address of the connected socket, else the server address itself.
    pub fn resolve(
        &self,
        socket_ip: Option<Ipv4Addr>,
        endpoint: &ServerEndpoint,
    ) -> DeviceCapabilities {
        let ip = self
            .device_ip
            .or(socket_ip.filter(|ip| !ip.is_unspecified()))
            .unwrap_or_else(|| endpoint.address());
        DeviceCapabilities::new(
            ip,
            self.max_channels,
            self.supported_sample_rates.clone(),
            self.device_name.clone(),
            self.aoip_support.clone(),
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn template(device_ip: Option<Ipv4Addr>) -> CapabilityTemplate {
        CapabilityTemplate {
            device_ip,
            max_channels: 32,
            supported_sample_rates: vec![48_000],
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            aoip_support: AoipSupport::default(),
        }
    }

    fn endpoint() -> ServerEndpoint {
        ServerEndpoint::new(Ipv4Addr::new(203, 0, 113, 5), 50007).unwrap()
    }

    #[test]
    fn test_resolve_prefers_configured_ip() {
        let caps = template(Some(Ipv4Addr::new(192, 168, 1, 10)))
            .resolve(Some(Ipv4Addr::new(10, 0, 0, 7)), &endpoint());
        assert_eq!(caps.ip_address, Ipv4Addr::new(192, 168, 1, 10));
    }

    #[test]
    fn test_resolve_falls_back_to_socket_ip() {
        let caps = template(None).resolve(Some(Ipv4Addr::new(10, 0, 0, 7)), &endpoint());
        assert_eq!(caps.ip_address, Ipv4Addr::new(10, 0, 0, 7));
    }

    #[test]
    fn test_resolve_ignores_unspecified_socket_ip_and_uses_endpoint() {
        let caps = template(None).resolve(Some(Ipv4Addr::UNSPECIFIED), &endpoint());
        assert_eq!(caps.ip_address, Ipv4Addr::new(203, 0, 113, 5));
    }

    #[test]
    fn test_new_fills_fixed_constants() {
        let caps = DeviceCapabilities::new(
            Ipv4Addr::new(10, 0, 0, 2),
            32,
            vec![48_000],
            DEFAULT_DEVICE_NAME,
            AoipSupport::default(),
        );
        assert_eq!(caps.device_type, "DEVICE");
        assert_eq!(caps.audio_format, "WAV");
        assert_eq!(caps.device_name, "UCYNCU-Device");
    }

    #[test]
    fn test_default_livewire_support_is_disabled_with_empty_key() {
        let lw = LivewireSupport::default();
        assert!(!lw.enabled);
        assert!(lw.license_key.is_empty());
    }
}
