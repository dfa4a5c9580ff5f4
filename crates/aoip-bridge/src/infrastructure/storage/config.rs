//! TOML-based configuration for the bridge.
//!
//! Reads `BridgeConfig` from the platform-appropriate config file:
//! - Linux:    `~/.config/aoip-bridge/config.toml`
//! - macOS:    `~/Library/Application Support/aoip-bridge/config.toml`
//! - Windows:  `%APPDATA%\aoip-bridge\config.toml`
//!
//! or from an explicit path given on the command line.
//!
//! ```toml
//! [device]
//! enabled = true
//! name = "UCYNCU-Device"
//! channel_profile = "extended"
//!
//! [server]
//! address = "192.168.1.254"
//! port = 50007
//!
//! [aoip]
//! adapters = ["livewire", "aes67"]
//! livewire_license_key = "XXXX-XXXX-XXXX-XXXX"
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = ...)]`, so a missing file, a missing
//! section and a missing key all fall back to the shipped defaults.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use aoip_core::{
    CapabilityTemplate, ChannelProfile, EndpointError, ServerEndpoint, DEFAULT_DEVICE_NAME,
    SUPPORTED_SAMPLE_RATE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::pcm_device::DeviceSettings;
use crate::application::stream_session::DEFAULT_MAX_TRANSPORT_FAILURES;
use crate::infrastructure::adapters::{self, AdapterKind, AdapterSettings};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but makes no sense.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub aoip: AoipSection,
    #[serde(default)]
    pub transport: TransportSection,
}

/// The local device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Initial value of the administrative switch.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_device_name")]
    pub name: String,
    /// `"extended"` (32 channels) or `"baseline"` (24 channels).
    #[serde(default)]
    pub channel_profile: ChannelProfile,
    /// Address advertised at registration; detected from the socket if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<Ipv4Addr>,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// The remote audio server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Dotted-quad IPv4 address.
    #[serde(default = "default_server_address")]
    pub address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// AoIP protocol adapters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AoipSection {
    /// Adapters to run, in init order.
    #[serde(default = "default_adapters")]
    pub adapters: Vec<AdapterKind>,
    #[serde(default = "default_license_key")]
    pub livewire_license_key: String,
    /// Where Dante `ANNOUNCE`/`WITHDRAW` datagrams go; none are sent if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dante_announce_addr: Option<SocketAddr>,
    #[serde(default = "default_payload_type")]
    pub aes67_payload_type: u8,
}

/// Socket failure policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportSection {
    /// Consecutive socket errors tolerated before the stream is torn down.
    #[serde(default = "default_max_transport_failures")]
    pub max_transport_failures: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_server_address() -> String {
    "192.168.1.254".to_string()
}
fn default_server_port() -> u16 {
    50007
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_adapters() -> Vec<AdapterKind> {
    vec![AdapterKind::Livewire, AdapterKind::Aes67]
}
fn default_license_key() -> String {
    "XXXX-XXXX-XXXX-XXXX".to_string()
}
fn default_payload_type() -> u8 {
    adapters::aes67::DEFAULT_PAYLOAD_TYPE
}
fn default_max_transport_failures() -> u32 {
    DEFAULT_MAX_TRANSPORT_FAILURES
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            name: default_device_name(),
            channel_profile: ChannelProfile::default(),
            ip_address: None,
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            port: default_server_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for AoipSection {
    fn default() -> Self {
        Self {
            adapters: default_adapters(),
            livewire_license_key: default_license_key(),
            dante_announce_addr: None,
            aes67_payload_type: default_payload_type(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            max_transport_failures: default_max_transport_failures(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl BridgeConfig {
    /// The validated server endpoint.
    ///
    /// # Errors
    ///
    /// [`EndpointError`] for a non-IPv4 address or port 0.
    pub fn endpoint(&self) -> Result<ServerEndpoint, EndpointError> {
        ServerEndpoint::parse(&self.server.address, self.server.port)
    }

    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            livewire_license_key: self.aoip.livewire_license_key.clone(),
            dante_announce_addr: self.aoip.dante_announce_addr,
            aes67_payload_type: self.aoip.aes67_payload_type,
        }
    }

    /// Registration capabilities minus the connection-dependent IP.
    pub fn capability_template(&self) -> CapabilityTemplate {
        CapabilityTemplate {
            device_ip: self.device.ip_address,
            max_channels: u32::from(self.device.channel_profile.channels()),
            supported_sample_rates: vec![SUPPORTED_SAMPLE_RATE],
            device_name: self.device.name.clone(),
            aoip_support: adapters::aoip_support(&self.aoip.adapters, &self.adapter_settings()),
        }
    }

    /// Everything [`PcmDevice`](crate::application::pcm_device::PcmDevice)
    /// needs from the file.
    ///
    /// # Errors
    ///
    /// [`EndpointError`] if the server address is invalid.
    pub fn device_settings(&self) -> Result<DeviceSettings, EndpointError> {
        Ok(DeviceSettings {
            profile: self.device.channel_profile,
            endpoint: self.endpoint()?,
            capabilities: self.capability_template(),
            max_transport_failures: self.transport.max_transport_failures,
        })
    }

    /// Checks values the type system cannot.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint().map_err(|e| ConfigError::Invalid {
            field: "server",
            reason: e.to_string(),
        })?;
        if self.server.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "server.connect_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.transport.max_transport_failures == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.max_transport_failures",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.aoip.aes67_payload_type > 127 {
            return Err(ConfigError::Invalid {
                field: "aoip.aes67_payload_type",
                reason: format!("{} does not fit in 7 bits", self.aoip.aes67_payload_type),
            });
        }
        Ok(())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `BridgeConfig` from the default location.
///
/// # Errors
///
/// As for [`load_config_from`].
pub fn load_config() -> Result<BridgeConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `BridgeConfig` from `path`, returning `BridgeConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<BridgeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BridgeConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &BridgeConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory joined with `aoip-bridge`.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("aoip-bridge"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("aoip-bridge"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("aoip-bridge")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
