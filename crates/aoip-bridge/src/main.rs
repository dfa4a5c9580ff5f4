//! AoIP bridge command-line host.
//!
//! Loads the configuration, builds a [`PcmDevice`] wired to a real TCP
//! connector and the configured adapters, then plays the part of the host
//! audio stack: once per period it either writes a period of silence
//! (playback) or reads whatever the server sent (capture).
//!
//! Each line typed on stdin goes to the device switch: `0` or `1` is stored,
//! and the switch's current value is logged back.  The switch is read at the
//! next `open()`, so it takes effect on the next reopen.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config (file, then CLI/env overrides)
//!  └─ PcmDevice::new()       -- connector, DeviceControl, adapter factory
//!  └─ set_format() + open()  -- connect, REGISTER, adapter init
//!  └─ period loop            -- write silence / read frames
//!       ├─ stats tick        -- log StreamStats, reopen after a lost link
//!       ├─ stdin line        -- DeviceControl::store / show
//!       └─ Ctrl-C            -- close() and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use aoip_bridge::application::device_control::{ControlError, DeviceControl};
use aoip_bridge::application::pcm_device::{AdapterFactory, PcmDevice};
use aoip_bridge::infrastructure::adapters::build_adapters;
use aoip_bridge::infrastructure::network::{ConnectionManager, TcpConnector};
use aoip_bridge::infrastructure::storage::config::{
    load_config, load_config_from, BridgeConfig, ConfigError,
};
use aoip_core::{SampleFormat, StreamDirection, SUPPORTED_SAMPLE_RATE};

/// How often transfer counters are logged.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Playback,
    Capture,
}

impl From<DirectionArg> for StreamDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Playback => StreamDirection::Playback,
            DirectionArg::Capture => StreamDirection::Capture,
        }
    }
}

/// Multi-channel PCM device bridged to a remote audio server.
#[derive(Debug, Parser)]
#[command(
    name = "aoip-bridge",
    about = "Relays a 48 kHz multi-channel PCM stream to a remote AoIP audio server",
    version
)]
struct Cli {
    /// Path to the TOML config file (defaults to the platform config dir).
    #[arg(long, env = "AOIP_CONFIG")]
    config: Option<PathBuf>,

    /// IPv4 address of the audio server; overrides `[server] address`.
    #[arg(long, env = "AOIP_SERVER_HOST")]
    server_host: Option<String>,

    /// TCP port of the audio server; overrides `[server] port`.
    #[arg(long, env = "AOIP_SERVER_PORT")]
    server_port: Option<u16>,

    /// Stream direction to open.
    #[arg(long, value_enum, default_value_t = DirectionArg::Playback, env = "AOIP_DIRECTION")]
    direction: DirectionArg,

    /// Frames per period; one transfer is attempted per period.
    #[arg(
        long,
        default_value_t = 480,
        env = "AOIP_PERIOD_FRAMES",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    period_frames: u32,

    /// Start with the device administratively disabled.
    #[arg(long, env = "AOIP_DISABLED")]
    disabled: bool,
}

impl Cli {
    /// Reads the config file named by `--config`, or the default one.
    ///
    /// A platform without a config directory runs on defaults.
    fn load_config(&self) -> anyhow::Result<BridgeConfig> {
        let config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => match load_config() {
                Ok(config) => config,
                Err(ConfigError::NoPlatformConfigDir) => BridgeConfig::default(),
                Err(e) => return Err(e).context("failed to load config"),
            },
        };
        Ok(config)
    }

    /// Applies command-line overrides on top of the file.
    fn apply_overrides(&self, config: &mut BridgeConfig) {
        if let Some(host) = &self.server_host {
            config.server.address = host.clone();
        }
        if let Some(port) = self.server_port {
            config.server.port = port;
        }
        if self.disabled {
            config.device.enabled = false;
        }
    }
}

/// Wall-clock length of one period at the device rate.
fn period_duration(period_frames: u32) -> Duration {
    Duration::from_micros(u64::from(period_frames) * 1_000_000 / u64::from(SUPPORTED_SAMPLE_RATE))
}

fn build_device(config: &BridgeConfig, control: Arc<DeviceControl>) -> anyhow::Result<PcmDevice> {
    let settings = config
        .device_settings()
        .context("invalid server endpoint in config")?;
    let connector = TcpConnector::new(Duration::from_millis(config.server.connect_timeout_ms));
    let connections = ConnectionManager::new(Arc::new(connector));

    let kinds = config.aoip.adapters.clone();
    let adapter_settings = config.adapter_settings();
    let factory: AdapterFactory = Box::new(move || build_adapters(&kinds, &adapter_settings));

    Ok(PcmDevice::new(settings, control, connections, factory))
}

/// Applies one operator line to the switch and returns its value afterwards.
///
/// An empty line or `show` only reads the switch.
fn handle_control_line(control: &DeviceControl, line: &str) -> Result<String, ControlError> {
    let command = line.trim();
    if !command.is_empty() && command != "show" {
        control.store(command)?;
    }
    Ok(control.show())
}

/// Closes a device whose link was torn down and opens a fresh stream.
fn reopen(device: &mut PcmDevice, direction: StreamDirection) {
    if device.is_open() {
        if let Err(e) = device.close() {
            warn!("close before reopen failed: {e}");
        }
    }
    match device.open(direction) {
        Ok(()) => info!("stream reopened"),
        Err(e) => warn!("reopen failed: {e}"),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = cli.load_config()?;
    cli.apply_overrides(&mut config);

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.device.log_level)),
        )
        .init();

    config.validate().context("invalid configuration")?;
    let direction = StreamDirection::from(cli.direction);
    info!(
        "aoip bridge starting: server={}:{}, direction={}, adapters={:?}",
        config.server.address, config.server.port, direction, config.aoip.adapters
    );

    let control = Arc::new(DeviceControl::new(config.device.enabled));
    let mut device = build_device(&config, Arc::clone(&control))?;
    let channels = device.format().channels;
    let format = device
        .set_format(SUPPORTED_SAMPLE_RATE, channels, SampleFormat::S32Le.name())
        .context("device rejected its own format")?;
    device
        .open(direction)
        .with_context(|| format!("failed to open {direction} stream"))?;
    for warning in device.warnings() {
        warn!("{warning}");
    }
    info!("active adapters: {:?}", device.active_adapters());

    let frames = cli.period_frames as usize;
    let mut buffer = vec![0u8; format.frames_to_bytes(frames)];

    let mut period = tokio::time::interval(period_duration(cli.period_frames));
    period.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats = tokio::time::interval(STATS_INTERVAL);
    stats.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut operator = BufReader::new(tokio::io::stdin()).lines();
    let mut operator_open = true;

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                match result {
                    Ok(()) => info!("received Ctrl+C, shutting down"),
                    Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
                }
                break;
            }
            _ = period.tick() => {
                if !device.is_open() {
                    continue;
                }
                let result = match direction {
                    StreamDirection::Playback => device.write(&buffer, frames),
                    StreamDirection::Capture => device.read(&mut buffer, frames),
                };
                if let Err(e) = result {
                    warn!("period transfer failed: {e}");
                }
            }
            line = operator.next_line(), if operator_open => {
                match line {
                    Ok(Some(line)) => match handle_control_line(&control, &line) {
                        Ok(value) => info!("device enabled: {}", value.trim_end()),
                        Err(e) => warn!("{e}"),
                    },
                    Ok(None) => operator_open = false,
                    Err(e) => {
                        warn!("stdin closed: {e}");
                        operator_open = false;
                    }
                }
            }
            _ = stats.tick() => {
                info!("{}", device.stats());
                if !device.is_connected() {
                    reopen(&mut device, direction);
                }
            }
        }
    }

    if device.is_open() {
        device.close().context("failed to close stream")?;
    }
    info!("aoip bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use aoip_bridge::application::pcm_device::PcmError;
    use aoip_bridge::application::stream_session::SessionError;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act: no arguments
        let cli = Cli::parse_from(["aoip-bridge"]);

        // Assert
        assert_eq!(cli.direction, DirectionArg::Playback);
        assert_eq!(cli.period_frames, 480);
        assert!(!cli.disabled);
        assert!(cli.config.is_none());
        assert!(cli.server_host.is_none());
        assert!(cli.server_port.is_none());
    }

    #[test]
    fn test_cli_direction_capture() {
        let cli = Cli::parse_from(["aoip-bridge", "--direction", "capture"]);
        assert_eq!(StreamDirection::from(cli.direction), StreamDirection::Capture);
    }

    #[test]
    fn test_cli_rejects_unknown_direction() {
        let result = Cli::try_parse_from(["aoip-bridge", "--direction", "duplex"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_zero_period() {
        let result = Cli::try_parse_from(["aoip-bridge", "--period-frames", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_replace_server_and_disable_device() {
        // Arrange
        let cli = Cli::parse_from([
            "aoip-bridge",
            "--server-host",
            "203.0.113.5",
            "--server-port",
            "6000",
            "--disabled",
        ]);
        let mut config = BridgeConfig::default();

        // Act
        cli.apply_overrides(&mut config);

        // Assert
        assert_eq!(config.endpoint().unwrap().to_string(), "203.0.113.5:6000");
        assert!(!config.device.enabled);
    }

    #[test]
    fn test_no_overrides_keep_file_values() {
        let cli = Cli::parse_from(["aoip-bridge"]);
        let mut config = BridgeConfig::default();
        config.server.port = 7000;

        cli.apply_overrides(&mut config);

        assert_eq!(config.server.port, 7000);
        assert!(config.device.enabled);
    }

    #[test]
    fn test_period_duration_at_48k() {
        assert_eq!(period_duration(480), Duration::from_millis(10));
        assert_eq!(period_duration(48), Duration::from_millis(1));
    }

    #[test]
    fn test_build_device_uses_profile_format() {
        let device =
            build_device(&BridgeConfig::default(), Arc::new(DeviceControl::default())).unwrap();
        assert_eq!(device.format().channels, 32);
        assert!(!device.is_open());
    }

    #[test]
    fn test_control_line_stores_and_shows_switch() {
        // Arrange
        let control = DeviceControl::new(true);

        // Act
        let stored = handle_control_line(&control, "0\n").unwrap();
        let shown = handle_control_line(&control, "show").unwrap();
        let blank = handle_control_line(&control, "").unwrap();

        // Assert
        assert_eq!(stored, "0\n");
        assert_eq!(shown, "0\n");
        assert_eq!(blank, "0\n");
        assert!(!control.is_enabled());
    }

    #[test]
    fn test_control_line_rejects_garbage_and_keeps_switch() {
        let control = DeviceControl::new(true);

        let result = handle_control_line(&control, "off");

        assert_eq!(result, Err(ControlError::InvalidValue("off".to_string())));
        assert!(control.is_enabled());
    }

    #[test]
    fn test_control_line_disables_next_open() {
        // Arrange: a device sharing the switch with the operator input
        let control = Arc::new(DeviceControl::new(true));
        let mut device = build_device(&BridgeConfig::default(), Arc::clone(&control)).unwrap();

        // Act
        handle_control_line(&control, "0").unwrap();
        let result = device.open(StreamDirection::Playback);

        // Assert: refused before any connect attempt
        assert!(matches!(
            result,
            Err(PcmError::Session(SessionError::DeviceDisabled))
        ));
        assert!(!device.is_open());
    }

    #[test]
    fn test_missing_explicit_config_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("aoip-missing-{}.toml", uuid::Uuid::new_v4()));
        let cli = Cli::parse_from(["aoip-bridge", "--config", path.to_str().unwrap()]);

        let config = cli.load_config().unwrap();

        assert_eq!(config, BridgeConfig::default());
    }
}
