//! Stream direction, sample format, and frame-size arithmetic.
//!
//! The bridge supports exactly one hardware format: 48 kHz, signed 32-bit
//! little-endian samples, interleaved.  Only the channel count varies between
//! deployments: the baseline device exposes 24 channels, the extended device
//! 32.
//!
//! # Frames vs. bytes
//!
//! The host audio stack counts in *frames* (one sample period across every
//! channel).  Sockets count in bytes.  [`FrameFormat`] converts between the
//! two so a partial socket write can be reported as the number of whole
//! frames the server actually received.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only sample rate the device accepts.
pub const SUPPORTED_SAMPLE_RATE: u32 = 48_000;

/// Error returned when a requested hardware format is not supported.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unsupported sample rate {requested} Hz (only {} Hz)", SUPPORTED_SAMPLE_RATE)]
    UnsupportedRate { requested: u32 },
    #[error("unsupported channel count {requested} (device has {supported})")]
    UnsupportedChannels { requested: u16, supported: u16 },
    #[error("unsupported sample format '{0}'")]
    UnsupportedSampleFormat(String),
}

/// Direction of an audio stream, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamDirection {
    /// Audio flows from the network into the host (host reads).
    Capture,
    /// Audio flows from the host out to the network (host writes).
    Playback,
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamDirection::Capture => f.write_str("capture"),
            StreamDirection::Playback => f.write_str("playback"),
        }
    }
}

/// PCM sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Signed 32-bit, little-endian.
    #[serde(rename = "S32_LE")]
    S32Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S32Le => 4,
        }
    }

    /// Host-facing name of the format (ALSA spelling).
    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::S32Le => "S32_LE",
        }
    }

    /// Parses the host-facing format name.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::UnsupportedSampleFormat`] for anything other
    /// than `S32_LE`.
    pub fn from_name(name: &str) -> Result<Self, FormatError> {
        match name {
            "S32_LE" => Ok(SampleFormat::S32Le),
            other => Err(FormatError::UnsupportedSampleFormat(other.to_string())),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which hardware variant the device presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelProfile {
    /// 24 channels.
    Baseline,
    /// 32 channels.
    #[default]
    Extended,
}

impl ChannelProfile {
    pub fn channels(self) -> u16 {
        match self {
            ChannelProfile::Baseline => 24,
            ChannelProfile::Extended => 32,
        }
    }
}

/// The negotiated format of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl FrameFormat {
    /// The fixed device format for a channel profile.
    pub fn for_profile(profile: ChannelProfile) -> Self {
        Self {
            sample_rate: SUPPORTED_SAMPLE_RATE,
            channels: profile.channels(),
            sample_format: SampleFormat::S32Le,
        }
    }

    /// Validates a host format request against the device profile.
    ///
    /// # Errors
    ///
    /// Returns the first [`FormatError`] found, checking rate, then channel
    /// count, then sample format.
    pub fn negotiate(
        profile: ChannelProfile,
        sample_rate: u32,
        channels: u16,
        sample_format: &str,
    ) -> Result<Self, FormatError> {
        if sample_rate != SUPPORTED_SAMPLE_RATE {
            return Err(FormatError::UnsupportedRate {
                requested: sample_rate,
            });
        }
        if channels != profile.channels() {
            return Err(FormatError::UnsupportedChannels {
                requested: channels,
                supported: profile.channels(),
            });
        }
        let sample_format = SampleFormat::from_name(sample_format)?;
        Ok(Self {
            sample_rate,
            channels,
            sample_format,
        })
    }

    /// Size of one interleaved frame in bytes.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.bytes_per_frame()
    }

    /// Number of *whole* frames contained in `bytes`.
    pub fn bytes_to_frames(&self, bytes: usize) -> usize {
        match self.bytes_per_frame() {
            0 => 0,
            bpf => bytes / bpf,
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz / {} ch / {}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_profile_frame_is_128_bytes() {
        let fmt = FrameFormat::for_profile(ChannelProfile::Extended);
        assert_eq!(fmt.bytes_per_frame(), 128);
        assert_eq!(fmt.frames_to_bytes(128), 16_384);
    }

    #[test]
    fn test_baseline_profile_has_24_channels() {
        let fmt = FrameFormat::for_profile(ChannelProfile::Baseline);
        assert_eq!(fmt.channels, 24);
        assert_eq!(fmt.bytes_per_frame(), 96);
    }

    #[test]
    fn test_bytes_to_frames_rounds_down_to_whole_frames() {
        let fmt = FrameFormat::for_profile(ChannelProfile::Extended);
        assert_eq!(fmt.bytes_to_frames(256), 2);
        assert_eq!(fmt.bytes_to_frames(255), 1);
        assert_eq!(fmt.bytes_to_frames(127), 0);
    }

    #[test]
    fn test_negotiate_accepts_device_format() {
        let fmt = FrameFormat::negotiate(ChannelProfile::Extended, 48_000, 32, "S32_LE").unwrap();
        assert_eq!(fmt, FrameFormat::for_profile(ChannelProfile::Extended));
    }

    #[test]
    fn test_negotiate_rejects_44k1() {
        let result = FrameFormat::negotiate(ChannelProfile::Extended, 44_100, 32, "S32_LE");
        assert_eq!(result, Err(FormatError::UnsupportedRate { requested: 44_100 }));
    }

    #[test]
    fn test_negotiate_rejects_wrong_channel_count_for_profile() {
        let result = FrameFormat::negotiate(ChannelProfile::Baseline, 48_000, 32, "S32_LE");
        assert_eq!(
            result,
            Err(FormatError::UnsupportedChannels {
                requested: 32,
                supported: 24
            })
        );
    }

    #[test]
    fn test_negotiate_rejects_s16() {
        let result = FrameFormat::negotiate(ChannelProfile::Extended, 48_000, 32, "S16_LE");
        assert!(matches!(result, Err(FormatError::UnsupportedSampleFormat(_))));
    }

    #[test]
    fn test_channel_profile_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            profile: ChannelProfile,
        }
        let w: Wrapper = serde_json::from_str(r#"{"profile":"baseline"}"#).unwrap();
        assert_eq!(w.profile, ChannelProfile::Baseline);
    }
}
