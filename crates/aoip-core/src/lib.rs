//! # aoip-core
//!
//! Shared library for the AoIP bridge containing the domain entities, the
//! JSON registration codec, and the RTP framing used by the protocol adapters.
//!
//! This crate has zero dependencies on sockets, threads, or the host audio
//! stack, so everything in it can be tested on any machine.
//!
//! # Architecture overview
//!
//! The bridge presents a multi-channel PCM device to a host audio stack and
//! relays every period of interleaved samples to a remote audio server over
//! TCP.  Before audio flows, the device registers itself with the server by
//! sending one JSON object describing its capabilities.
//!
//! - **`domain`** – Values that describe a stream: the server endpoint, the
//!   fixed frame format (48 kHz, 32-bit samples, 24 or 32 channels), and the
//!   device capabilities advertised at registration.
//!
//! - **`protocol`** – How those values become bytes: the `REGISTER` JSON
//!   message, the RTP header codec shared by the AES67 and Livewire+
//!   adapters, and the length framing that keeps RTP packets intact on a
//!   TCP stream.

pub mod domain;
pub mod protocol;

pub use domain::capabilities::{
    AoipSupport, CapabilityTemplate, DeviceCapabilities, LivewireSupport, DEFAULT_DEVICE_NAME,
};
pub use domain::endpoint::{EndpointError, ServerEndpoint};
pub use domain::format::{
    ChannelProfile, FormatError, FrameFormat, SampleFormat, StreamDirection, SUPPORTED_SAMPLE_RATE,
};
pub use protocol::registration::{
    decode_control_message, encode_registration, ControlMessage, ProtocolError,
};
pub use protocol::framing::{
    decode_frame, write_frame_prefix, FramingError, FRAME_PREFIX_LEN, MAX_FRAMED_PACKET,
};
pub use protocol::rtp::{
    locate_payload, PayloadLocation, RtpError, RtpExtension, RtpHeader, LIVEWIRE_EXT_PROFILE,
    RTP_HEADER_LEN,
};
