//! Protocol module: the JSON registration handshake, RTP headers, and the
//! length framing that carries RTP packets over TCP.

pub mod framing;
pub mod registration;
pub mod rtp;

pub use framing::{decode_frame, write_frame_prefix, FramingError};
pub use registration::{decode_control_message, encode_registration, ControlMessage, ProtocolError};
pub use rtp::{locate_payload, PayloadLocation, RtpError, RtpExtension, RtpHeader};
