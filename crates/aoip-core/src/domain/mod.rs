//! Domain entities for the AoIP bridge.
//!
//! This module contains plain values with no infrastructure dependencies.
//! The outer layers (connection manager, stream session, CLI) build on these
//! types, but nothing here knows about sockets or the audio pipeline.

/// Device capabilities advertised to the audio server at registration.
pub mod capabilities;

/// The remote audio server address.
pub mod endpoint;

/// Sample format, channel profile, and frame-size arithmetic.
pub mod format;
