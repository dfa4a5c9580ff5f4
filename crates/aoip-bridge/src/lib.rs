//! aoip-bridge library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does aoip-bridge do? (for beginners)
//!
//! The bridge presents itself to the host as a 32- (or 24-) channel,
//! 48 kHz PCM device.  Frames the host plays are pushed over TCP to a remote
//! audio server; frames the server sends are handed back when the host
//! captures.  Before any audio flows the bridge:
//!
//! 1. Connects to the configured server endpoint.
//! 2. Sends a one-shot JSON `REGISTER` message describing the device.
//! 3. Initializes the configured AoIP adapters (Livewire+, Dante, AES67),
//!    which wrap outgoing packets and unwrap incoming ones.
//!
//! An administrative switch can disable the device; while disabled, opening
//! a stream fails and no connection is attempted.

/// Application layer: stream lifecycle, adapter chain, PCM device surface.
pub mod application;

/// Infrastructure layer: network, protocol adapters, config storage.
pub mod infrastructure;
