//! Infrastructure layer for the bridge.
//!
//! Contains the OS-facing pieces: the TCP link to the audio server, the
//! concrete AoIP protocol adapters, and configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `aoip_core`, but the domain types in `aoip_core` never depend on it.
//!
//! # Sub-modules
//!
//! - **`network`** – Connector seam, connection manager and the non-blocking
//!   frame transport.  A scriptable mock connector lives here for tests.
//! - **`adapters`** – Livewire+, Dante and AES67 implementations of
//!   `ProtocolAdapter`, and the factory that builds them from config.
//! - **`storage`** – TOML configuration file.

pub mod adapters;
pub mod network;
pub mod storage;
