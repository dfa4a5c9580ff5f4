//! Application layer use cases for the bridge.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure values in `aoip_core`) and the infrastructure (sockets, files).  It
//! decides *what happens when*: which adapter runs first, which failures stop
//! a stream and which are only logged.
//!
//! # Sub-modules
//!
//! - **`protocol_adapter`** – The trait every AoIP protocol handler implements.
//! - **`adapter_chain`**    – Runs adapters in order and contains their failures.
//! - **`stream_session`**   – The per-stream state machine (connect, register,
//!   move frames, tear down).
//! - **`pcm_device`**       – Frame-level entry point for the host audio stack.
//! - **`device_control`**   – The administrative enable/disable switch.

pub mod adapter_chain;
pub mod device_control;
pub mod pcm_device;
pub mod protocol_adapter;
pub mod stream_session;
