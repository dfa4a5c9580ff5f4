//! AdapterChain: runs the configured protocol adapters in order and contains
//! their failures.
//!
//! # Ordering
//!
//! ```text
//!  outbound:  host ─► A ─► B ─► C ─► socket
//!  inbound:   host ◄─ A ◄─ B ◄─ C ◄─ socket
//!  cleanup:               C, B, A
//! ```
//!
//! # Failure containment
//!
//! No adapter failure ever reaches the audio path as an error:
//!
//! - a failed `init` disables that adapter for the rest of the session;
//! - a failed `process_*` disables that adapter and the packet continues
//!   through the rest of the chain as if the adapter were absent;
//! - a failed `cleanup` is recorded and the remaining adapters are still
//!   cleaned up.
//!
//! Every contained failure is logged and returned as a [`SessionWarning`].
//!
//! # Buffers
//!
//! The chain owns two packet buffers and swaps them between adapters, so a
//! steady stream of periods runs without allocating once the buffers have
//! grown to the period size.

use std::mem;

use tracing::{debug, warn};

use aoip_core::StreamDirection;

use super::protocol_adapter::{ProtocolAdapter, SessionContext};
use super::stream_session::SessionWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// `init` not yet called.
    Pending,
    Active,
    /// `init` or a `process_*` call failed.
    Disabled,
    CleanedUp,
}

struct Slot {
    adapter: Box<dyn ProtocolAdapter>,
    state: SlotState,
    init_invoked: bool,
}

/// Ordered, supervised set of protocol adapters for one session.
pub struct AdapterChain {
    slots: Vec<Slot>,
    /// Holds the packet as it stands after the adapters run so far.
    current: Vec<u8>,
    /// Output buffer handed to the next adapter.
    spare: Vec<u8>,
}

impl AdapterChain {
    /// Builds a chain; `adapters` order is init order.
    pub fn new(adapters: Vec<Box<dyn ProtocolAdapter>>) -> Self {
        Self {
            slots: adapters
                .into_iter()
                .map(|adapter| Slot {
                    adapter,
                    state: SlotState::Pending,
                    init_invoked: false,
                })
                .collect(),
            current: Vec::new(),
            spare: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Names of the adapters currently processing packets.
    pub fn active_names(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Active)
            .map(|s| s.adapter.name())
            .collect()
    }

    pub fn has_active(&self) -> bool {
        self.slots.iter().any(|s| s.state == SlotState::Active)
    }

    /// Initializes every pending adapter in order.
    pub fn init_all(&mut self, ctx: &SessionContext) -> Vec<SessionWarning> {
        let mut warnings = Vec::new();
        for slot in self.slots.iter_mut().filter(|s| s.state == SlotState::Pending) {
            slot.init_invoked = true;
            match slot.adapter.init(ctx) {
                Ok(()) => {
                    slot.state = SlotState::Active;
                    debug!("adapter '{}' initialized", slot.adapter.name());
                }
                Err(e) => {
                    slot.state = SlotState::Disabled;
                    warn!("adapter '{}' disabled: {}", slot.adapter.name(), e);
                    warnings.push(SessionWarning::AdapterInit {
                        adapter: slot.adapter.name(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        warnings
    }

    /// Passes a host packet through the active adapters in init order.
    pub fn outbound(&mut self, packet: &[u8], warnings: &mut Vec<SessionWarning>) -> &[u8] {
        self.current.clear();
        self.current.extend_from_slice(packet);
        for slot in self.slots.iter_mut() {
            process(
                slot,
                &mut self.current,
                &mut self.spare,
                StreamDirection::Playback,
                warnings,
            );
        }
        &self.current
    }

    /// Passes a server packet through the active adapters in reverse order.
    pub fn inbound(&mut self, packet: &[u8], warnings: &mut Vec<SessionWarning>) -> &[u8] {
        self.current.clear();
        self.current.extend_from_slice(packet);
        for slot in self.slots.iter_mut().rev() {
            process(
                slot,
                &mut self.current,
                &mut self.spare,
                StreamDirection::Capture,
                warnings,
            );
        }
        &self.current
    }

    /// Cleans up, in reverse init order, every adapter whose `init` was
    /// invoked and which has not been cleaned up yet.
    pub fn cleanup_all(&mut self) -> Vec<SessionWarning> {
        let mut warnings = Vec::new();
        for slot in self.slots.iter_mut().rev() {
            if !slot.init_invoked || slot.state == SlotState::CleanedUp {
                continue;
            }
            if let Err(e) = slot.adapter.cleanup() {
                warn!("adapter '{}' cleanup failed: {}", slot.adapter.name(), e);
                warnings.push(SessionWarning::AdapterCleanup {
                    adapter: slot.adapter.name(),
                    reason: e.to_string(),
                });
            }
            slot.state = SlotState::CleanedUp;
        }
        warnings
    }

    /// Sum of the framing overhead of the active adapters.
    pub fn framing_overhead(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Active)
            .map(|s| s.adapter.framing_overhead())
            .sum()
    }
}

/// Runs one adapter.  On success its output becomes `current`; on failure
/// `current` is left as it was.
fn process(
    slot: &mut Slot,
    current: &mut Vec<u8>,
    spare: &mut Vec<u8>,
    direction: StreamDirection,
    warnings: &mut Vec<SessionWarning>,
) {
    if slot.state != SlotState::Active {
        return;
    }
    spare.clear();
    let result = match direction {
        StreamDirection::Playback => slot.adapter.process_outbound(current, spare),
        StreamDirection::Capture => slot.adapter.process_inbound(current, spare),
    };
    match result {
        Ok(()) => mem::swap(current, spare),
        Err(e) => {
            slot.state = SlotState::Disabled;
            warn!(
                "adapter '{}' disabled after {} failure: {}",
                slot.adapter.name(),
                direction,
                e
            );
            warnings.push(SessionWarning::AdapterProcess {
                adapter: slot.adapter.name(),
                direction,
                reason: e.to_string(),
            });
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
