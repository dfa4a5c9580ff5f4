//! The protocol adapter contract.
//!
//! A protocol adapter gets a look at every packet on its way to and from the
//! audio server and may reshape it: prepend an RTP header, strip one, or just
//! observe.  Adapters are independent of each other and of the socket; the
//! [`super::adapter_chain::AdapterChain`] decides who runs when and what
//! happens when one of them fails.
//!
//! Concrete adapters live in `crate::infrastructure::adapters`.

use std::io;
use std::net::Ipv4Addr;

use aoip_core::{FrameFormat, ServerEndpoint, StreamDirection};
use thiserror::Error;

/// Error type for adapter operations.  Always contained by the chain.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{adapter}: initialization failed: {reason}")]
    Init {
        adapter: &'static str,
        reason: String,
    },
    #[error("{adapter}: malformed packet: {reason}")]
    Malformed {
        adapter: &'static str,
        reason: String,
    },
    #[error("{adapter}: used before init")]
    NotInitialized { adapter: &'static str },
    #[error("{adapter}: I/O error: {source}")]
    Io {
        adapter: &'static str,
        #[source]
        source: io::Error,
    },
}

/// What an adapter learns about the stream it is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub endpoint: ServerEndpoint,
    pub direction: StreamDirection,
    pub format: FrameFormat,
    pub device_name: String,
    /// The address advertised at registration.
    pub local_ip: Ipv4Addr,
}

/// One pluggable AoIP protocol handler, scoped to a single stream session.
///
/// `process_*` read the packet by reference and append the packet to pass on
/// to `out`, which arrives empty and is reused from period to period.  On
/// `Err` the chain discards `out` and forwards the input unchanged.
#[cfg_attr(test, mockall::automock)]
pub trait ProtocolAdapter: Send {
    /// Short lowercase name used in logs and warnings.
    fn name(&self) -> &'static str;

    fn init(&mut self, ctx: &SessionContext) -> Result<(), AdapterError>;

    /// Host → server.  Must be deterministic given the input and adapter state.
    fn process_outbound(&mut self, packet: &[u8], out: &mut Vec<u8>) -> Result<(), AdapterError>;

    /// Server → host.
    fn process_inbound(&mut self, packet: &[u8], out: &mut Vec<u8>) -> Result<(), AdapterError>;

    /// Releases whatever `init` acquired.  Idempotent and never blocks.
    fn cleanup(&mut self) -> Result<(), AdapterError>;

    /// Upper bound on the bytes `process_outbound` adds to a packet.
    fn framing_overhead(&self) -> usize;
}
