//! Dante discovery adapter.
//!
//! Dante streams are found through discovery rather than carried in-band, so
//! this adapter leaves audio packets alone.  At init it takes out a
//! registration handle and, when an announce address is configured, sends one
//! `ANNOUNCE` datagram; at cleanup it sends one `WITHDRAW` for the same
//! handle.  Both sends are single non-blocking attempts.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::protocol_adapter::{AdapterError, ProtocolAdapter, SessionContext};

const NAME: &str = "dante";

/// Discovery datagrams, encoded as compact JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum DiscoveryMessage {
    #[serde(rename = "ANNOUNCE")]
    Announce {
        handle: Uuid,
        device_name: String,
        ip_address: Ipv4Addr,
        channels: u16,
        sample_rate: u32,
    },
    #[serde(rename = "WITHDRAW")]
    Withdraw { handle: Uuid },
}

pub struct DanteAdapter {
    announce_addr: Option<SocketAddr>,
    handle: Option<Uuid>,
    socket: Option<UdpSocket>,
}

impl DanteAdapter {
    pub fn new(announce_addr: Option<SocketAddr>) -> Self {
        Self {
            announce_addr,
            handle: None,
            socket: None,
        }
    }

    /// Registration handle while initialized.
    pub fn handle(&self) -> Option<Uuid> {
        self.handle
    }

    fn io_error(source: io::Error) -> AdapterError {
        AdapterError::Io {
            adapter: NAME,
            source,
        }
    }
}

fn send_message(
    socket: &UdpSocket,
    target: SocketAddr,
    message: &DiscoveryMessage,
) -> Result<(), AdapterError> {
    let bytes = serde_json::to_vec(message).map_err(|e| DanteAdapter::io_error(e.into()))?;
    socket
        .send_to(&bytes, target)
        .map_err(DanteAdapter::io_error)?;
    Ok(())
}

impl ProtocolAdapter for DanteAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, ctx: &SessionContext) -> Result<(), AdapterError> {
        let handle = Uuid::new_v4();
        self.handle = Some(handle);

        let Some(target) = self.announce_addr else {
            debug!("dante handle {} (no announce address configured)", handle);
            return Ok(());
        };
        let bind: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind).map_err(Self::io_error)?;
        socket.set_nonblocking(true).map_err(Self::io_error)?;
        let socket = self.socket.insert(socket);

        send_message(
            socket,
            target,
            &DiscoveryMessage::Announce {
                handle,
                device_name: ctx.device_name.clone(),
                ip_address: ctx.local_ip,
                channels: ctx.format.channels,
                sample_rate: ctx.format.sample_rate,
            },
        )?;
        info!("dante announced handle {} to {}", handle, target);
        Ok(())
    }

    fn process_outbound(&mut self, packet: &[u8], out: &mut Vec<u8>) -> Result<(), AdapterError> {
        out.extend_from_slice(packet);
        Ok(())
    }

    fn process_inbound(&mut self, packet: &[u8], out: &mut Vec<u8>) -> Result<(), AdapterError> {
        out.extend_from_slice(packet);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), AdapterError> {
        let handle = self.handle.take();
        let socket = self.socket.take();
        match (handle, socket, self.announce_addr) {
            (Some(handle), Some(socket), Some(target)) => {
                send_message(&socket, target, &DiscoveryMessage::Withdraw { handle })?;
                info!("dante withdrew handle {}", handle);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn framing_overhead(&self) -> usize {
        0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::{decode_with, encode_with, test_context};
    use std::time::Duration;

    fn listener() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn receive_json(socket: &UdpSocket) -> serde_json::Value {
        let mut buf = [0u8; 1024];
        let (n, _) = socket.recv_from(&mut buf).expect("datagram must arrive");
        serde_json::from_slice(&buf[..n]).unwrap()
    }

    #[test]
    fn test_frames_pass_through_unchanged() {
        let mut adapter = DanteAdapter::new(None);
        adapter.init(&test_context()).unwrap();
        let payload = vec![3u8; 512];

        let wire = encode_with(&mut adapter, &payload).unwrap();
        let back = decode_with(&mut adapter, &wire).unwrap();

        assert_eq!(wire, payload);
        assert_eq!(back, payload);
        assert_eq!(adapter.framing_overhead(), 0);
    }

    #[test]
    fn test_init_without_announce_address_only_assigns_handle() {
        let mut adapter = DanteAdapter::new(None);

        adapter.init(&test_context()).unwrap();

        assert!(adapter.handle().is_some());
        adapter.cleanup().unwrap();
        assert!(adapter.handle().is_none());
    }

    #[test]
    fn test_announce_then_withdraw_once() {
        // Arrange
        let (server, addr) = listener();
        let mut adapter = DanteAdapter::new(Some(addr));

        // Act
        adapter.init(&test_context()).unwrap();
        let handle = adapter.handle().unwrap();
        let announce = receive_json(&server);
        adapter.cleanup().unwrap();
        adapter.cleanup().unwrap();
        let withdraw = receive_json(&server);

        // Assert
        assert_eq!(announce["type"], "ANNOUNCE");
        assert_eq!(announce["handle"], handle.to_string());
        assert_eq!(announce["channels"], 32);
        assert_eq!(announce["sample_rate"], 48_000);
        assert_eq!(withdraw["type"], "WITHDRAW");
        assert_eq!(withdraw["handle"], handle.to_string());

        server
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let mut buf = [0u8; 64];
        assert!(server.recv_from(&mut buf).is_err(), "only one WITHDRAW");
    }
}
