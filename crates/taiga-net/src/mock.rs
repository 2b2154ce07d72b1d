//! Mock devices and transports for protocol-level tests
//!
//! [`MockTun`] stands in for a TUN device: tests inject inbound packets and
//! inspect what the code under test wrote. [`memory_transport_pair`] gives
//! two connected in-memory [`Transport`] endpoints so a client and a scripted
//! peer can talk without sockets.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::{NetError, NetResult};
use crate::transport::Transport;
use crate::tun::TunIo;

/// In-memory TUN device
pub struct MockTun {
    name: String,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    written: StdMutex<Vec<Vec<u8>>>,
}

impl MockTun {
    pub fn new(name: &str) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            written: StdMutex::new(Vec::new()),
        }
    }

    /// Queue a packet for the next `recv` call
    pub fn inject(&self, packet: &[u8]) {
        let _ = self.inbound_tx.send(packet.to_vec());
    }

    /// Snapshot of everything written so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    /// Number of packets written so far
    pub fn write_count(&self) -> usize {
        self.written.lock().unwrap().len()
    }
}

#[async_trait]
impl TunIo for MockTun {
    async fn recv(&self, buf: &mut [u8]) -> NetResult<usize> {
        let mut rx = self.inbound_rx.lock().await;
        let packet = rx.recv().await.ok_or(NetError::ConnectionClosed)?;
        let n = packet.len().min(buf.len());
        buf[..n].copy_from_slice(&packet[..n]);
        Ok(n)
    }

    async fn send(&self, packet: &[u8]) -> NetResult<usize> {
        self.written.lock().unwrap().push(packet.to_vec());
        Ok(packet.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One end of an in-memory transport
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: StdMutex<bool>,
}

/// Two connected in-memory transports
pub fn memory_transport_pair() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            tx: a_tx,
            rx: Mutex::new(a_rx),
            closed: StdMutex::new(false),
        },
        MemoryTransport {
            tx: b_tx,
            rx: Mutex::new(b_rx),
            closed: StdMutex::new(false),
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, data: &[u8]) -> NetResult<()> {
        if *self.closed.lock().unwrap() {
            return Err(NetError::ConnectionClosed);
        }
        self.tx
            .send(data.to_vec())
            .map_err(|_| NetError::ConnectionClosed)
    }

    async fn receive(&self) -> NetResult<Vec<u8>> {
        if *self.closed.lock().unwrap() {
            return Err(NetError::ConnectionClosed);
        }
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(NetError::ConnectionClosed)
    }

    async fn disconnect(&self) -> NetResult<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Simple IPv4/UDP packet builder for tests that need plausible L3 bytes
pub struct Ipv4PacketBuilder {
    src: [u8; 4],
    dst: [u8; 4],
    payload: Vec<u8>,
}

impl Ipv4PacketBuilder {
    pub fn new() -> Self {
        Self {
            src: [10, 0, 0, 2],
            dst: [8, 8, 8, 8],
            payload: Vec::new(),
        }
    }

    pub fn src(mut self, a: u8, b: u8, c: u8, d: u8) -> Self {
        self.src = [a, b, c, d];
        self
    }

    pub fn dst(mut self, a: u8, b: u8, c: u8, d: u8) -> Self {
        self.dst = [a, b, c, d];
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Minimal IPv4 header (no options, protocol UDP) plus payload
    pub fn build(self) -> Vec<u8> {
        let total_len = 20 + self.payload.len();
        let mut packet = vec![0u8; total_len];
        packet[0] = 0x45; // version 4, IHL 5
        packet[2] = (total_len >> 8) as u8;
        packet[3] = total_len as u8;
        packet[8] = 64; // TTL
        packet[9] = 17; // UDP
        packet[12..16].copy_from_slice(&self.src);
        packet[16..20].copy_from_slice(&self.dst);
        packet[20..].copy_from_slice(&self.payload);
        packet
    }
}

impl Default for Ipv4PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_tun_inject_and_capture() {
        let tun = MockTun::new("mock0");
        tun.inject(&[1, 2, 3]);

        let mut buf = [0u8; 16];
        let n = tun.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);

        tun.send(&[4, 5]).await.unwrap();
        assert_eq!(tun.written(), vec![vec![4, 5]]);
        assert_eq!(tun.write_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_transport_pair_duplex() {
        let (a, b) = memory_transport_pair();

        a.send(b"ping").await.unwrap();
        assert_eq!(b.receive().await.unwrap(), b"ping");

        b.send(b"pong").await.unwrap();
        assert_eq!(a.receive().await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_memory_transport_disconnect() {
        let (a, b) = memory_transport_pair();
        a.disconnect().await.unwrap();
        assert!(a.send(b"x").await.is_err());
        assert!(a.receive().await.is_err());
        // The peer still holds its own state
        assert!(b.send(b"y").await.is_ok());
    }

    #[test]
    fn test_ipv4_builder_header_fields() {
        let packet = Ipv4PacketBuilder::new()
            .src(11, 0, 0, 2)
            .dst(1, 1, 1, 1)
            .payload(b"data")
            .build();

        assert_eq!(packet[0] >> 4, 4);
        assert_eq!(packet.len(), 24);
        assert_eq!(&packet[12..16], &[11, 0, 0, 2]);
        assert_eq!(&packet[16..20], &[1, 1, 1, 1]);
        assert_eq!(&packet[20..], b"data");
    }
}
