//! Session management and packet dispatch
//!
//! One [`Handler`] serves every accepted connection. A connection starts
//! pending; the first handshake that decrypts registers it, storing the
//! client's public key and a response encoder bound to it. Data frames from
//! pending connections are dropped. The encoder table is the only state
//! shared between the inbound dispatch path and the egress pump, held under
//! a readers-writer lock: dispatch takes read for membership and write for
//! insert/remove, the egress pump takes read for one fan-out pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use taiga_crypto::{PublicKey, SecretKey};
use taiga_net::{ConnHandle, ConnId, FrameHandler, TunIo, IFACE_BUFSIZE};
use taiga_proto::{Decoder, Encoder, FrameType, HandshakeAck, Msg, RawMsg};

/// State for one registered connection
struct PeerSession {
    client_public_key: PublicKey,
    encoder: Encoder,
    conn: ConnHandle,
}

/// Processes frames between clients and the node's virtual interface
pub struct Handler {
    tun: Arc<dyn TunIo>,
    decoder: Decoder,
    sessions: RwLock<HashMap<ConnId, PeerSession>>,
}

impl Handler {
    /// Create a handler decrypting with the node's private key
    pub fn new(tun: Arc<dyn TunIo>, private_key: SecretKey) -> Self {
        Self {
            tun,
            decoder: Decoder::new(private_key),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of registered connections
    pub async fn registered_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Read packets from the node TUN and fan them out to every registered
    /// client, each sealed under that client's key
    ///
    /// The node does not route by inner destination address; every packet
    /// goes to every registered client. Returns when the token is cancelled
    /// or the interface read fails.
    pub async fn run_egress(&self, shutdown: CancellationToken) {
        let mut buf = vec![0u8; IFACE_BUFSIZE];

        loop {
            let n = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("egress pump shutting down");
                    return;
                }
                read = self.tun.recv(&mut buf) => match read {
                    Ok(n) => n,
                    Err(e) => {
                        error!("TUN read failed, stopping egress pump: {}", e);
                        return;
                    }
                },
            };

            if n == 0 {
                continue;
            }

            self.broadcast(&buf[..n]).await;
        }
    }

    /// Seal one packet to every registered client and send best-effort
    ///
    /// A send failure never removes the session; cleanup belongs to the
    /// disconnect path.
    async fn broadcast(&self, packet: &[u8]) {
        let message = Msg {
            flags: 0,
            timestamp: unix_now(),
            next_hop: None,
            data: packet.to_vec(),
        };

        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            let raw = match session.encoder.encrypt_msg(&message) {
                Ok(raw) => raw,
                Err(e) => {
                    error!(conn = %session.conn.id(), "failed to encrypt response: {}", e);
                    continue;
                }
            };

            if let Err(e) = session.conn.send(raw.encode()).await {
                debug!(conn = %session.conn.id(), "send failed: {}", e);
            }
        }
    }

    async fn handle_handshake(&self, conn: &ConnHandle, raw: &RawMsg) {
        let hs = match self.decoder.decrypt_handshake(raw) {
            Ok(hs) => hs,
            Err(e) => {
                // Without the client key there is nothing to encrypt an ack to
                warn!(conn = %conn.id(), "failed to decrypt handshake: {}", e);
                return;
            }
        };

        let encoder = Encoder::new(hs.client_public_key);
        let ack_encoder = encoder.clone();

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            conn.id(),
            PeerSession {
                client_public_key: hs.client_public_key,
                encoder,
                conn: conn.clone(),
            },
        );
        drop(sessions);

        info!(
            conn = %conn.id(),
            pubkey = %hs.client_public_key.short_hex(),
            "client registered"
        );

        self.send_ack(conn, &ack_encoder).await;
    }

    async fn send_ack(&self, conn: &ConnHandle, encoder: &Encoder) {
        let ack = HandshakeAck {
            success: true,
            message: "ok".to_string(),
        };

        let raw = match encoder.encrypt_handshake_ack(&ack) {
            Ok(raw) => raw,
            Err(e) => {
                error!(conn = %conn.id(), "failed to encrypt ack: {}", e);
                return;
            }
        };

        if let Err(e) = conn.send(raw.encode()).await {
            error!(conn = %conn.id(), "failed to send ack: {}", e);
        }
    }

    async fn handle_data(&self, conn: &ConnHandle, raw: &RawMsg) {
        {
            let sessions = self.sessions.read().await;
            if !sessions.contains_key(&conn.id()) {
                warn!(conn = %conn.id(), "data from unregistered client, ignoring");
                return;
            }
        }

        let msg = match self.decoder.decrypt_msg(raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(conn = %conn.id(), "failed to decrypt message: {}", e);
                return;
            }
        };

        if msg.next_hop.is_some() {
            warn!(conn = %conn.id(), "multi-hop routing not implemented");
            return;
        }

        if let Err(e) = self.tun.send(&msg.data).await {
            warn!(conn = %conn.id(), "failed to write to TUN: {}", e);
        }
    }
}

#[async_trait]
impl FrameHandler for Handler {
    async fn on_frame(&self, conn: &ConnHandle, data: Vec<u8>) {
        let raw = match RawMsg::decode(&data) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(conn = %conn.id(), "failed to decode frame: {}", e);
                return;
            }
        };

        match raw.header.frame_type {
            FrameType::Handshake => self.handle_handshake(conn, &raw).await,
            FrameType::Data => self.handle_data(conn, &raw).await,
            FrameType::HandshakeAck => {
                warn!(conn = %conn.id(), "unexpected handshake ack from client");
            }
        }
    }

    async fn on_disconnect(&self, conn: ConnId) {
        let removed = self.sessions.write().await.remove(&conn);
        if let Some(session) = removed {
            info!(
                conn = %conn,
                pubkey = %session.client_public_key.short_hex(),
                "client disconnected"
            );
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taiga_crypto::generate_keypair;
    use taiga_net::mock::MockTun;
    use tokio::sync::mpsc;

    struct TestClient {
        secret: SecretKey,
        public: PublicKey,
        node_encoder: Encoder,
    }

    impl TestClient {
        fn new(node_public: PublicKey) -> Self {
            let (secret, public) = generate_keypair();
            Self {
                secret,
                public,
                node_encoder: Encoder::new(node_public),
            }
        }

        fn handshake_frame(&self) -> Vec<u8> {
            self.node_encoder
                .encrypt_handshake(&taiga_proto::Handshake {
                    client_public_key: self.public,
                })
                .unwrap()
                .encode()
        }

        fn data_frame(&self, data: &[u8]) -> Vec<u8> {
            self.node_encoder
                .encrypt_msg(&Msg {
                    flags: 0,
                    timestamp: 0,
                    next_hop: None,
                    data: data.to_vec(),
                })
                .unwrap()
                .encode()
        }

        fn decoder(&self) -> Decoder {
            Decoder::new(self.secret.clone())
        }
    }

    fn test_handler() -> (Arc<MockTun>, Handler, PublicKey) {
        let (node_secret, node_public) = generate_keypair();
        let tun = Arc::new(MockTun::new("mock0"));
        let handler = Handler::new(tun.clone(), node_secret);
        (tun, handler, node_public)
    }

    fn test_conn(id: u64) -> (ConnHandle, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(taiga_net::server::SEND_QUEUE_FRAMES);
        (ConnHandle::stream(id, tx), rx)
    }

    #[tokio::test]
    async fn test_data_before_handshake_dropped() {
        let (tun, handler, node_public) = test_handler();
        let client = TestClient::new(node_public);
        let (conn, _rx) = test_conn(0);

        handler
            .on_frame(&conn, client.data_frame(&[0xAA, 0xBB, 0xCC]))
            .await;

        assert_eq!(tun.write_count(), 0);
        assert_eq!(handler.registered_count().await, 0);
    }

    #[tokio::test]
    async fn test_handshake_then_data_reaches_tun() {
        let (tun, handler, node_public) = test_handler();
        let client = TestClient::new(node_public);
        let (conn, mut rx) = test_conn(0);

        handler.on_frame(&conn, client.handshake_frame()).await;
        assert_eq!(handler.registered_count().await, 1);

        // The ack comes back encrypted to the client key
        let ack_bytes = rx.recv().await.unwrap();
        let ack_raw = RawMsg::decode(&ack_bytes).unwrap();
        assert_eq!(ack_raw.header.frame_type, FrameType::HandshakeAck);
        let ack = client.decoder().decrypt_handshake_ack(&ack_raw).unwrap();
        assert!(ack.success);
        assert_eq!(ack.message, "ok");

        handler
            .on_frame(&conn, client.data_frame(&[0xAA, 0xBB, 0xCC]))
            .await;

        assert_eq!(tun.written(), vec![vec![0xAA, 0xBB, 0xCC]]);
    }

    #[tokio::test]
    async fn test_handshake_with_wrong_node_key_dropped() {
        let (tun, handler, _node_public) = test_handler();
        let (_, wrong_public) = generate_keypair();
        let client = TestClient::new(wrong_public);
        let (conn, mut rx) = test_conn(0);

        handler.on_frame(&conn, client.handshake_frame()).await;

        // No registration and no ack: the node has no key to encrypt one to
        assert_eq!(handler.registered_count().await, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(tun.write_count(), 0);
    }

    #[tokio::test]
    async fn test_reregistration_swaps_sealing_key() {
        let (_tun, handler, node_public) = test_handler();
        let first = TestClient::new(node_public);
        let second = TestClient::new(node_public);
        let (conn, mut rx) = test_conn(0);

        handler.on_frame(&conn, first.handshake_frame()).await;
        rx.recv().await.unwrap(); // first ack

        handler.on_frame(&conn, second.handshake_frame()).await;
        rx.recv().await.unwrap(); // second ack
        assert_eq!(handler.registered_count().await, 1);

        handler.broadcast(&[1, 2, 3]).await;
        let frame = rx.recv().await.unwrap();
        let raw = RawMsg::decode(&frame).unwrap();

        // Only the new client key opens node egress now
        assert!(first.decoder().decrypt_msg(&raw).is_err());
        let msg = second.decoder().decrypt_msg(&raw).unwrap();
        assert_eq!(msg.data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_next_hop_rejected() {
        let (tun, handler, node_public) = test_handler();
        let client = TestClient::new(node_public);
        let (conn, mut rx) = test_conn(0);

        handler.on_frame(&conn, client.handshake_frame()).await;
        rx.recv().await.unwrap();

        let (_, hop_key) = generate_keypair();
        let frame = client
            .node_encoder
            .encrypt_msg(&Msg {
                flags: 0,
                timestamp: 0,
                next_hop: Some(taiga_proto::NextHop {
                    public_key: hop_key,
                    protocol: taiga_proto::Protocol::Wss,
                    endpoint: "next.example:8080".to_string(),
                }),
                data: vec![9, 9, 9],
            })
            .unwrap()
            .encode();

        handler.on_frame(&conn, frame).await;
        assert_eq!(tun.write_count(), 0);
    }

    #[tokio::test]
    async fn test_garbage_and_unexpected_frames_dropped() {
        let (tun, handler, node_public) = test_handler();
        let client = TestClient::new(node_public);
        let (conn, mut rx) = test_conn(0);

        handler.on_frame(&conn, client.handshake_frame()).await;
        rx.recv().await.unwrap();

        // Undecodable bytes
        handler.on_frame(&conn, vec![0xFF; 10]).await;

        // A well-formed ack frame is meaningless at the node
        let ack_frame = client
            .node_encoder
            .encrypt_handshake_ack(&HandshakeAck {
                success: true,
                message: "ok".to_string(),
            })
            .unwrap()
            .encode();
        handler.on_frame(&conn, ack_frame).await;

        assert_eq!(tun.write_count(), 0);
        assert_eq!(handler.registered_count().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_fans_out_to_all_clients() {
        let (_tun, handler, node_public) = test_handler();
        let a = TestClient::new(node_public);
        let b = TestClient::new(node_public);
        let (conn_a, mut rx_a) = test_conn(0);
        let (conn_b, mut rx_b) = test_conn(1);

        handler.on_frame(&conn_a, a.handshake_frame()).await;
        handler.on_frame(&conn_b, b.handshake_frame()).await;
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        handler.broadcast(&[0x45, 0x00]).await;

        let frame_a = RawMsg::decode(&rx_a.recv().await.unwrap()).unwrap();
        let frame_b = RawMsg::decode(&rx_b.recv().await.unwrap()).unwrap();

        assert_eq!(a.decoder().decrypt_msg(&frame_a).unwrap().data, vec![0x45, 0x00]);
        assert_eq!(b.decoder().decrypt_msg(&frame_b).unwrap().data, vec![0x45, 0x00]);

        // Each client's copy is sealed separately
        assert!(a.decoder().decrypt_msg(&frame_b).is_err());
    }

    #[tokio::test]
    async fn test_send_failure_does_not_remove_session() {
        let (_tun, handler, node_public) = test_handler();
        let a = TestClient::new(node_public);
        let b = TestClient::new(node_public);
        let (conn_a, rx_a) = test_conn(0);
        let (conn_b, mut rx_b) = test_conn(1);

        handler.on_frame(&conn_a, a.handshake_frame()).await;
        handler.on_frame(&conn_b, b.handshake_frame()).await;
        rx_b.recv().await.unwrap();

        // Client A's queue is gone; its sends fail from here on
        drop(rx_a);

        handler.broadcast(&[7, 7]).await;

        // B still gets the packet and A's session is untouched; removal is
        // the disconnect path's job
        let frame_b = RawMsg::decode(&rx_b.recv().await.unwrap()).unwrap();
        assert_eq!(b.decoder().decrypt_msg(&frame_b).unwrap().data, vec![7, 7]);
        assert_eq!(handler.registered_count().await, 2);
    }

    #[tokio::test]
    async fn test_disconnect_removes_session() {
        let (_tun, handler, node_public) = test_handler();
        let client = TestClient::new(node_public);
        let (conn, mut rx) = test_conn(0);

        handler.on_frame(&conn, client.handshake_frame()).await;
        rx.recv().await.unwrap();
        assert_eq!(handler.registered_count().await, 1);

        handler.on_disconnect(conn.id()).await;
        assert_eq!(handler.registered_count().await, 0);

        // Broadcast after disconnect reaches nobody
        handler.broadcast(&[1]).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_egress_pump_stops_on_cancellation() {
        let (tun, handler, _node_public) = test_handler();
        let shutdown = CancellationToken::new();

        let handler = Arc::new(handler);
        let pump = {
            let handler = Arc::clone(&handler);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { handler.run_egress(shutdown).await })
        };

        // Keep the pump busy with one packet, then cancel
        tun.inject(&[0x45, 0x00, 0x00, 0x14]);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        pump.await.unwrap();
    }
}
