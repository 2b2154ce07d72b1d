//! Tunnel client: handshake and packet pumps

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taiga_crypto::{PublicKey, SecretKey};
use taiga_net::{Transport, TunIo, IFACE_BUFSIZE};
use taiga_proto::{Decoder, Encoder, FrameType, Handshake, Msg, RawMsg};

use crate::error::{ClientError, ClientResult};

/// Tunnel client bound to one node
///
/// [`Client::run`] performs the handshake, then drives two pumps until the
/// cancellation token fires or one of them hits a channel-level error:
/// interface reads sealed and sent up the tunnel, tunnel frames opened and
/// written back to the interface. Per-frame decode and decrypt failures are
/// logged and skipped; interface-read and transport errors stop the session.
pub struct Client {
    tun: Arc<dyn TunIo>,
    transport: Arc<dyn Transport>,
    encoder: Encoder,
    decoder: Decoder,
    client_public_key: PublicKey,
}

impl Client {
    pub fn new(
        private_key: SecretKey,
        node_public_key: PublicKey,
        tun: Arc<dyn TunIo>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let client_public_key = private_key.public_key();
        Self {
            tun,
            transport,
            encoder: Encoder::new(node_public_key),
            decoder: Decoder::new(private_key),
            client_public_key,
        }
    }

    /// Register with the node and pump packets until cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> ClientResult<()> {
        self.handshake().await?;
        info!("handshake complete");

        let (err_tx, mut err_rx) = mpsc::channel::<ClientError>(2);

        let egress = {
            let tun = Arc::clone(&self.tun);
            let transport = Arc::clone(&self.transport);
            let encoder = self.encoder.clone();
            let shutdown = shutdown.clone();
            let err_tx = err_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = egress_loop(tun, transport, encoder, shutdown).await {
                    let _ = err_tx.send(e).await;
                }
            })
        };

        let ingress = {
            let tun = Arc::clone(&self.tun);
            let transport = Arc::clone(&self.transport);
            let decoder = self.decoder.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = ingress_loop(tun, transport, decoder, shutdown).await {
                    let _ = err_tx.send(e).await;
                }
            })
        };

        let result = tokio::select! {
            _ = shutdown.cancelled() => Ok(()),
            err = err_rx.recv() => match err {
                Some(e) => Err(e),
                None => Ok(()),
            },
        };

        // Make sure both pumps observe the end of the session
        shutdown.cancel();
        let _ = egress.await;
        let _ = ingress.await;
        result
    }

    /// Send our public key and require a successful ack before any data
    pub async fn handshake(&self) -> ClientResult<()> {
        let hs = Handshake {
            client_public_key: self.client_public_key,
        };

        let raw = self.encoder.encrypt_handshake(&hs)?;
        self.transport.send(&raw.encode()).await?;

        let ack_bytes = self.transport.receive().await?;
        let ack_raw = RawMsg::decode(&ack_bytes)
            .map_err(|e| ClientError::Handshake(format!("undecodable ack: {}", e)))?;

        if ack_raw.header.frame_type != FrameType::HandshakeAck {
            return Err(ClientError::UnexpectedFrame {
                actual: ack_raw.header.frame_type,
            });
        }

        let ack = self
            .decoder
            .decrypt_handshake_ack(&ack_raw)
            .map_err(|e| ClientError::Handshake(format!("undecryptable ack: {}", e)))?;

        if !ack.success {
            return Err(ClientError::Rejected(ack.message));
        }

        Ok(())
    }

    /// Disconnect the transport; the interface is torn down by the caller
    pub async fn close(&self) -> ClientResult<()> {
        self.transport.disconnect().await?;
        Ok(())
    }
}

/// Interface -> tunnel
async fn egress_loop(
    tun: Arc<dyn TunIo>,
    transport: Arc<dyn Transport>,
    encoder: Encoder,
    shutdown: CancellationToken,
) -> ClientResult<()> {
    let mut buf = vec![0u8; IFACE_BUFSIZE];

    loop {
        let n = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = tun.recv(&mut buf) => read?,
        };

        if n == 0 {
            continue;
        }

        let message = Msg {
            flags: 0,
            timestamp: unix_now(),
            next_hop: None,
            data: buf[..n].to_vec(),
        };

        let raw = match encoder.encrypt_msg(&message) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to encrypt packet: {}", e);
                continue;
            }
        };

        transport.send(&raw.encode()).await?;
    }
}

/// Tunnel -> interface
async fn ingress_loop(
    tun: Arc<dyn TunIo>,
    transport: Arc<dyn Transport>,
    decoder: Decoder,
    shutdown: CancellationToken,
) -> ClientResult<()> {
    loop {
        let data = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            received = transport.receive() => received?,
        };

        let raw = match RawMsg::decode(&data) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to decode frame: {}", e);
                continue;
            }
        };

        let msg = match decoder.decrypt_msg(&raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("failed to decrypt frame: {}", e);
                continue;
            }
        };

        if msg.next_hop.is_some() {
            warn!("multi-hop routing not implemented");
            continue;
        }

        if let Err(e) = tun.send(&msg.data).await {
            debug!("failed to write to interface: {}", e);
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
    use taiga_net::mock::memory_transport_pair;
    use taiga_net::mock::MockTun;
    use taiga_proto::HandshakeAck;

    struct FakeNode {
        decoder: Decoder,
        transport: Arc<dyn Transport>,
    }

    impl FakeNode {
        /// Receive the client handshake and answer with the given ack
        async fn accept_handshake(&self, success: bool) -> PublicKey {
            let frame = self.transport.receive().await.unwrap();
            let raw = RawMsg::decode(&frame).unwrap();
            assert_eq!(raw.header.frame_type, FrameType::Handshake);
            let hs = self.decoder.decrypt_handshake(&raw).unwrap();

            let ack = Encoder::new(hs.client_public_key)
                .encrypt_handshake_ack(&HandshakeAck {
                    success,
                    message: if success { "ok" } else { "no" }.to_string(),
                })
                .unwrap();
            self.transport.send(&ack.encode()).await.unwrap();
            hs.client_public_key
        }
    }

    fn setup() -> (Client, FakeNode, Arc<MockTun>) {
        let (node_secret, node_public) = generate_keypair();
        let (client_secret, _) = generate_keypair();

        let (client_side, node_side) = memory_transport_pair();
        let tun = Arc::new(MockTun::new("client-tun"));

        let client = Client::new(
            client_secret,
            node_public,
            tun.clone(),
            Arc::new(client_side),
        );
        let node = FakeNode {
            decoder: Decoder::new(node_secret),
            transport: Arc::new(node_side),
        };
        (client, node, tun)
    }

    #[tokio::test]
    async fn test_handshake_success() {
        let (client, node, _tun) = setup();

        let node_task = tokio::spawn(async move {
            node.accept_handshake(true).await;
        });

        client.handshake().await.unwrap();
        node_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejected() {
        let (client, node, _tun) = setup();

        let node_task = tokio::spawn(async move {
            node.accept_handshake(false).await;
        });

        assert!(matches!(
            client.handshake().await,
            Err(ClientError::Rejected(m)) if m == "no"
        ));
        node_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_wrong_frame_type() {
        let (client, node, _tun) = setup();

        let node_task = tokio::spawn(async move {
            let frame = node.transport.receive().await.unwrap();
            let raw = RawMsg::decode(&frame).unwrap();
            let hs = node.decoder.decrypt_handshake(&raw).unwrap();

            // Answer with a data frame instead of an ack
            let bogus = Encoder::new(hs.client_public_key)
                .encrypt_msg(&Msg {
                    flags: 0,
                    timestamp: 0,
                    next_hop: None,
                    data: vec![1],
                })
                .unwrap();
            node.transport.send(&bogus.encode()).await.unwrap();
        });

        assert!(matches!(
            client.handshake().await,
            Err(ClientError::UnexpectedFrame {
                actual: FrameType::Data
            })
        ));
        node_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_undecodable_ack() {
        let (client, node, _tun) = setup();

        let node_task = tokio::spawn(async move {
            let _ = node.transport.receive().await.unwrap();
            node.transport.send(&[0xDE, 0xAD]).await.unwrap();
        });

        assert!(matches!(
            client.handshake().await,
            Err(ClientError::Handshake(_))
        ));
        node_task.await.unwrap();
    }
}
