//! UDP server backend
//!
//! A single receive loop over one shared socket. A connection is synthesized
//! on the first datagram from a new peer address. Datagram transports give no
//! disconnect signal, so synthesized connections live until process exit.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::NetResult;
use crate::server::{ConnHandle, FrameHandler};
use crate::MAX_DATAGRAM;

/// UDP frame server
pub struct UdpServer {
    socket: Arc<UdpSocket>,
}

impl UdpServer {
    /// Bind the server socket
    pub async fn bind(addr: &str) -> NetResult<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive datagrams until the token is cancelled
    pub async fn serve(
        self,
        handler: Arc<dyn FrameHandler>,
        shutdown: CancellationToken,
    ) -> NetResult<()> {
        info!(addr = %self.socket.local_addr()?, "udp server listening");

        let mut peers: HashMap<SocketAddr, ConnHandle> = HashMap::new();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("udp server shutting down");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buf) => {
                    let (n, peer) = match received {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("udp read error: {}", e);
                            continue;
                        }
                    };

                    let conn = peers
                        .entry(peer)
                        .or_insert_with(|| {
                            info!(peer = %peer, "new udp client");
                            ConnHandle::datagram(Arc::clone(&self.socket), peer)
                        })
                        .clone();

                    handler.on_frame(&conn, buf[..n].to_vec()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ConnId;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct Echo {
        seen: Mutex<Vec<(ConnId, Vec<u8>)>>,
    }

    #[async_trait]
    impl FrameHandler for Echo {
        async fn on_frame(&self, conn: &ConnHandle, data: Vec<u8>) {
            self.seen.lock().await.push((conn.id(), data.clone()));
            let _ = conn.send(data).await;
        }

        async fn on_disconnect(&self, _conn: ConnId) {}
    }

    #[tokio::test]
    async fn test_datagram_echo_and_identity() {
        let server = UdpServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let handler = Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        });
        let shutdown = CancellationToken::new();
        let serve = tokio::spawn(server.serve(handler.clone(), shutdown.clone()));

        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        a.send_to(b"from a", addr).await.unwrap();
        b.send_to(b"from b", addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = a.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"from a");
        let (n, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"from b");

        let seen = handler.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, ConnId::Datagram(a.local_addr().unwrap()));
        assert_eq!(seen[1].0, ConnId::Datagram(b.local_addr().unwrap()));

        shutdown.cancel();
        serve.await.unwrap().unwrap();
    }
}
