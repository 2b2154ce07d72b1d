//! UDP client transport
//!
//! One datagram per frame over a connected socket. Receives carry a 30 s
//! deadline so a silent node surfaces as a timeout instead of a hang.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{NetError, NetResult};
use crate::transport::Transport;
use crate::MAX_DATAGRAM;

/// Receive deadline on the datagram backend
pub const RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Client transport over a connected UDP socket
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect it to the node
    pub async fn connect(addr: &str) -> NetResult<Self> {
        info!(addr = %addr, "connecting udp");

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        debug!(local = %socket.local_addr()?, "udp connected");
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, data: &[u8]) -> NetResult<()> {
        self.socket.send(data).await?;
        Ok(())
    }

    async fn receive(&self) -> NetResult<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = timeout(RECV_TIMEOUT, self.socket.recv(&mut buf))
            .await
            .map_err(|_| NetError::Timeout)??;
        buf.truncate(n);
        Ok(buf)
    }

    async fn disconnect(&self) -> NetResult<()> {
        debug!("disconnecting udp");
        // Dropping the socket releases the port; nothing to signal on the wire.
        Ok(())
    }
}
