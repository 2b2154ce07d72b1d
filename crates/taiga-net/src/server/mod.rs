//! Server-side transport surface
//!
//! Both backends present accepted clients through the same two pieces:
//! a [`ConnHandle`] the node uses to address replies, and a [`FrameHandler`]
//! callback invoked once per inbound frame and once on disconnect.
//!
//! Connection identity is the accepted stream for WebSocket clients and the
//! peer address for datagram clients. Stream handles queue outbound frames
//! into a bounded channel drained by a writer task; a saturated queue drops
//! the frame rather than blocking the caller.

mod udp;
mod ws;

pub use udp::UdpServer;
pub use ws::WsServer;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::error::{NetError, NetResult};

/// Depth of a stream connection's outbound frame queue
pub const SEND_QUEUE_FRAMES: usize = 256;

/// Identity of an accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnId {
    /// Accepted stream connection, numbered in accept order
    Stream(u64),
    /// Datagram peer, identified by its source address
    Datagram(SocketAddr),
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnId::Stream(n) => write!(f, "stream#{}", n),
            ConnId::Datagram(addr) => write!(f, "udp:{}", addr),
        }
    }
}

#[derive(Clone)]
enum Outbound {
    Queued(mpsc::Sender<Vec<u8>>),
    Datagram {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
    },
}

/// Handle for sending frames back to one accepted client
#[derive(Clone)]
pub struct ConnHandle {
    id: ConnId,
    outbound: Outbound,
}

impl ConnHandle {
    /// Handle for an accepted stream connection backed by a bounded queue
    pub fn stream(id: u64, tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            id: ConnId::Stream(id),
            outbound: Outbound::Queued(tx),
        }
    }

    /// Handle for a datagram peer sharing the server socket
    pub fn datagram(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self {
            id: ConnId::Datagram(peer),
            outbound: Outbound::Datagram { socket, peer },
        }
    }

    /// Connection identity
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Send one frame to this client without blocking on a slow consumer
    pub async fn send(&self, data: Vec<u8>) -> NetResult<()> {
        match &self.outbound {
            Outbound::Queued(tx) => match tx.try_send(data) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => Err(NetError::SendBufferFull),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(NetError::ConnectionClosed),
            },
            Outbound::Datagram { socket, peer } => {
                socket.send_to(&data, *peer).await?;
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for ConnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnHandle({})", self.id)
    }
}

/// Callbacks a server drives for inbound traffic and lifecycle events
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// One whole inbound frame from an accepted client
    async fn on_frame(&self, conn: &ConnHandle, data: Vec<u8>);

    /// The connection is gone; any per-connection state must be released
    async fn on_disconnect(&self, conn: ConnId);
}
