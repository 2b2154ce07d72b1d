//! Client-side transport abstraction
//!
//! One frame in, one frame out: datagram backends map a frame to a single
//! datagram, stream backends to a single binary WebSocket message. The
//! concrete backend is selected by a tagged configuration at startup; nothing
//! above this module sees backend-specific types.

mod udp;
mod ws;

pub use udp::UdpTransport;
pub use ws::{normalize_ws_url, WsTransport};

use async_trait::async_trait;

use crate::error::NetResult;

/// A connected client transport carrying whole frames
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame
    async fn send(&self, data: &[u8]) -> NetResult<()>;

    /// Receive one whole frame, blocking until available
    async fn receive(&self) -> NetResult<Vec<u8>>;

    /// Tear the connection down
    async fn disconnect(&self) -> NetResult<()>;
}

/// Backend selection plus its endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// WebSocket endpoint, e.g. `ws://node.example:8080/ws`
    Ws { url: String },
    /// UDP endpoint, e.g. `node.example:8080`
    Udp { addr: String },
}

/// Connect the configured backend
pub async fn connect(config: &TransportConfig) -> NetResult<Box<dyn Transport>> {
    match config {
        TransportConfig::Ws { url } => Ok(Box::new(WsTransport::connect(url).await?)),
        TransportConfig::Udp { addr } => Ok(Box::new(UdpTransport::connect(addr).await?)),
    }
}
