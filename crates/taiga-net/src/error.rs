//! Network error types

use thiserror::Error;

/// Network layer errors
#[derive(Debug, Error)]
pub enum NetError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Receive deadline expired
    #[error("transport receive timed out")]
    Timeout,

    /// Peer sent a non-binary WebSocket frame
    #[error("received non-binary websocket frame")]
    NonBinaryFrame,

    /// Connection outbound queue is saturated; the frame was dropped
    #[error("send buffer full")]
    SendBufferFull,

    /// The underlying connection is gone
    #[error("connection closed")]
    ConnectionClosed,

    /// Virtual interface open or platform setup failure
    #[error("device error: {0}")]
    Device(String),

    /// Interface accepted fewer bytes than one whole packet
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// Endpoint URL failed validation
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Result type for network operations
pub type NetResult<T> = Result<T, NetError>;
