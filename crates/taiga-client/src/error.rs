//! Client error types

use thiserror::Error;

/// Errors that can occur while running the tunnel client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or malformed environment input
    #[error("config error: {0}")]
    Config(String),

    /// Handshake did not complete
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Node answered the handshake with the wrong frame type
    #[error("expected handshake ack, got {actual:?}")]
    UnexpectedFrame { actual: taiga_proto::FrameType },

    /// Node refused the registration
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// Network layer failure
    #[error("network error: {0}")]
    Net(#[from] taiga_net::NetError),

    /// Protocol failure
    #[error("protocol error: {0}")]
    Proto(#[from] taiga_proto::ProtoError),

    /// Cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] taiga_crypto::CryptoError),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
