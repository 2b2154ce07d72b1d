//! Node error types

use thiserror::Error;

/// Errors that can occur while running the node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Missing or malformed environment input
    #[error("config error: {0}")]
    Config(String),

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

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;
