//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding, decoding, or sealing frames
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Malformed wire bytes
    #[error("decode error: {0}")]
    Decode(String),

    /// Frame type byte outside the known set
    #[error("unknown frame type: {0}")]
    UnknownType(u8),

    /// Version tag not understood by this build
    #[error("unsupported protocol version: {0:?}")]
    UnsupportedVersion(String),

    /// Header type does not match the requested body
    #[error("unexpected frame type: expected {expected:?}, got {actual:?}")]
    UnexpectedType {
        expected: crate::frame::FrameType,
        actual: crate::frame::FrameType,
    },

    /// Body failed to authenticate or the key exchange failed
    #[error("decrypt error")]
    Decrypt,

    /// Underlying cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] taiga_crypto::CryptoError),
}

/// Result type for protocol operations
pub type ProtoResult<T> = Result<T, ProtoError>;
