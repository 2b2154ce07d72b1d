//! Taiga Message Protocol
//!
//! Typed frames carried over a datagram-style transport. Every frame is one
//! marshalled [`RawMsg`]: a plaintext [`Header`] (version, frame type,
//! sender ephemeral key, nonce) followed by the ChaCha20-Poly1305 ciphertext
//! of the typed body. Bodies are sealed under ephemeral-static ECDH: the
//! sender samples a fresh scalar per frame and the receiver recovers the
//! sealing key from its long-term secret and the header's ephemeral key.
//!
//! The construction does not authenticate the sender; frame authenticity
//! rests on possession of the recipient public key alone.

pub mod error;
pub mod frame;
pub mod seal;
pub mod wire;

pub use error::{ProtoError, ProtoResult};
pub use frame::{
    FrameType, Handshake, HandshakeAck, Header, Msg, NextHop, Protocol, RawMsg,
};
pub use seal::{Decoder, Encoder};

/// Wire protocol version tag; decoders refuse anything else.
pub const VERSION: &str = "taiga_v1_alpha";
