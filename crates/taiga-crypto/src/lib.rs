//! Taiga Cryptographic Primitives
//!
//! This crate provides all cryptographic operations for the taiga overlay:
//! - Key exchange (X25519, ephemeral-static)
//! - Key derivation (SHA-256 over the shared point)
//! - Authenticated encryption (ChaCha20-Poly1305)

pub mod aead;
pub mod error;
pub mod keys;

pub use aead::{open, seal, Nonce, SealKey};
pub use error::{CryptoError, CryptoResult};
pub use keys::{generate_keypair, EphemeralKeyPair, PublicKey, SecretKey, SharedSecret};

/// Protocol constants
pub mod constants {
    /// X25519 key size in bytes
    pub const KEY_SIZE: usize = 32;

    /// ChaCha20-Poly1305 nonce size
    pub const NONCE_SIZE: usize = 12;

    /// Poly1305 authentication tag size
    pub const AUTH_TAG_SIZE: usize = 16;
}
