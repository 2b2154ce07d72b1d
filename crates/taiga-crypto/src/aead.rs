//! Authenticated encryption (ChaCha20-Poly1305)
//!
//! Frame bodies are sealed with IETF ChaCha20-Poly1305: 12-byte nonce,
//! 16-byte tag appended, no associated data.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce as ChaNonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{AUTH_TAG_SIZE, KEY_SIZE, NONCE_SIZE};
use crate::error::{CryptoError, CryptoResult};

/// A 256-bit sealing key derived from an X25519 exchange
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealKey {
    bytes: [u8; KEY_SIZE],
}

/// A 96-bit nonce, freshly random per sealed frame
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl SealKey {
    /// Create a key from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Nonce {
    /// Create a nonce from raw bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self { bytes }
    }

    /// Try to create from a slice
    pub fn try_from_slice(slice: &[u8]) -> CryptoResult<Self> {
        if slice.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; NONCE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    /// Generate a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }

    /// Convert to bytes
    pub fn to_bytes(&self) -> [u8; NONCE_SIZE] {
        self.bytes
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.bytes))
    }
}

/// Encrypt plaintext, returning ciphertext with the tag appended
pub fn seal(key: &SealKey, nonce: &Nonce, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(&key.bytes)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let cha_nonce = ChaNonce::from_slice(&nonce.bytes);

    cipher
        .encrypt(cha_nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed("ChaCha20-Poly1305 seal failed".into()))
}

/// Decrypt ciphertext produced by [`seal`]
///
/// Input must include the 16-byte authentication tag at the end.
pub fn open(key: &SealKey, nonce: &Nonce, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < AUTH_TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher =
        ChaCha20Poly1305::new_from_slice(&key.bytes).map_err(|_| CryptoError::DecryptionFailed)?;

    let cha_nonce = ChaNonce::from_slice(&nonce.bytes);

    cipher
        .decrypt(cha_nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}
