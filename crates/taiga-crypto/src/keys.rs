//! X25519 Key Exchange
//!
//! Diffie-Hellman key agreement using Curve25519. The overlay identifies a
//! peer by its long-term public key; every sealed frame additionally uses a
//! single-use ephemeral scalar on the sender side.

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::constants::KEY_SIZE;
use crate::error::{CryptoError, CryptoResult};

/// A long-term X25519 secret key
#[derive(ZeroizeOnDrop)]
pub struct SecretKey {
    inner: StaticSecret,
}

/// An X25519 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; KEY_SIZE],
}

/// An ephemeral keypair for single-use key exchange
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    pub public: PublicKey,
}

/// Shared secret derived from X25519 key exchange
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; KEY_SIZE],
}

/// Generate a new random key pair
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let secret = SecretKey::generate();
    let public = secret.public_key();
    (secret, public)
}

impl SecretKey {
    /// Generate a new random secret key
    pub fn generate() -> Self {
        Self {
            inner: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self {
            inner: StaticSecret::from(bytes),
        }
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Ok(Self::from_bytes(decode_hex_key(s)?))
    }

    /// Perform Diffie-Hellman key exchange with a peer public key
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> CryptoResult<SharedSecret> {
        let their_public = X25519Public::from(their_public.bytes);
        let shared = self.inner.diffie_hellman(&their_public);
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }
        Ok(SharedSecret {
            bytes: shared.to_bytes(),
        })
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        let public = X25519Public::from(&self.inner);
        PublicKey {
            bytes: public.to_bytes(),
        }
    }

    /// Export raw bytes (use with caution!)
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Hex encoding of the raw scalar
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl Clone for SecretKey {
    fn clone(&self) -> Self {
        Self::from_bytes(self.to_bytes())
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

impl PublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Try to create from a slice
    pub fn try_from_slice(slice: &[u8]) -> CryptoResult<Self> {
        if slice.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Ok(Self::from_bytes(decode_hex_key(s)?))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Convert to bytes
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.bytes
    }

    /// Hex encoding of the point
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Short hex prefix, safe for log fields
    pub fn short_hex(&self) -> String {
        hex::encode(&self.bytes[..4])
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({}..)", self.short_hex())
    }
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral keypair (single use)
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self {
            secret,
            public: PublicKey {
                bytes: public.to_bytes(),
            },
        }
    }

    /// Perform Diffie-Hellman and consume the ephemeral scalar
    pub fn diffie_hellman(self, their_public: &PublicKey) -> CryptoResult<SharedSecret> {
        let their_public = X25519Public::from(their_public.bytes);
        let shared = self.secret.diffie_hellman(&their_public);
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }
        Ok(SharedSecret {
            bytes: shared.to_bytes(),
        })
    }
}

impl SharedSecret {
    /// Derive the frame sealing key: SHA-256 over the raw shared point
    pub fn derive_key(&self) -> crate::aead::SealKey {
        use sha2::{Digest, Sha256};

        let digest = Sha256::digest(self.bytes);
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        crate::aead::SealKey::from_bytes(key)
    }

    /// Get the shared secret bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

fn decode_hex_key(s: &str) -> CryptoResult<[u8; KEY_SIZE]> {
    let decoded = hex::decode(s).map_err(|e| CryptoError::InvalidHexKey(e.to_string()))?;
    if decoded.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: decoded.len(),
        });
    }
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&decoded);
    Ok(bytes)
}
