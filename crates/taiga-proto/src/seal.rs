//! Sealed-envelope encoder and decoder
//!
//! Each sealed frame is an ephemeral-static ECDH one-shot: the encoder
//! samples a fresh scalar, derives `SHA-256(x25519(e, P))` as the sealing
//! key, and publishes the ephemeral public key and a random nonce in the
//! header. The scalar is consumed by the exchange and never reused.
//!
//! One method per frame type sets the header type and governs body parsing;
//! the cryptographic construction is identical across types.

use taiga_crypto::{EphemeralKeyPair, Nonce, PublicKey, SecretKey};

use crate::error::{ProtoError, ProtoResult};
use crate::frame::{FrameType, Handshake, HandshakeAck, Header, Msg, RawMsg};
use crate::VERSION;

/// Encrypts frames for a recipient identified by its public key
#[derive(Clone)]
pub struct Encoder {
    recipient: PublicKey,
    version: &'static str,
}

/// Decrypts frames addressed to the holder of a private key
#[derive(Clone)]
pub struct Decoder {
    secret: SecretKey,
    version: &'static str,
}

impl Encoder {
    pub fn new(recipient: PublicKey) -> Self {
        Self {
            recipient,
            version: VERSION,
        }
    }

    /// The public key this encoder seals to
    pub fn recipient(&self) -> &PublicKey {
        &self.recipient
    }

    pub fn encrypt_msg(&self, msg: &Msg) -> ProtoResult<RawMsg> {
        self.seal_body(FrameType::Data, &msg.encode())
    }

    pub fn encrypt_handshake(&self, hs: &Handshake) -> ProtoResult<RawMsg> {
        self.seal_body(FrameType::Handshake, &hs.encode())
    }

    pub fn encrypt_handshake_ack(&self, ack: &HandshakeAck) -> ProtoResult<RawMsg> {
        self.seal_body(FrameType::HandshakeAck, &ack.encode())
    }

    fn seal_body(&self, frame_type: FrameType, plaintext: &[u8]) -> ProtoResult<RawMsg> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public;

        // Consumes the scalar; it is zeroized on drop inside the exchange.
        let shared = ephemeral.diffie_hellman(&self.recipient)?;
        let key = shared.derive_key();
        let nonce = Nonce::generate();

        let body = taiga_crypto::seal(&key, &nonce, plaintext)?;

        Ok(RawMsg {
            header: Header {
                version: self.version.to_string(),
                frame_type,
                ephemeral_key: ephemeral_public,
                nonce,
            },
            body,
        })
    }
}

impl Decoder {
    pub fn new(secret: SecretKey) -> Self {
        Self {
            secret,
            version: VERSION,
        }
    }

    pub fn decrypt_msg(&self, raw: &RawMsg) -> ProtoResult<Msg> {
        let plaintext = self.open_body(raw, FrameType::Data)?;
        Msg::decode(&plaintext)
    }

    pub fn decrypt_handshake(&self, raw: &RawMsg) -> ProtoResult<Handshake> {
        let plaintext = self.open_body(raw, FrameType::Handshake)?;
        Handshake::decode(&plaintext)
    }

    pub fn decrypt_handshake_ack(&self, raw: &RawMsg) -> ProtoResult<HandshakeAck> {
        let plaintext = self.open_body(raw, FrameType::HandshakeAck)?;
        HandshakeAck::decode(&plaintext)
    }

    fn open_body(&self, raw: &RawMsg, expected: FrameType) -> ProtoResult<Vec<u8>> {
        if raw.header.version != self.version {
            return Err(ProtoError::UnsupportedVersion(raw.header.version.clone()));
        }
        if raw.header.frame_type != expected {
            return Err(ProtoError::UnexpectedType {
                expected,
                actual: raw.header.frame_type,
            });
        }

        // Failure reveals nothing beyond the fact of failure; key material
        // never reaches the error value.
        let shared = self
            .secret
            .diffie_hellman(&raw.header.ephemeral_key)
            .map_err(|_| ProtoError::Decrypt)?;
        taiga_crypto::open(&shared.derive_key(), &raw.header.nonce, &raw.body)
            .map_err(|_| ProtoError::Decrypt)
    }
}
