//! Frame definitions for the taiga protocol
//!
//! Wire format of one transport frame:
//!
//! ```text
//! RawMsg := Header || Body
//! Header := Version (string) || Type (u8) || EphemeralKey (32) || Nonce (12)
//! Body   := AEAD ciphertext including 16-byte tag (u32 length prefix)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use taiga_crypto::{Nonce, PublicKey};

use crate::error::{ProtoError, ProtoResult};
use crate::wire;

/// Frame type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Encrypted IP traffic
    Data = 1,

    /// Client registration carrying its public key
    Handshake = 2,

    /// Node confirmation of a handshake
    HandshakeAck = 3,
}

impl TryFrom<u8> for FrameType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Data),
            2 => Ok(Self::Handshake),
            3 => Ok(Self::HandshakeAck),
            other => Err(ProtoError::UnknownType(other)),
        }
    }
}

/// Transport protocol tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Reliable stream over binary WebSocket frames
    Wss,
    /// Unreliable datagrams
    Udp,
}

impl Protocol {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Protocol::Wss => "wss",
            Protocol::Udp => "udp",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wss" => Ok(Protocol::Wss),
            "udp" => Ok(Protocol::Udp),
            other => Err(ProtoError::Decode(format!("unknown protocol: {}", other))),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plaintext frame header
///
/// Always transmitted in the clear; the ephemeral key and nonce bind the
/// sealed body to this header implicitly through the derived sealing key.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: String,
    pub frame_type: FrameType,
    pub ephemeral_key: PublicKey,
    pub nonce: Nonce,
}

impl Header {
    fn encode(&self, buf: &mut impl BufMut) {
        wire::put_string(buf, &self.version);
        buf.put_u8(self.frame_type as u8);
        buf.put_slice(self.ephemeral_key.as_bytes());
        buf.put_slice(self.nonce.as_bytes());
    }

    fn decode(buf: &mut impl Buf) -> ProtoResult<Self> {
        let version = wire::get_string(buf)?;
        wire::ensure(buf, 1)?;
        let frame_type = FrameType::try_from(buf.get_u8())?;
        let ephemeral_key = PublicKey::from_bytes(wire::get_array(buf)?);
        let nonce = Nonce::from_bytes(wire::get_array(buf)?);
        Ok(Self {
            version,
            frame_type,
            ephemeral_key,
            nonce,
        })
    }
}

/// Routing instruction for the next node in a circuit
///
/// Present only in multi-hop deployments; a node receiving one today reports
/// the frame as unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub public_key: PublicKey,
    pub protocol: Protocol,
    pub endpoint: String,
}

impl NextHop {
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.public_key.as_bytes());
        wire::put_string(buf, self.protocol.as_str());
        wire::put_string(buf, &self.endpoint);
    }

    fn decode(buf: &mut impl Buf) -> ProtoResult<Self> {
        let public_key = PublicKey::from_bytes(wire::get_array(buf)?);
        let protocol: Protocol = wire::get_string(buf)?.parse()?;
        let endpoint = wire::get_string(buf)?;
        Ok(Self {
            public_key,
            protocol,
            endpoint,
        })
    }
}

/// Decrypted body of a Data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub flags: u32,
    pub timestamp: i64,
    /// `None` means this node is the final destination
    pub next_hop: Option<NextHop>,
    /// Raw L3 packet
    pub data: Vec<u8>,
}

impl Msg {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(17 + self.data.len());
        buf.put_u32(self.flags);
        buf.put_i64(self.timestamp);
        match &self.next_hop {
            Some(hop) => {
                buf.put_u8(1);
                hop.encode(&mut buf);
            }
            None => buf.put_u8(0),
        }
        wire::put_bytes(&mut buf, &self.data);
        buf.to_vec()
    }

    pub fn decode(data: &[u8]) -> ProtoResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        wire::ensure(&buf, 12)?;
        let flags = buf.get_u32();
        let timestamp = buf.get_i64();
        let next_hop = if wire::get_bool(&mut buf)? {
            Some(NextHop::decode(&mut buf)?)
        } else {
            None
        };
        let data = wire::get_bytes(&mut buf)?;
        Ok(Self {
            flags,
            timestamp,
            next_hop,
            data,
        })
    }
}

/// Body of a Handshake frame: the client registers its public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub client_public_key: PublicKey,
}

impl Handshake {
    pub fn encode(&self) -> Vec<u8> {
        self.client_public_key.to_bytes().to_vec()
    }

    pub fn decode(data: &[u8]) -> ProtoResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let client_public_key = PublicKey::from_bytes(wire::get_array(&mut buf)?);
        Ok(Self { client_public_key })
    }
}

/// Body of a HandshakeAck frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeAck {
    pub success: bool,
    pub message: String,
}

impl HandshakeAck {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(3 + self.message.len());
        buf.put_u8(self.success as u8);
        wire::put_string(&mut buf, &self.message);
        buf.to_vec()
    }

    pub fn decode(data: &[u8]) -> ProtoResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let success = wire::get_bool(&mut buf)?;
        let message = wire::get_string(&mut buf)?;
        Ok(Self { success, message })
    }
}

/// One wire frame: plaintext header plus sealed body
#[derive(Debug, Clone)]
pub struct RawMsg {
    pub header: Header,
    pub body: Vec<u8>,
}

impl RawMsg {
    /// Serialize to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(64 + self.body.len());
        self.header.encode(&mut buf);
        wire::put_bytes(&mut buf, &self.body);
        buf.to_vec()
    }

    /// Parse from wire bytes
    pub fn decode(data: &[u8]) -> ProtoResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let header = Header::decode(&mut buf)?;
        let body = wire::get_bytes(&mut buf)?;
        if buf.remaining() != 0 {
            return Err(ProtoError::Decode(format!(
                "{} trailing bytes after frame",
                buf.remaining()
            )));
        }
        Ok(Self { header, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_msg_round_trip_without_next_hop() {
        let msg = Msg {
            flags: 0,
            timestamp: 1_700_000_000,
            next_hop: None,
            data: vec![0xAA, 0xBB, 0xCC],
        };
        let decoded = Msg::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_msg_round_trip_with_next_hop() {
        let msg = Msg {
            flags: 7,
            timestamp: -12,
            next_hop: Some(NextHop {
                public_key: sample_key(0x42),
                protocol: Protocol::Udp,
                endpoint: "10.0.0.9:9000".to_string(),
            }),
            data: vec![1, 2, 3, 4],
        };
        let decoded = Msg::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_handshake_round_trip() {
        let hs = Handshake {
            client_public_key: sample_key(0x11),
        };
        assert_eq!(Handshake::decode(&hs.encode()).unwrap(), hs);
    }

    #[test]
    fn test_handshake_ack_round_trip() {
        let ack = HandshakeAck {
            success: true,
            message: "ok".to_string(),
        };
        assert_eq!(HandshakeAck::decode(&ack.encode()).unwrap(), ack);

        let nack = HandshakeAck {
            success: false,
            message: "decrypt error".to_string(),
        };
        assert_eq!(HandshakeAck::decode(&nack.encode()).unwrap(), nack);
    }

    #[test]
    fn test_raw_msg_round_trip() {
        let raw = RawMsg {
            header: Header {
                version: crate::VERSION.to_string(),
                frame_type: FrameType::Data,
                ephemeral_key: sample_key(0x77),
                nonce: Nonce::from_bytes([9u8; 12]),
            },
            body: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let decoded = RawMsg::decode(&raw.encode()).unwrap();
        assert_eq!(decoded.header.version, raw.header.version);
        assert_eq!(decoded.header.frame_type, raw.header.frame_type);
        assert_eq!(decoded.header.ephemeral_key, raw.header.ephemeral_key);
        assert_eq!(decoded.header.nonce, raw.header.nonce);
        assert_eq!(decoded.body, raw.body);
    }

    #[test]
    fn test_unknown_version_still_decodes() {
        // An unknown version is a valid wire frame; rejection happens in the
        // decoder, not the codec.
        let raw = RawMsg {
            header: Header {
                version: "taiga_v9".to_string(),
                frame_type: FrameType::Handshake,
                ephemeral_key: sample_key(1),
                nonce: Nonce::from_bytes([0u8; 12]),
            },
            body: vec![],
        };
        let decoded = RawMsg::decode(&raw.encode()).unwrap();
        assert_eq!(decoded.header.version, "taiga_v9");
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let raw = RawMsg {
            header: Header {
                version: crate::VERSION.to_string(),
                frame_type: FrameType::Data,
                ephemeral_key: sample_key(1),
                nonce: Nonce::from_bytes([0u8; 12]),
            },
            body: vec![],
        };
        let mut bytes = raw.encode();
        // Type byte sits right after the u16 length prefix and version string
        let type_index = 2 + crate::VERSION.len();
        bytes[type_index] = 0x99;
        assert!(matches!(
            RawMsg::decode(&bytes),
            Err(ProtoError::UnknownType(0x99))
        ));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let raw = RawMsg {
            header: Header {
                version: crate::VERSION.to_string(),
                frame_type: FrameType::Data,
                ephemeral_key: sample_key(1),
                nonce: Nonce::from_bytes([0u8; 12]),
            },
            body: vec![1, 2, 3],
        };
        let bytes = raw.encode();
        assert!(RawMsg::decode(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let raw = RawMsg {
            header: Header {
                version: crate::VERSION.to_string(),
                frame_type: FrameType::Data,
                ephemeral_key: sample_key(1),
                nonce: Nonce::from_bytes([0u8; 12]),
            },
            body: vec![],
        };
        let mut bytes = raw.encode();
        bytes.push(0);
        assert!(RawMsg::decode(&bytes).is_err());
    }

    #[test]
    fn test_next_hop_unknown_protocol_rejected() {
        let hop = NextHop {
            public_key: sample_key(2),
            protocol: Protocol::Wss,
            endpoint: "node.example:443".to_string(),
        };
        let mut buf = BytesMut::new();
        hop.encode(&mut buf);
        let mut bytes = buf.to_vec();
        // Overwrite the protocol string "wss" with an unknown tag of the
        // same length, right after the key and the u16 length prefix.
        bytes[34..37].copy_from_slice(b"xyz");
        let mut rd = Bytes::from(bytes);
        assert!(NextHop::decode(&mut rd).is_err());
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(RawMsg::decode(&[]).is_err());
        assert!(Msg::decode(&[]).is_err());
        assert!(Handshake::decode(&[]).is_err());
        assert!(HandshakeAck::decode(&[]).is_err());
    }
}
