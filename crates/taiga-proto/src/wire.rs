//! Deterministic binary (de)serialization helpers
//!
//! Encoding rules shared by every frame:
//! - integers big-endian, fixed-size byte arrays raw, declaration order
//! - strings: u16 length prefix + UTF-8 bytes
//! - byte payloads: u32 length prefix + bytes
//! - options: one presence byte (0 or 1) followed by the payload

use bytes::{Buf, BufMut};

use crate::error::{ProtoError, ProtoResult};

/// Fail with a decode error if fewer than `n` bytes remain
pub fn ensure<B: Buf>(buf: &B, n: usize) -> ProtoResult<()> {
    if buf.remaining() < n {
        return Err(ProtoError::Decode(format!(
            "truncated input: need {} bytes, have {}",
            n,
            buf.remaining()
        )));
    }
    Ok(())
}

pub fn put_string<B: BufMut>(buf: &mut B, s: &str) {
    debug_assert!(s.len() <= u16::MAX as usize);
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

pub fn get_string<B: Buf>(buf: &mut B) -> ProtoResult<String> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|e| ProtoError::Decode(format!("invalid utf-8 string: {}", e)))
}

pub fn put_bytes<B: BufMut>(buf: &mut B, data: &[u8]) {
    debug_assert!(data.len() <= u32::MAX as usize);
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

pub fn get_bytes<B: Buf>(buf: &mut B) -> ProtoResult<Vec<u8>> {
    ensure(buf, 4)?;
    let len = buf.get_u32() as usize;
    ensure(buf, len)?;
    let mut data = vec![0u8; len];
    buf.copy_to_slice(&mut data);
    Ok(data)
}

pub fn get_array<const N: usize, B: Buf>(buf: &mut B) -> ProtoResult<[u8; N]> {
    ensure(buf, N)?;
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

pub fn get_bool<B: Buf>(buf: &mut B) -> ProtoResult<bool> {
    ensure(buf, 1)?;
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtoError::Decode(format!("invalid bool byte: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_string_round_trip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "taiga_v1_alpha");
        let mut rd = buf.freeze();
        assert_eq!(get_string(&mut rd).unwrap(), "taiga_v1_alpha");
        assert_eq!(rd.remaining(), 0);
    }

    #[test]
    fn test_empty_string() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "");
        let mut rd = buf.freeze();
        assert_eq!(get_string(&mut rd).unwrap(), "");
    }

    #[test]
    fn test_bytes_round_trip() {
        let payload = vec![0xAAu8; 1300];
        let mut buf = BytesMut::new();
        put_bytes(&mut buf, &payload);
        let mut rd = buf.freeze();
        assert_eq!(get_bytes(&mut rd).unwrap(), payload);
    }

    #[test]
    fn test_truncated_length_prefix() {
        // Length prefix claims 10 bytes but only 3 follow
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        buf.put_slice(&[1, 2, 3]);
        let mut rd = buf.freeze();
        assert!(matches!(get_bytes(&mut rd), Err(ProtoError::Decode(_))));
    }

    #[test]
    fn test_truncated_string_header() {
        let mut rd = bytes::Bytes::from_static(&[0x00]);
        assert!(get_string(&mut rd).is_err());
    }

    #[test]
    fn test_invalid_utf8_string() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_slice(&[0xFF, 0xFE]);
        let mut rd = buf.freeze();
        assert!(matches!(get_string(&mut rd), Err(ProtoError::Decode(_))));
    }

    #[test]
    fn test_bool_bytes() {
        let mut rd = bytes::Bytes::from_static(&[0, 1, 2]);
        assert!(!get_bool(&mut rd).unwrap());
        assert!(get_bool(&mut rd).unwrap());
        assert!(get_bool(&mut rd).is_err());
    }

    #[test]
    fn test_array_underflow() {
        let mut rd = bytes::Bytes::from_static(&[1, 2, 3]);
        assert!(get_array::<4, _>(&mut rd).is_err());
    }
}
