//! Low-level wire primitives shared by every frame codec.

use bytes::BufMut;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::ProtocolError;

/// HMAC-SHA256 digest length on the wire.
pub const HMAC_LENGTH: usize = 32;

type HmacSha256 = Hmac<Sha256>;

fn need(buf: &[u8], n: usize) -> Result<(), ProtocolError> {
    if buf.len() < n {
        Err(ProtocolError::Truncated)
    } else {
        Ok(())
    }
}

pub fn get_u8(buf: &mut &[u8]) -> Result<u8, ProtocolError> {
    need(buf, 1)?;
    let v = buf[0];
    *buf = &buf[1..];
    Ok(v)
}

pub fn get_u16_le(buf: &mut &[u8]) -> Result<u16, ProtocolError> {
    need(buf, 2)?;
    let v = u16::from_le_bytes([buf[0], buf[1]]);
    *buf = &buf[2..];
    Ok(v)
}

pub fn get_u32_le(buf: &mut &[u8]) -> Result<u32, ProtocolError> {
    need(buf, 4)?;
    let v = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(v)
}

pub fn get_i32_le(buf: &mut &[u8]) -> Result<i32, ProtocolError> {
    Ok(get_u32_le(buf)? as i32)
}

pub fn get_i64_le(buf: &mut &[u8]) -> Result<i64, ProtocolError> {
    need(buf, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[..8]);
    *buf = &buf[8..];
    Ok(i64::from_le_bytes(raw))
}

pub fn get_bytes<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], ProtocolError> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

/// Read a `u16`-length-prefixed UTF-8 string.
pub fn get_string(buf: &mut &[u8]) -> Result<String, ProtocolError> {
    let len = get_u16_le(buf)? as usize;
    let raw = get_bytes(buf, len)?;
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::Malformed("invalid UTF-8".into()))
}

/// Read a UUID as two big-endian `u64`s, MSB half first.
pub fn get_uuid(buf: &mut &[u8]) -> Result<Uuid, ProtocolError> {
    need(buf, 16)?;
    let mut msb = [0u8; 8];
    let mut lsb = [0u8; 8];
    msb.copy_from_slice(&buf[..8]);
    lsb.copy_from_slice(&buf[8..16]);
    *buf = &buf[16..];
    Ok(Uuid::from_u64_pair(
        u64::from_be_bytes(msb),
        u64::from_be_bytes(lsb),
    ))
}

/// Write a `u16`-length-prefixed UTF-8 string.
pub fn put_string(buf: &mut Vec<u8>, value: &str) {
    let raw = value.as_bytes();
    buf.put_u16_le(raw.len() as u16);
    buf.put_slice(raw);
}

/// Write a UUID as two big-endian `u64`s, MSB half first.
pub fn put_uuid(buf: &mut Vec<u8>, uuid: &Uuid) {
    let (msb, lsb) = uuid.as_u64_pair();
    buf.put_u64(msb);
    buf.put_u64(lsb);
}

/// Compute HMAC-SHA256 over `data` with a UTF-8 key.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HMAC_LENGTH] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time byte comparison. Length mismatch short-circuits, which does
/// not leak secret material (lengths are public).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
