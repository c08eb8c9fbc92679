//! Codecs between header values and the raw BLOBs stored in the `extra`
//! table.
//!
//! Strings are raw UTF-8 bytes, integers are 4-byte little-endian u32, and
//! UUIDs are their raw 16 bytes. No self-describing framing: the key alone
//! determines the codec.

use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
  #[error("header value is not valid UTF-8")]
  Utf8(#[from] std::str::Utf8Error),

  #[error("header value is {0} bytes, expected {1}")]
  Length(usize, usize),
}

// ─── Strings ─────────────────────────────────────────────────────────────────

pub fn encode_str(s: &str) -> Vec<u8> { s.as_bytes().to_vec() }

pub fn decode_str(blob: &[u8]) -> Result<String, DecodeError> {
  Ok(std::str::from_utf8(blob)?.to_owned())
}

// ─── u32 ─────────────────────────────────────────────────────────────────────

pub fn encode_u32(value: u32) -> Vec<u8> { value.to_le_bytes().to_vec() }

pub fn decode_u32(blob: &[u8]) -> Result<u32, DecodeError> {
  let bytes: [u8; 4] = blob
    .try_into()
    .map_err(|_| DecodeError::Length(blob.len(), 4))?;
  Ok(u32::from_le_bytes(bytes))
}

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> Vec<u8> { id.as_bytes().to_vec() }

pub fn decode_uuid(blob: &[u8]) -> Result<Uuid, DecodeError> {
  let bytes: [u8; 16] = blob
    .try_into()
    .map_err(|_| DecodeError::Length(blob.len(), 16))?;
  Ok(Uuid::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
  use uuid::uuid;

  use super::*;

  #[test]
  fn u32_encodes_little_endian() {
    assert_eq!(encode_u32(1), vec![1, 0, 0, 0]);
    assert_eq!(decode_u32(&[0x78, 0x56, 0x34, 0x12]).unwrap(), 0x1234_5678);
  }

  #[test]
  fn u32_rejects_wrong_length() {
    assert!(matches!(
      decode_u32(&[1, 2, 3]).unwrap_err(),
      DecodeError::Length(3, 4)
    ));
  }

  #[test]
  fn strings_are_raw_utf8() {
    assert_eq!(encode_str("magpie"), b"magpie".to_vec());
    assert_eq!(decode_str(b"magpie").unwrap(), "magpie");
    assert!(decode_str(&[0xff, 0xfe]).is_err());
  }

  #[test]
  fn uuids_are_raw_bytes() {
    let id = uuid!("30227437-1da5-4e0f-91cf-cc4174fb6cc6");
    assert_eq!(decode_uuid(&encode_uuid(id)).unwrap(), id);
    assert!(decode_uuid(&[0u8; 15]).is_err());
  }
}
