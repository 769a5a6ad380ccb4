//! Row record codec: the unit a data block is made of.
//!
//! ```text
//! [0..4)   CRC32-IEEE over [4..end)
//! [4]      padding placeholder
//! [5]      dirty flag (reserved for GC, zero at write time)
//! [6..10)  u32 LE key_byte_len
//! [10..18) u64 LE value_byte_len
//! [18..)   MVCC key bytes, then value bytes
//! ```

use mvcc::MVCCKey;
use thiserror::Error;

pub const ROW_HEADER_BYTES: usize = 18;

#[derive(Debug, Error)]
pub enum RowError {
    #[error("row record truncated")]
    Truncated,
    #[error("row record CRC32 mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Corrupt { expected: u32, actual: u32 },
}

/// Encodes `key`/`value` as one row record.
pub fn encode_row(key: &MVCCKey, value: &[u8]) -> Vec<u8> {
    let key_bytes = key.dump_bytes();
    let mut buf = Vec::with_capacity(ROW_HEADER_BYTES + key_bytes.len() + value.len());
    buf.extend_from_slice(&[0u8; 4]); // CRC placeholder
    buf.push(0); // padding
    buf.push(0); // dirty flag
    buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u64).to_le_bytes());
    buf.extend_from_slice(&key_bytes);
    buf.extend_from_slice(value);
    let crc = crc32fast::hash(&buf[4..]);
    buf[0..4].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Decodes one row record from the front of `buf`, returning the parsed
/// key/value plus the number of bytes consumed so the caller can advance
/// to the next record in the block.
pub fn decode_row(buf: &[u8]) -> Result<(MVCCKey, Vec<u8>, usize), RowError> {
    if buf.len() < ROW_HEADER_BYTES {
        return Err(RowError::Truncated);
    }
    let expected_crc = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let key_len = u32::from_le_bytes(buf[6..10].try_into().unwrap()) as usize;
    let value_len = u64::from_le_bytes(buf[10..18].try_into().unwrap()) as usize;
    let total = ROW_HEADER_BYTES + key_len + value_len;
    if buf.len() < total {
        return Err(RowError::Truncated);
    }
    let actual_crc = crc32fast::hash(&buf[4..total]);
    if actual_crc != expected_crc {
        return Err(RowError::Corrupt {
            expected: expected_crc,
            actual: actual_crc,
        });
    }
    let key = MVCCKey::parse(&buf[18..18 + key_len]);
    let value = buf[18 + key_len..total].to_vec();
    Ok((key, value, total))
}

/// Decodes every row record packed sequentially in `buf` (a whole data
/// block, or the whole data region).
pub fn decode_block_rows(buf: &[u8]) -> Result<Vec<(MVCCKey, Vec<u8>)>, RowError> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < buf.len() {
        let (key, value, consumed) = decode_row(&buf[cursor..])?;
        cursor += consumed;
        out.push((key, value));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvcc::OpType;

    fn key(content: &[u8], seq: u64) -> MVCCKey {
        MVCCKey::new(content.to_vec(), seq, OpType::Put, 0)
    }

    #[test]
    fn encode_decode_round_trip() {
        let k = key(b"hello", 7);
        let encoded = encode_row(&k, b"world");
        let (decoded_key, decoded_value, consumed) = decode_row(&encoded).unwrap();
        assert_eq!(decoded_key.content, k.content);
        assert_eq!(decoded_key.seq, k.seq);
        assert_eq!(decoded_value, b"world");
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn empty_key_and_value() {
        let k = MVCCKey::new(Vec::new(), 1, OpType::Delete, 0);
        let encoded = encode_row(&k, b"");
        let (decoded_key, decoded_value, consumed) = decode_row(&encoded).unwrap();
        assert!(decoded_key.content.is_empty());
        assert!(decoded_value.is_empty());
        assert_eq!(consumed, ROW_HEADER_BYTES);
    }

    #[test]
    fn truncated_record_is_rejected() {
        let encoded = encode_row(&key(b"k", 1), b"v");
        let result = decode_row(&encoded[..encoded.len() - 1]);
        assert!(matches!(result, Err(RowError::Truncated)));
    }

    #[test]
    fn corrupt_crc_is_detected() {
        let mut encoded = encode_row(&key(b"k", 1), b"v");
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        let result = decode_row(&encoded);
        assert!(matches!(result, Err(RowError::Corrupt { .. })));
    }

    #[test]
    fn decode_multiple_rows_in_sequence() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode_row(&key(b"a", 1), b"1"));
        buf.extend_from_slice(&encode_row(&key(b"b", 2), b"22"));
        buf.extend_from_slice(&encode_row(&key(b"c", 3), b""));
        let rows = decode_block_rows(&buf).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].0.content, b"a");
        assert_eq!(rows[1].1, b"22");
        assert_eq!(rows[2].0.content, b"c");
    }
}
