//! # MVCC key model
//!
//! The primary key type shared by the skip list, the write-ahead log, and
//! the SSTable format. An `MVCCKey` packs a user-supplied `content` byte
//! string together with a monotonically increasing sequence number, an
//! operation tag, and the id of the transaction that owns the row (`0`
//! once committed).
//!
//! Two distinct orderings apply to the same key type:
//!
//! - [`MVCCKey::modify_cmp`] is the skip list's storage order: same content
//!   sorts by *descending* `seq`, so the newest version of a row is always
//!   encountered first during a forward scan.
//! - [`MVCCKey::query_cmp`] is used when probing for a specific snapshot:
//!   on equal content, any candidate whose `seq` does not exceed the probe
//!   is treated as an immediate match rather than "greater", so a point
//!   lookup stops at the first visible version instead of walking the
//!   whole version chain.

use byteorder::{ByteOrder, LittleEndian};
use std::cmp::Ordering;

/// Width of the packed `(seq << 8) | op_type` header written before `content`.
pub const KEY_HEADER_BYTES: usize = 8;

/// Sequence numbers are carried in 56 bits, packed alongside the 1-byte op code.
pub const SEQ_BITS: u32 = 56;
pub const MAX_SEQ: u64 = (1u64 << SEQ_BITS) - 1;

/// Operation tag stored in the low byte of the packed key header.
///
/// Mirrors the bitflag constants of the system this type is modeled on
/// (`Put = 1`, `Delete = 2`, ...): only one tag is ever set on a stored key,
/// but the numeric values are kept so the wire format lines up byte for
/// byte with readers that only know the raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpType {
    Put = 1,
    Delete = 2,
    Checkpoint = 4,
    Get = 8,
    Range = 16,
    Exists = 32,
}

impl OpType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<OpType> {
        match code {
            1 => Some(OpType::Put),
            2 => Some(OpType::Delete),
            4 => Some(OpType::Checkpoint),
            8 => Some(OpType::Get),
            16 => Some(OpType::Range),
            32 => Some(OpType::Exists),
            _ => None,
        }
    }
}

/// Isolation level a [`MVCCKey`] is probed under.
///
/// `ReadCommitted` is the default a fresh transaction starts with unless
/// told otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IsoLevel {
    ReadUncommitted = 0,
    #[default]
    ReadCommitted = 1,
    RepeatableRead = 2,
}

/// The row identity used throughout the store: a user key plus its MVCC metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MVCCKey {
    pub content: Vec<u8>,
    pub seq: u64,
    pub op_type: OpType,
    pub trx_id: u32,
    pub iso_level: IsoLevel,
}

impl MVCCKey {
    /// A committed key (`trx_id = 0`) at `ReadCommitted`.
    pub fn new(content: Vec<u8>, seq: u64, op_type: OpType, trx_id: u32) -> Self {
        MVCCKey {
            content,
            seq,
            op_type,
            trx_id,
            iso_level: IsoLevel::ReadCommitted,
        }
    }

    /// A key carrying an explicit isolation level, used to probe for a read.
    pub fn with_iso_level(
        content: Vec<u8>,
        seq: u64,
        op_type: OpType,
        trx_id: u32,
        iso_level: IsoLevel,
    ) -> Self {
        MVCCKey {
            content,
            seq,
            op_type,
            trx_id,
            iso_level,
        }
    }

    /// Bytes this key contributes to a memtable's byte-size accounting:
    /// the content plus the 8-byte packed header.
    pub fn byte_size(&self) -> usize {
        self.content.len() + KEY_HEADER_BYTES
    }

    /// Serializes to the on-disk/on-wire layout: 8 little-endian bytes
    /// packing `(seq << 8) | op_type`, followed by `content`.
    pub fn dump_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; KEY_HEADER_BYTES + self.content.len()];
        let packed = (self.seq << 8) | self.op_type.code() as u64;
        LittleEndian::write_u64(&mut buf[0..8], packed);
        buf[8..].copy_from_slice(&self.content);
        buf
    }

    /// Parses the layout written by [`MVCCKey::dump_bytes`].
    ///
    /// `trx_id` is not part of the wire format (on-disk rows are always
    /// committed, invariant 5 of the data model) and is always `0` after
    /// parsing.
    pub fn parse(bytes: &[u8]) -> MVCCKey {
        assert!(bytes.len() >= KEY_HEADER_BYTES, "truncated MVCC key");
        let packed = LittleEndian::read_u64(&bytes[0..8]);
        let op_code = (packed & 0xFF) as u8;
        let seq = packed >> 8;
        let op_type = OpType::from_code(op_code).expect("corrupt MVCC key op_type byte");
        MVCCKey {
            content: bytes[8..].to_vec(),
            seq,
            op_type,
            trx_id: 0,
            iso_level: IsoLevel::ReadCommitted,
        }
    }

    /// Storage order used by the skip list: content ascending, then seq
    /// descending (newest version first).
    pub fn modify_cmp(&self, other: &MVCCKey) -> Ordering {
        match self.content.cmp(&other.content) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }

    /// Probe order used to resolve a point lookup: on equal content, any
    /// candidate whose `seq` does not exceed `self.seq` is an immediate
    /// match (`Equal`) rather than strictly greater.
    pub fn query_cmp(&self, other: &MVCCKey) -> Ordering {
        match self.content.cmp(&other.content) {
            Ordering::Equal => {
                if self.seq < other.seq {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            }
            ord => ord,
        }
    }
}

/// A materialized `{key, value}` pair returned by reads and scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub key: MVCCKey,
    pub value: Vec<u8>,
}

impl Element {
    pub fn new(key: MVCCKey, value: Vec<u8>) -> Self {
        Element { key, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(content: &[u8], seq: u64, op: OpType, trx: u32) -> MVCCKey {
        MVCCKey::new(content.to_vec(), seq, op, trx)
    }

    #[test]
    fn dump_and_parse_round_trip() {
        let k = key(b"hello", 42, OpType::Put, 0);
        let bytes = k.dump_bytes();
        let parsed = MVCCKey::parse(&bytes);
        assert_eq!(parsed.content, k.content);
        assert_eq!(parsed.seq, k.seq);
        assert_eq!(parsed.op_type, k.op_type);
    }

    #[test]
    fn modify_order_prefers_larger_seq_at_equal_content() {
        let newer = key(b"k", 10, OpType::Put, 0);
        let older = key(b"k", 5, OpType::Put, 0);
        assert_eq!(newer.modify_cmp(&older), Ordering::Less);
        assert_eq!(older.modify_cmp(&newer), Ordering::Greater);
    }

    #[test]
    fn modify_order_falls_back_to_content() {
        let a = key(b"a", 1, OpType::Put, 0);
        let b = key(b"b", 1, OpType::Put, 0);
        assert_eq!(a.modify_cmp(&b), Ordering::Less);
    }

    #[test]
    fn query_order_matches_on_seq_at_or_before_probe() {
        let probe = key(b"k", 10, OpType::Get, 0);
        let candidate_visible = key(b"k", 10, OpType::Put, 0);
        let candidate_older = key(b"k", 3, OpType::Put, 0);
        let candidate_newer = key(b"k", 11, OpType::Put, 0);
        assert_eq!(probe.query_cmp(&candidate_visible), Ordering::Equal);
        assert_eq!(probe.query_cmp(&candidate_older), Ordering::Equal);
        assert_eq!(probe.query_cmp(&candidate_newer), Ordering::Greater);
    }

    #[test]
    fn byte_size_includes_header() {
        let k = key(b"abcd", 1, OpType::Put, 0);
        assert_eq!(k.byte_size(), 4 + KEY_HEADER_BYTES);
    }
}
