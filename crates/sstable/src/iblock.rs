//! Sparse block index: a sorted sequence of block descriptors, one per
//! data block, binary-searched by the content of each block's first key.

use mvcc::MVCCKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IBlockError {
    #[error("index entry truncated")]
    Truncated,
}

/// Describes one data block: the MVCC key of its first record, and its
/// absolute `(offset, size)` within the SST file.
#[derive(Debug, Clone)]
pub struct IBlockEntry {
    pub first_key: MVCCKey,
    pub offset: u64,
    pub size: u64,
}

/// The table's sparse index, held fully in memory.
///
/// Entry 0 is always implicit: block 0 starts at data-relative offset 0
/// and its first key is the table's stored min key, so it is never
/// serialized on disk.
#[derive(Debug)]
pub struct LinearIndex {
    entries: Vec<IBlockEntry>,
    base_applied: bool,
}

impl LinearIndex {
    /// Builds an index from already-known entries (used by the writer,
    /// which knows each block's offset and size directly as it streams
    /// the data section).
    pub fn new(entries: Vec<IBlockEntry>) -> Self {
        LinearIndex {
            entries,
            base_applied: false,
        }
    }

    /// Reconstructs an index from its serialized bytes (entries for blocks
    /// 1..N) plus the table's min key (block 0's implicit first key) and
    /// the total data-section length (used to derive the last block's size).
    pub fn from_bytes(
        min_key: MVCCKey,
        bytes: &[u8],
        data_block_len: u64,
    ) -> Result<Self, IBlockError> {
        let mut first_keys: Vec<(MVCCKey, u64)> = vec![(min_key, 0)];
        let mut cursor = 0usize;
        while cursor < bytes.len() {
            if bytes.len() - cursor < 12 {
                return Err(IBlockError::Truncated);
            }
            let key_len = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
            let offset = u64::from_le_bytes(bytes[cursor + 4..cursor + 12].try_into().unwrap());
            cursor += 12;
            if bytes.len() - cursor < key_len {
                return Err(IBlockError::Truncated);
            }
            let key = MVCCKey::parse(&bytes[cursor..cursor + key_len]);
            cursor += key_len;
            first_keys.push((key, offset));
        }

        let mut entries = Vec::with_capacity(first_keys.len());
        for (i, (key, offset)) in first_keys.into_iter().enumerate() {
            entries.push(IBlockEntry {
                first_key: key,
                offset,
                size: 0,
            });
            if i > 0 {
                let prev_offset = entries[i - 1].offset;
                entries[i - 1].size = offset - prev_offset;
            }
        }
        if let Some(last) = entries.last_mut() {
            last.size = data_block_len - last.offset;
        }
        Ok(LinearIndex {
            entries,
            base_applied: false,
        })
    }

    /// Serializes entries for blocks 1..N (block 0's implicit entry is
    /// skipped): `u32 key_len | u64 offset | key_bytes`, offsets relative
    /// to the data section's own start.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for entry in self.entries.iter().skip(1) {
            let key_bytes = entry.first_key.dump_bytes();
            buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(&entry.offset.to_le_bytes());
            buf.extend_from_slice(&key_bytes);
        }
        buf
    }

    /// One-time shift of every entry's offset by the absolute byte offset
    /// where the data section begins in the file. Idempotent.
    pub fn set_base_offset(&mut self, base: u64) {
        if self.base_applied {
            return;
        }
        for entry in &mut self.entries {
            entry.offset += base;
        }
        self.base_applied = true;
    }

    /// Binary search: the greatest block whose first-key content is
    /// `<= content`. `None` if `content` precedes every block (should not
    /// happen for a content within `[min, max]`).
    pub fn find(&self, content: &[u8]) -> Option<(usize, &IBlockEntry)> {
        let idx = self
            .entries
            .partition_point(|e| e.first_key.content.as_slice() <= content);
        if idx == 0 {
            None
        } else {
            Some((idx - 1, &self.entries[idx - 1]))
        }
    }

    pub fn get_by_index(&self, i: usize) -> Option<&IBlockEntry> {
        self.entries.get(i)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvcc::OpType;

    fn key(content: &[u8]) -> MVCCKey {
        MVCCKey::new(content.to_vec(), 1, OpType::Put, 0)
    }

    #[test]
    fn serialize_skips_implicit_first_entry() {
        let entries = vec![
            IBlockEntry { first_key: key(b"a"), offset: 0, size: 100 },
            IBlockEntry { first_key: key(b"m"), offset: 100, size: 80 },
        ];
        let index = LinearIndex::new(entries);
        let bytes = index.serialize();
        // Only the second entry ("m") is serialized.
        let rebuilt = LinearIndex::from_bytes(key(b"a"), &bytes, 180).unwrap();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt.get_by_index(0).unwrap().offset, 0);
        assert_eq!(rebuilt.get_by_index(0).unwrap().size, 100);
        assert_eq!(rebuilt.get_by_index(1).unwrap().offset, 100);
        assert_eq!(rebuilt.get_by_index(1).unwrap().size, 80);
    }

    #[test]
    fn find_picks_greatest_block_at_or_before_content() {
        let entries = vec![
            IBlockEntry { first_key: key(b"a"), offset: 0, size: 10 },
            IBlockEntry { first_key: key(b"m"), offset: 10, size: 10 },
            IBlockEntry { first_key: key(b"z"), offset: 20, size: 10 },
        ];
        let index = LinearIndex::new(entries);
        assert_eq!(index.find(b"a").unwrap().0, 0);
        assert_eq!(index.find(b"g").unwrap().0, 0);
        assert_eq!(index.find(b"m").unwrap().0, 1);
        assert_eq!(index.find(b"y").unwrap().0, 1);
        assert_eq!(index.find(b"zz").unwrap().0, 2);
    }

    #[test]
    fn set_base_offset_is_idempotent() {
        let entries = vec![IBlockEntry { first_key: key(b"a"), offset: 0, size: 10 }];
        let mut index = LinearIndex::new(entries);
        index.set_base_offset(1000);
        index.set_base_offset(1000);
        assert_eq!(index.get_by_index(0).unwrap().offset, 1000);
    }

    #[test]
    fn single_block_round_trips() {
        let entries = vec![IBlockEntry { first_key: key(b"only"), offset: 0, size: 50 }];
        let index = LinearIndex::new(entries);
        let bytes = index.serialize();
        assert!(bytes.is_empty());
        let rebuilt = LinearIndex::from_bytes(key(b"only"), &bytes, 50).unwrap();
        assert_eq!(rebuilt.len(), 1);
        assert_eq!(rebuilt.get_by_index(0).unwrap().size, 50);
    }
}
