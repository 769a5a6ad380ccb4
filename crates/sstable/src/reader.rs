//! Opens an SST file for point lookups and range scans.

use std::fs::File;
use std::path::{Path, PathBuf};

use bloom::BloomFilter;
use mvcc::{Element, IsoLevel, MVCCKey, OpType};

use crate::block::{Block, BlockReader};
use crate::error::SstError;
use crate::format::{parse_table_file_name, Header, FIXED_HEADER_LEN, MAGIC, MAGIC_LEN};
use crate::iblock::LinearIndex;
use crate::row::decode_block_rows;

/// A read-only handle on one `.sst` file.
///
/// Reads go straight through [`BlockReader`]'s positioned I/O rather than
/// a shared, lock-guarded cursor, so concurrent lookups never block each
/// other.
pub struct SstReader {
    path: PathBuf,
    level: usize,
    seq: u64,
    header: Header,
    min_key: MVCCKey,
    max_key: MVCCKey,
    bloom: BloomFilter,
    index: LinearIndex,
    file: File,
}

/// Applies the same isolation-level visibility gate the skip list uses.
/// On-disk rows are always committed (`trx_id == 0`), so `ReadCommitted`
/// and `ReadUncommitted` admit every `Put`; only `RepeatableRead` needs
/// to check the candidate's `seq` against the probe's snapshot.
fn visible(probe: &MVCCKey, candidate: &MVCCKey) -> bool {
    let admitted = match probe.iso_level {
        IsoLevel::ReadUncommitted | IsoLevel::ReadCommitted => true,
        IsoLevel::RepeatableRead => candidate.seq <= probe.seq,
    };
    admitted && candidate.op_type == OpType::Put
}

/// Same admission rule as [`visible`], without the Put-only filter -- a
/// caller layering this table under a memtable needs to see a tombstone
/// itself to know an older table underneath must stay shadowed.
fn visible_any(probe: &MVCCKey, candidate: &MVCCKey) -> bool {
    match probe.iso_level {
        IsoLevel::ReadUncommitted | IsoLevel::ReadCommitted => true,
        IsoLevel::RepeatableRead => candidate.seq <= probe.seq,
    }
}

impl SstReader {
    /// Opens `path`, parsing its filename, header, index, bloom filter and
    /// min/max keys. The index+filter+min+max region is fetched with one
    /// positioned read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SstError> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SstError::InvalidFilename(path.display().to_string()))?;
        let (level, seq) = parse_table_file_name(file_name)
            .ok_or_else(|| SstError::InvalidFilename(file_name.to_string()))?;

        let file = File::open(&path)?;
        let reader = BlockReader::new(&file);

        let magic = reader.read(&Block { offset: 0, size: MAGIC_LEN })?;
        if magic.as_slice() != MAGIC.as_slice() {
            return Err(SstError::BadMagic);
        }

        let header_bytes = reader.read(&Block {
            offset: MAGIC_LEN,
            size: FIXED_HEADER_LEN,
        })?;
        let header = Header::read_from(&mut &header_bytes[..])?;

        let variable = reader.read(&Block {
            offset: MAGIC_LEN + FIXED_HEADER_LEN,
            size: header.variable_region_len(),
        })?;

        let idx_end = header.index_block_len as usize;
        let filter_end = idx_end + header.filter_block_len as usize;
        let min_end = filter_end + header.min_key_len as usize;
        let max_end = min_end + header.max_key_len() as usize;

        let index_bytes = &variable[0..idx_end];
        let filter_bytes = &variable[idx_end..filter_end];
        let min_key_bytes = &variable[filter_end..min_end];
        let max_key_bytes = &variable[min_end..max_end];

        let min_key = MVCCKey::parse(min_key_bytes);
        let max_key = MVCCKey::parse(max_key_bytes);
        let bloom = BloomFilter::read_from(&mut &filter_bytes[..])?;

        let mut index = LinearIndex::from_bytes(min_key.clone(), index_bytes, header.data_block_len)?;
        index.set_base_offset(header.data_offset());

        Ok(SstReader {
            path,
            level,
            seq,
            header,
            min_key,
            max_key,
            bloom,
            index,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Diagnostic count of keys ever inserted into the bloom filter.
    pub fn row_count_hint(&self) -> u64 {
        self.bloom.len()
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// Point lookup honoring `probe`'s content range, bloom filter, and
    /// isolation level.
    pub fn get(&self, probe: &MVCCKey) -> Result<Option<Element>, SstError> {
        if probe.content < self.min_key.content || probe.content > self.max_key.content {
            return Ok(None);
        }
        if !self.bloom.may_contain(&probe.content) {
            return Ok(None);
        }
        let (_, entry) = match self.index.find(&probe.content) {
            Some(v) => v,
            None => return Ok(None),
        };
        let block = Block { offset: entry.offset, size: entry.size };
        let reader = BlockReader::new(&self.file);
        let bytes = reader.read(&block)?;
        let rows = decode_block_rows(&bytes)?;

        let start = rows.partition_point(|(k, _)| k.content < probe.content);
        for (key, value) in &rows[start..] {
            if key.content != probe.content {
                break;
            }
            if visible(probe, key) {
                return Ok(Some(Element::new(key.clone(), value.clone())));
            }
        }
        Ok(None)
    }

    /// Like [`SstReader::get`], but returns a visible tombstone instead of
    /// treating it as "not found".
    pub fn get_any(&self, probe: &MVCCKey) -> Result<Option<Element>, SstError> {
        if probe.content < self.min_key.content || probe.content > self.max_key.content {
            return Ok(None);
        }
        if !self.bloom.may_contain(&probe.content) {
            return Ok(None);
        }
        let (_, entry) = match self.index.find(&probe.content) {
            Some(v) => v,
            None => return Ok(None),
        };
        let block = Block { offset: entry.offset, size: entry.size };
        let reader = BlockReader::new(&self.file);
        let bytes = reader.read(&block)?;
        let rows = decode_block_rows(&bytes)?;

        let start = rows.partition_point(|(k, _)| k.content < probe.content);
        for (key, value) in &rows[start..] {
            if key.content != probe.content {
                break;
            }
            if visible_any(probe, key) {
                return Ok(Some(Element::new(key.clone(), value.clone())));
            }
        }
        Ok(None)
    }

    /// Forward range scan over `[start, end)` in modify order, deduplicated
    /// by content (newest version first), excluding tombstones, with
    /// `offset`/`count` applied at the content-deduplication layer.
    pub fn range(
        &self,
        start: &[u8],
        end: &[u8],
        count: usize,
        offset: usize,
    ) -> Result<Vec<Element>, SstError> {
        let mut result = Vec::new();
        if self.index.is_empty() {
            return Ok(result);
        }
        let first_block = self.index.find(start).map(|(i, _)| i).unwrap_or(0);

        let reader = BlockReader::new(&self.file);
        let mut skipped = 0usize;
        let mut prev_content: Option<Vec<u8>> = None;

        let mut i = first_block;
        'blocks: while let Some(entry) = self.index.get_by_index(i) {
            let bytes = reader.read(&Block { offset: entry.offset, size: entry.size })?;
            let rows = decode_block_rows(&bytes)?;
            for (key, value) in rows {
                if key.content.as_slice() < start {
                    continue;
                }
                if key.content.as_slice() >= end {
                    break 'blocks;
                }
                if prev_content.as_deref() == Some(key.content.as_slice()) {
                    continue;
                }
                prev_content = Some(key.content.clone());
                if key.op_type == OpType::Delete {
                    continue;
                }
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                result.push(Element::new(key, value));
                if result.len() >= count {
                    break 'blocks;
                }
            }
            i += 1;
        }
        Ok(result)
    }

    /// Materializes every row in the table, in modify order. Used by
    /// compaction to merge tables without a second on-disk pass.
    pub fn iter(&self) -> Result<Vec<Element>, SstError> {
        if self.header.data_block_len == 0 {
            return Ok(Vec::new());
        }
        let reader = BlockReader::new(&self.file);
        let bytes = reader.read(&Block {
            offset: self.header.data_offset(),
            size: self.header.data_block_len,
        })?;
        let rows = decode_block_rows(&bytes)?;
        Ok(rows.into_iter().map(|(k, v)| Element::new(k, v)).collect())
    }

    pub fn min_key(&self) -> &MVCCKey {
        &self.min_key
    }

    pub fn max_key(&self) -> &MVCCKey {
        &self.max_key
    }
}
