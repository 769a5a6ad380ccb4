//! SSTable file layout: magic, fixed header, and the filename convention.
//!
//! ```text
//! [0..16)                  magic string (16 bytes, constant)
//! [16..40)                 fixed header: u32 header_len, u32 index_block_len,
//!                          u32 filter_block_len, u64 data_block_len, u32 min_key_len
//! [40 .. 40+idx_len)       index block bytes
//! [.. +filter_len)         bloom filter bytes
//! [.. +min_key_len)        min MVCC key bytes
//! [.. +max_key_len)        max MVCC key bytes (length inferred from header_len)
//! [.. +data_len)           data blocks (row records)
//! ```
//!
//! `header_len` is the combined length of the index, filter, min-key and
//! max-key regions -- not just one of them -- so `max_key_len` has to be
//! derived at load time as `header_len - index_block_len - filter_block_len
//! - min_key_len`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const MAGIC: &[u8; 16] = b"home.drifter.vip";
pub const MAGIC_LEN: u64 = 16;
pub const FIXED_HEADER_LEN: u64 = 24;

/// The 24-byte fixed header at `[16..40)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub header_len: u32,
    pub index_block_len: u32,
    pub filter_block_len: u32,
    pub data_block_len: u64,
    pub min_key_len: u32,
}

impl Header {
    pub fn max_key_len(&self) -> u32 {
        self.header_len - self.index_block_len - self.filter_block_len - self.min_key_len
    }

    /// Absolute offset where the data section begins.
    pub fn data_offset(&self) -> u64 {
        MAGIC_LEN + FIXED_HEADER_LEN + self.header_len as u64
    }

    /// Combined length of the index+filter+min+max region immediately
    /// following the fixed header.
    pub fn variable_region_len(&self) -> u64 {
        self.header_len as u64
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.header_len)?;
        w.write_u32::<LittleEndian>(self.index_block_len)?;
        w.write_u32::<LittleEndian>(self.filter_block_len)?;
        w.write_u64::<LittleEndian>(self.data_block_len)?;
        w.write_u32::<LittleEndian>(self.min_key_len)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Header {
            header_len: r.read_u32::<LittleEndian>()?,
            index_block_len: r.read_u32::<LittleEndian>()?,
            filter_block_len: r.read_u32::<LittleEndian>()?,
            data_block_len: r.read_u64::<LittleEndian>()?,
            min_key_len: r.read_u32::<LittleEndian>()?,
        })
    }
}

/// Builds the on-disk filename for a table at `level`/`seq`: two-digit
/// level, `L`, ten-digit zero-padded seq, e.g. `"00L0000000007.sst"`.
pub fn table_file_name(level: usize, seq: u64) -> String {
    format!("{level:02}L{seq:010}.sst")
}

/// Parses a filename produced by [`table_file_name`].
pub fn parse_table_file_name(name: &str) -> Option<(usize, u64)> {
    let stem = name.strip_suffix(".sst")?;
    if stem.len() != 13 {
        return None;
    }
    let (level_str, rest) = stem.split_at(2);
    let seq_str = rest.strip_prefix('L')?;
    let level = level_str.parse().ok()?;
    let seq = seq_str.parse().ok()?;
    Some((level, seq))
}
