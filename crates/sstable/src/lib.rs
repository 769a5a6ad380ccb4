//! # SSTable — Sorted String Table
//!
//! Immutable, on-disk storage files for the storage engine. When a frozen
//! [`memtable::Memtable`] is ready to be dumped, its rows stream straight
//! into a new level-0 table via [`writer::dump_table`]. SSTables are
//! *write-once, read-many* — never modified in place, only replaced
//! wholesale during compaction.
//!
//! ## File layout
//!
//! ```text
//! [0..16)                  magic string (16 bytes, constant)
//! [16..40)                 fixed header: u32 header_len, u32 index_block_len,
//!                          u32 filter_block_len, u64 data_block_len, u32 min_key_len
//! [40 .. 40+idx_len)       index block bytes
//! [.. +filter_len)         bloom filter bytes
//! [.. +min_key_len)        min MVCC key bytes
//! [.. +max_key_len)        max MVCC key bytes (length inferred from header_len)
//! [.. +data_len)           data blocks (row records, see [`row`])
//! ```
//!
//! The index ([`iblock`]) is a sparse, binary-searchable map from a data
//! block's first key to its `(offset, size)`. Reads go through
//! [`block::BlockReader`], which issues positioned reads against the open
//! file handle rather than serializing access behind a shared cursor.
//!
//! Filenames encode level and sequence: `"00L0000000007.sst"` is level 0,
//! sequence 7 (see [`format::table_file_name`]).

mod block;
mod error;
mod format;
mod iblock;
mod merge;
mod reader;
mod row;
mod writer;

pub use block::{Block, BlockReader};
pub use error::SstError;
pub use format::{parse_table_file_name, table_file_name, Header, MAGIC};
pub use iblock::{IBlockEntry, LinearIndex};
pub use merge::{merge_tables, merge_tables_dropping_tombstones};
pub use reader::SstReader;
pub use row::{decode_block_rows, decode_row, encode_row, RowError};
pub use writer::dump_table;
