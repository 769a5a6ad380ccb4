//! Dumps a frozen memtable's rows into a new level-0 SST file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bloom::BloomFilter;
use mvcc::Element;

use crate::error::SstError;
use crate::format::{table_file_name, Header, MAGIC};
use crate::iblock::{IBlockEntry, LinearIndex};
use crate::row::encode_row;

/// Writes `rows` (already in modify order, as produced by a memtable's
/// `iterator()`) to `dir/<level><L><seq>.sst`.
///
/// The file is written to a `.tmp` sibling and atomically renamed into
/// place once fully flushed and fsynced, with the parent directory
/// fsynced afterward -- the same crash-safety discipline used for the
/// version and metadata files.
pub fn dump_table(
    dir: &Path,
    level: usize,
    seq: u64,
    rows: &[Element],
    bloom_k: usize,
    block_size: usize,
) -> Result<PathBuf, SstError> {
    if rows.is_empty() {
        return Err(SstError::EmptyTable);
    }

    let final_path = dir.join(table_file_name(level, seq));
    if final_path.exists() {
        return Err(SstError::AlreadyExists(final_path));
    }
    let tmp_path = final_path.with_extension("sst.tmp");

    let mut bloom = BloomFilter::new(rows.len(), bloom_k);
    let mut data = Vec::new();
    let mut index_entries: Vec<IBlockEntry> = vec![IBlockEntry {
        first_key: rows[0].key.clone(),
        offset: 0,
        size: 0,
    }];
    let mut block_start = 0u64;

    for (i, row) in rows.iter().enumerate() {
        if i > 0 && (data.len() as u64 - block_start) >= block_size as u64 {
            index_entries.last_mut().unwrap().size = data.len() as u64 - block_start;
            block_start = data.len() as u64;
            index_entries.push(IBlockEntry {
                first_key: row.key.clone(),
                offset: block_start,
                size: 0,
            });
        }
        data.extend_from_slice(&encode_row(&row.key, &row.value));
        bloom.insert(&row.key.content);
    }
    index_entries.last_mut().unwrap().size = data.len() as u64 - block_start;

    let min_key_bytes = rows[0].key.dump_bytes();
    let max_key_bytes = rows[rows.len() - 1].key.dump_bytes();

    let index = LinearIndex::new(index_entries);
    let index_bytes = index.serialize();
    let mut filter_bytes = Vec::new();
    bloom.write_to(&mut filter_bytes)?;

    let header = Header {
        header_len: (index_bytes.len() + filter_bytes.len() + min_key_bytes.len() + max_key_bytes.len())
            as u32,
        index_block_len: index_bytes.len() as u32,
        filter_block_len: filter_bytes.len() as u32,
        data_block_len: data.len() as u64,
        min_key_len: min_key_bytes.len() as u32,
    };

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)?;
    let mut w = BufWriter::new(file);
    w.write_all(MAGIC)?;
    header.write_to(&mut w)?;
    w.write_all(&index_bytes)?;
    w.write_all(&filter_bytes)?;
    w.write_all(&min_key_bytes)?;
    w.write_all(&max_key_bytes)?;
    w.write_all(&data)?;
    w.flush()?;
    w.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    fs::rename(&tmp_path, &final_path)?;
    if let Some(parent) = final_path.parent() {
        if let Ok(dir_handle) = File::open(parent) {
            let _ = dir_handle.sync_all();
        }
    }

    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SstReader;
    use mvcc::{MVCCKey, OpType};
    use tempfile::tempdir;

    fn elem(content: &[u8], seq: u64, value: &[u8]) -> Element {
        Element::new(MVCCKey::new(content.to_vec(), seq, OpType::Put, 0), value.to_vec())
    }

    #[test]
    fn dump_table_names_file_by_level_and_seq() {
        let dir = tempdir().unwrap();
        let rows = vec![elem(b"a", 1, b"1")];
        let path = dump_table(dir.path(), 0, 5, &rows, 4, 4096).unwrap();
        assert_eq!(path.file_name().unwrap(), "00L0000000005.sst");
    }

    #[test]
    fn dump_table_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let rows = vec![elem(b"a", 1, b"1")];
        dump_table(dir.path(), 0, 1, &rows, 4, 4096).unwrap();
        let err = dump_table(dir.path(), 0, 1, &rows, 4, 4096).unwrap_err();
        assert!(matches!(err, SstError::AlreadyExists(_)));
    }

    #[test]
    fn dump_table_rejects_empty_input() {
        let dir = tempdir().unwrap();
        let err = dump_table(dir.path(), 0, 1, &[], 4, 4096).unwrap_err();
        assert!(matches!(err, SstError::EmptyTable));
    }

    #[test]
    fn dumped_table_reopens_and_serves_gets() {
        let dir = tempdir().unwrap();
        let rows = vec![elem(b"a", 1, b"1"), elem(b"b", 2, b"2"), elem(b"c", 3, b"3")];
        let path = dump_table(dir.path(), 0, 1, &rows, 4, 4096).unwrap();
        let reader = SstReader::open(&path).unwrap();
        assert_eq!(reader.row_count_hint(), 3);
    }

    #[test]
    fn many_rows_span_multiple_blocks() {
        let dir = tempdir().unwrap();
        let mut rows = Vec::new();
        for i in 0..2000u64 {
            rows.push(elem(format!("key{i:06}").as_bytes(), i, b"payloadpayloadpayload"));
        }
        let path = dump_table(dir.path(), 0, 1, &rows, 4, 4096).unwrap();
        let reader = SstReader::open(&path).unwrap();
        assert!(reader.block_count() > 1);
    }
}
