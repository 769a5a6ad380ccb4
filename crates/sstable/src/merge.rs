//! K-way merge over multiple [`SstReader`]s, used by compaction to fold
//! several tables into one without re-sorting from scratch.
//!
//! Readers must be passed newest-first (the same order a `Version`'s level
//! list keeps them in): when the same content appears in more than one
//! table, the copy surfacing from the reader earliest in `readers` wins.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use mvcc::{Element, OpType};

use crate::error::SstError;
use crate::reader::SstReader;

struct HeapEntry {
    element: Element,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.element.key.modify_cmp(&other.element.key) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    /// Reversed so `BinaryHeap` (a max-heap) pops entries in ascending
    /// modify order -- smallest content, then newest seq, first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.element.key.modify_cmp(&self.element.key)
    }
}

/// Merges `readers` into one content-deduplicated, tombstone-free sequence
/// in modify order. `readers[0]` is treated as the newest source.
pub fn merge_tables(readers: &[SstReader]) -> Result<Vec<Element>, SstError> {
    let mut iters: Vec<std::vec::IntoIter<Element>> = Vec::with_capacity(readers.len());
    for r in readers {
        iters.push(r.iter()?.into_iter());
    }

    let mut heap = BinaryHeap::new();
    for (source, it) in iters.iter_mut().enumerate() {
        if let Some(element) = it.next() {
            heap.push(HeapEntry { element, source });
        }
    }

    let mut out = Vec::new();
    let mut last_content: Option<Vec<u8>> = None;
    while let Some(HeapEntry { element, source }) = heap.pop() {
        if let Some(next) = iters[source].next() {
            heap.push(HeapEntry { element: next, source });
        }
        if last_content.as_deref() == Some(element.key.content.as_slice()) {
            continue;
        }
        last_content = Some(element.key.content.clone());
        out.push(element);
    }
    Ok(out)
}

/// Like [`merge_tables`] but drops tombstones, for compaction into the
/// last level where a delete no longer needs to shadow anything.
pub fn merge_tables_dropping_tombstones(readers: &[SstReader]) -> Result<Vec<Element>, SstError> {
    Ok(merge_tables(readers)?
        .into_iter()
        .filter(|e| e.key.op_type != OpType::Delete)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::dump_table;
    use mvcc::MVCCKey;
    use tempfile::tempdir;

    fn put(content: &[u8], seq: u64, value: &[u8]) -> Element {
        Element::new(MVCCKey::new(content.to_vec(), seq, OpType::Put, 0), value.to_vec())
    }

    fn del(content: &[u8], seq: u64) -> Element {
        Element::new(MVCCKey::new(content.to_vec(), seq, OpType::Delete, 0), Vec::new())
    }

    #[test]
    fn newer_table_shadows_older_for_same_content() {
        let dir = tempdir().unwrap();
        let newer = dump_table(dir.path(), 0, 2, &[put(b"k", 5, b"new")], 4, 4096).unwrap();
        let older = dump_table(dir.path(), 1, 1, &[put(b"k", 1, b"old")], 4, 4096).unwrap();
        let readers = vec![SstReader::open(&newer).unwrap(), SstReader::open(&older).unwrap()];
        let merged = merge_tables(&readers).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, b"new");
    }

    #[test]
    fn disjoint_tables_merge_in_order() {
        let dir = tempdir().unwrap();
        let a = dump_table(dir.path(), 0, 1, &[put(b"a", 1, b"1"), put(b"c", 1, b"3")], 4, 4096).unwrap();
        let b = dump_table(dir.path(), 0, 2, &[put(b"b", 1, b"2")], 4, 4096).unwrap();
        let readers = vec![SstReader::open(&a).unwrap(), SstReader::open(&b).unwrap()];
        let merged = merge_tables(&readers).unwrap();
        let contents: Vec<_> = merged.iter().map(|e| e.key.content.clone()).collect();
        assert_eq!(contents, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn dropping_tombstones_removes_deletes() {
        let dir = tempdir().unwrap();
        let a = dump_table(dir.path(), 0, 1, &[del(b"a", 2), put(b"b", 1, b"1")], 4, 4096).unwrap();
        let readers = vec![SstReader::open(&a).unwrap()];
        let merged = merge_tables_dropping_tombstones(&readers).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].key.content, b"b");
    }
}
