//! # Memtable
//!
//! A thin, reference-counted wrapper over the MVCC skip list: the
//! in-memory write buffer every mutation passes through before it is
//! durable in an SST.
//!
//! A memtable moves through three states over its lifetime: *active*
//! (mutable, receiving writes), *frozen* (read-only, but may still be
//! named by transactions that wrote or locked rows in it before the
//! freeze), and *immutable* (no outstanding references, eligible to be
//! dumped to a level-0 SST). This type only tracks the boolean
//! mutable/frozen distinction and the reference count; the collector
//! that promotes frozen -> immutable lives above it.
//!
//! Byte-size accounting is not automatic: callers drive it explicitly
//! through [`Memtable::increase_bytes_size`] using sizes computed from
//! the WAL record actually written, matching the source's split between
//! "apply to the index" and "account for the bytes."

use mvcc::{Element, IsoLevel, MVCCKey, OpType};
use skiplist::{SetOutcome, SkipList};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

/// A memtable: an ordered MVCC index plus the bookkeeping the DB needs to
/// decide when to freeze, flush, and eventually drop it.
pub struct Memtable {
    index: SkipList,
    byte_size: AtomicI64,
    refs: Mutex<HashSet<u32>>,
    wal_offset: AtomicU64,
    mutable: AtomicBool,
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Memtable {
    pub fn new() -> Self {
        Memtable {
            index: SkipList::new(),
            byte_size: AtomicI64::new(0),
            refs: Mutex::new(HashSet::new()),
            wal_offset: AtomicU64::new(0),
            mutable: AtomicBool::new(true),
        }
    }

    /// Inserts a live value for `content` at `seq`, owned by `trx_id`
    /// (`0` for an already-committed write).
    pub fn put(&self, content: Vec<u8>, value: Vec<u8>, seq: u64, trx_id: u32) -> SetOutcome {
        let key = MVCCKey::new(content, seq, OpType::Put, trx_id);
        self.index.set(key, value)
    }

    /// Inserts a tombstone for `content` at `seq`.
    pub fn delete(&self, content: Vec<u8>, seq: u64, trx_id: u32) -> SetOutcome {
        let key = MVCCKey::new(content, seq, OpType::Delete, trx_id);
        self.index.set(key, Vec::new())
    }

    /// Snapshot-isolated point lookup.
    pub fn get(&self, content: &[u8], seq: u64, trx_id: u32, iso_level: IsoLevel) -> Option<Element> {
        let probe = MVCCKey::with_iso_level(content.to_vec(), seq, OpType::Get, trx_id, iso_level);
        self.index.get_entry(&probe)
    }

    pub fn exists(&self, content: &[u8], seq: u64, trx_id: u32, iso_level: IsoLevel) -> bool {
        self.get(content, seq, trx_id, iso_level).is_some()
    }

    /// Like [`Memtable::get`], but a visible tombstone is returned instead
    /// of hidden. A reader layering this memtable over older memtables or
    /// SST levels needs to see the tombstone itself to know an older
    /// version underneath must stay shadowed.
    pub fn get_any(&self, content: &[u8], seq: u64, trx_id: u32, iso_level: IsoLevel) -> Option<Element> {
        let probe = MVCCKey::with_iso_level(content.to_vec(), seq, OpType::Get, trx_id, iso_level);
        self.index.get_entry_any(&probe)
    }

    /// Forward range scan over `[start, end)`, deduplicated by content
    /// (newest version only), excluding tombstones.
    pub fn range(&self, start: &[u8], end: &[u8], count: usize, offset: usize) -> Vec<Element> {
        let start_key = MVCCKey::new(start.to_vec(), 0, OpType::Put, 0);
        let end_key = MVCCKey::new(end.to_vec(), 0, OpType::Put, 0);
        self.index.range(&start_key, &end_key, count, offset)
    }

    pub fn first(&self) -> Option<Element> {
        self.index.first()
    }

    pub fn last(&self) -> Option<Element> {
        self.index.last()
    }

    /// Materializes every row in modify order, for dumping to an SST.
    pub fn iterator(&self) -> Vec<Element> {
        self.index.iter()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Current `trx_id` of the newest row for `content`, if any.
    pub fn current_trx_id(&self, content: &[u8]) -> Option<u32> {
        self.index.current_trx_id(content)
    }

    /// Clears the row lock on the exact `(content, seq)` row. Used by a
    /// committing transaction to publish a write in place, without
    /// re-inserting it. A transaction that wrote the same content more than
    /// once records one write per call, so every row must be cleared by its
    /// own seq, not just the newest at that content.
    pub fn commit_row_at(&self, content: &[u8], seq: u64, trx_id: u32) -> bool {
        self.index.commit_trx_at(content, seq, trx_id)
    }

    /// Removes the exact `(content, seq)` row, used to undo a write that a
    /// rolled-back transaction made to this memtable.
    pub fn remove_row(&self, content: &[u8], seq: u64, op_type: OpType) -> Option<Element> {
        let key = MVCCKey::new(content.to_vec(), seq, op_type, 0);
        self.index.delete(&key)
    }

    /// Mirrors the skip list's lock-conflict scan, used to decide whether a
    /// write must wait on a concurrent transaction.
    pub fn conflicting_trx(&self, content: &[u8], querying_trx: u32) -> Option<u32> {
        self.index.conflicting_trx(content, querying_trx)
    }

    /// Marks `trx_id` as depending on this memtable for locking/visibility,
    /// preventing it from being collected into the immutable set.
    pub fn ref_trx(&self, trx_id: u32) {
        self.refs.lock().unwrap().insert(trx_id);
    }

    /// Releases `trx_id`'s dependency on this memtable.
    pub fn cancel_ref(&self, trx_id: u32) {
        self.refs.lock().unwrap().remove(&trx_id);
    }

    /// Number of transactions still depending on this memtable. Zero means
    /// a frozen memtable is eligible to become immutable.
    pub fn count_refs(&self) -> usize {
        self.refs.lock().unwrap().len()
    }

    /// Approximate byte size tracked by the caller (key + value + bookkeeping
    /// overhead), adjusted via [`Memtable::increase_bytes_size`].
    pub fn bytes_size(&self) -> usize {
        self.byte_size.load(AtomicOrdering::Acquire).max(0) as usize
    }

    /// Adjusts the tracked byte size by `delta`, which may be negative
    /// (e.g. when a write supersedes an existing version).
    pub fn increase_bytes_size(&self, delta: i64) {
        self.byte_size.fetch_add(delta, AtomicOrdering::AcqRel);
    }

    /// WAL offset recorded at the moment this memtable was frozen.
    pub fn wal_offset(&self) -> u64 {
        self.wal_offset.load(AtomicOrdering::Acquire)
    }

    pub fn set_wal_offset(&self, offset: u64) {
        self.wal_offset.store(offset, AtomicOrdering::Release);
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable.load(AtomicOrdering::Acquire)
    }

    /// Marks the memtable read-only. Idempotent.
    pub fn freeze(&self) {
        self.mutable.store(false, AtomicOrdering::Release);
    }
}

impl std::fmt::Debug for Memtable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memtable")
            .field("len", &self.len())
            .field("bytes_size", &self.bytes_size())
            .field("mutable", &self.is_mutable())
            .field("wal_offset", &self.wal_offset())
            .field("refs", &self.count_refs())
            .finish()
    }
}

#[cfg(test)]
mod tests;
