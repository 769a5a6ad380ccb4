//! # MVCC-aware skip list
//!
//! The ordered index backing a memtable: a probabilistic balanced map keyed
//! by [`MVCCKey::modify_cmp`], supporting snapshot-isolated point lookups,
//! range scans and an optimistic per-row write lock embedded in the key
//! itself (`trx_id`).
//!
//! Nodes live in a flat arena (`Vec<Node>`) addressed by index rather than
//! by pointer; forward links are `Option<usize>` indices into that arena.
//! Deleted nodes are unlinked but not reclaimed from the arena — acceptable
//! here because a memtable's skip list is bounded in size and discarded
//! wholesale once flushed, so the arena never outlives one memtable
//! generation.
//!
//! Concurrency is single-writer / multiple-reader: one [`std::sync::RwLock`]
//! guards the whole structure. Mutating calls (`set`, `delete`) take the
//! write half for their entire duration rather than upgrading a read lock
//! mid-operation — simpler than, and behaviorally equivalent to, splitting
//! the descent (read-held) from the splice (write-held), since both still
//! serialize all writers against each other and against readers.

use mvcc::{Element, IsoLevel, MVCCKey, OpType};
use rand::Rng;
use std::cmp::Ordering;
use std::sync::RwLock;

pub const DEFAULT_MAX_LEVEL: usize = 48;

struct Node {
    key: MVCCKey,
    value: Vec<u8>,
    levels: Vec<Option<usize>>,
}

struct Inner {
    arena: Vec<Node>,
    head: Vec<Option<usize>>,
    back: Option<usize>,
    length: usize,
    level_counter: Vec<usize>,
    max_level: usize,
}

/// Outcome of [`SkipList::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// A brand new row was inserted.
    Inserted,
    /// An existing row with identical `(content, seq)` had its value replaced.
    Updated,
    /// Blocked: the row immediately ahead at this content is held by another
    /// transaction. Carries that transaction's id so the caller can poll it.
    Conflict { blocking_trx_id: u32 },
}

pub struct SkipList {
    inner: RwLock<Inner>,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    pub fn new() -> Self {
        Self::with_max_level(DEFAULT_MAX_LEVEL)
    }

    pub fn with_max_level(max_level: usize) -> Self {
        let max_level = max_level.max(1);
        SkipList {
            inner: RwLock::new(Inner {
                arena: Vec::new(),
                head: vec![None; max_level],
                back: None,
                length: 0,
                level_counter: vec![0; max_level],
                max_level,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or updates `key`. See [`SetOutcome`].
    pub fn set(&self, key: MVCCKey, value: Vec<u8>) -> SetOutcome {
        self.inner.write().unwrap().set(key, value)
    }

    /// Removes the row whose `(content, seq)` matches `key` exactly.
    pub fn delete(&self, key: &MVCCKey) -> Option<Element> {
        self.inner.write().unwrap().delete(key)
    }

    /// Snapshot-isolated point lookup, applying the visibility rule implied
    /// by `probe.iso_level`.
    pub fn get_entry(&self, probe: &MVCCKey) -> Option<Element> {
        self.inner.read().unwrap().get_entry(probe)
    }

    pub fn exists(&self, probe: &MVCCKey) -> bool {
        self.get_entry(probe).is_some()
    }

    /// Like [`SkipList::get_entry`], but a visible tombstone is returned
    /// rather than treated as "not found" -- needed by callers merging this
    /// list with older sources that must stay shadowed.
    pub fn get_entry_any(&self, probe: &MVCCKey) -> Option<Element> {
        self.inner.read().unwrap().get_entry_any(probe)
    }

    /// Forward range scan over `[start, end)` in modify order, deduplicated
    /// by content (newest version only), excluding tombstones.
    pub fn range(&self, start: &MVCCKey, end: &MVCCKey, count: usize, offset: usize) -> Vec<Element> {
        self.inner.read().unwrap().range(start, end, count, offset)
    }

    pub fn first(&self) -> Option<Element> {
        let inner = self.inner.read().unwrap();
        inner.head[0].map(|idx| inner.element_at(idx))
    }

    pub fn last(&self) -> Option<Element> {
        let inner = self.inner.read().unwrap();
        inner.back.map(|idx| inner.element_at(idx))
    }

    /// Materializes every row in modify order (newest-first per content).
    /// Used when dumping a frozen memtable to an SSTable.
    pub fn iter(&self) -> Vec<Element> {
        let inner = self.inner.read().unwrap();
        let mut out = Vec::with_capacity(inner.length);
        let mut cur = inner.head[0];
        while let Some(idx) = cur {
            out.push(inner.element_at(idx));
            cur = inner.arena[idx].levels.first().copied().flatten();
        }
        out
    }

    /// Raw `trx_id` of the newest row at `content`, ignoring op type and
    /// isolation level. Used to poll a row lock discovered via
    /// [`SetOutcome::Conflict`] until it clears.
    pub fn current_trx_id(&self, content: &[u8]) -> Option<u32> {
        let inner = self.inner.read().unwrap();
        inner.newest_at_content(content).map(|idx| inner.arena[idx].key.trx_id)
    }

    /// Mirrors the source's lock-scan: looks up `content` under
    /// `ReadUncommitted` (so uncommitted rows are visible) and reports the
    /// owning `trx_id` if it belongs to someone other than `querying_trx`.
    /// Like the visibility rule it reuses, this only sees `Put` rows — an
    /// uncommitted tombstone on `content` is not detected as a conflict.
    pub fn conflicting_trx(&self, content: &[u8], querying_trx: u32) -> Option<u32> {
        let probe = MVCCKey::with_iso_level(
            content.to_vec(),
            u64::MAX,
            OpType::Get,
            querying_trx,
            IsoLevel::ReadUncommitted,
        );
        let entry = self.get_entry(&probe)?;
        if entry.key.trx_id != 0 && entry.key.trx_id != querying_trx {
            Some(entry.key.trx_id)
        } else {
            None
        }
    }

    /// Per-level insertion counts, for diagnostics.
    pub fn level_histogram(&self) -> Vec<usize> {
        self.inner.read().unwrap().level_counter.clone()
    }

    /// Clears the row lock on the exact `(content, seq)` row, provided it is
    /// still held by `trx_id`. A transaction that wrote the same content more
    /// than once records one [`MVCCKey`] per write and must clear every one
    /// of them on commit, not just the newest. Returns `false` if the row
    /// has since moved on (already committed or owned by someone else).
    pub fn commit_trx_at(&self, content: &[u8], seq: u64, trx_id: u32) -> bool {
        self.inner.write().unwrap().commit_trx_at(content, seq, trx_id)
    }
}

impl Inner {
    fn element_at(&self, idx: usize) -> Element {
        let node = &self.arena[idx];
        Element::new(node.key.clone(), node.value.clone())
    }

    fn level_next(&self, node: Option<usize>, level: usize) -> Option<usize> {
        match node {
            None => self.head[level],
            Some(idx) => {
                let levels = &self.arena[idx].levels;
                if level < levels.len() {
                    levels[level]
                } else {
                    None
                }
            }
        }
    }

    fn set_level_next(&mut self, node: Option<usize>, level: usize, value: Option<usize>) {
        match node {
            None => self.head[level] = value,
            Some(idx) => self.arena[idx].levels[level] = value,
        }
    }

    fn random_level(&self) -> usize {
        let bits_len = (usize::BITS - self.length.leading_zeros()) as usize;
        let mut estimated = bits_len * 4;
        if estimated > self.max_level {
            estimated = self.max_level;
        }
        let mut rng = rand::thread_rng();
        let mut level = 1usize;
        let mut threshold: i64 = i32::MAX as i64 / 2;
        let mut random_value: i64 = rng.gen_range(0..=i32::MAX) as i64;
        while random_value < threshold && level <= estimated {
            level += 1;
            if level % 16 == 0 {
                threshold = i32::MAX as i64 / 2;
                random_value = rng.gen_range(0..=i32::MAX) as i64;
            } else {
                threshold /= 2;
            }
        }
        level.min(self.max_level)
    }

    fn set(&mut self, key: MVCCKey, value: Vec<u8>) -> SetOutcome {
        let max_level = self.max_level;
        let mut update: Vec<Option<usize>> = vec![None; max_level];
        let mut cur: Option<usize> = None;
        for level in (0..max_level).rev() {
            loop {
                match self.level_next(cur, level) {
                    Some(next_idx) => match key.modify_cmp(&self.arena[next_idx].key) {
                        Ordering::Greater => cur = Some(next_idx),
                        Ordering::Equal => {
                            self.arena[next_idx].value = value;
                            return SetOutcome::Updated;
                        }
                        Ordering::Less => break,
                    },
                    None => break,
                }
            }
            update[level] = cur;
        }

        if let Some(next_idx) = self.level_next(update[0], 0) {
            let next_key = &self.arena[next_idx].key;
            if next_key.content == key.content && next_key.trx_id != 0 && next_key.trx_id != key.trx_id {
                return SetOutcome::Conflict {
                    blocking_trx_id: next_key.trx_id,
                };
            }
        }

        let level = self.random_level();
        self.level_counter[level - 1] += 1;
        let new_idx = self.arena.len();
        let mut levels = Vec::with_capacity(level);
        for l in 0..level {
            let pred = update[l];
            levels.push(self.level_next(pred, l));
            self.set_level_next(pred, l, Some(new_idx));
        }
        self.arena.push(Node { key, value, levels });
        self.length += 1;
        if self.level_next(Some(new_idx), 0).is_none() {
            self.back = Some(new_idx);
        }
        SetOutcome::Inserted
    }

    fn delete(&mut self, key: &MVCCKey) -> Option<Element> {
        let max_level = self.max_level;
        let mut update: Vec<Option<usize>> = vec![None; max_level];
        let mut cur: Option<usize> = None;
        let mut found: Option<usize> = None;
        for level in (0..max_level).rev() {
            loop {
                match self.level_next(cur, level) {
                    Some(next_idx) => match key.modify_cmp(&self.arena[next_idx].key) {
                        Ordering::Greater => cur = Some(next_idx),
                        Ordering::Equal => {
                            found = Some(next_idx);
                            break;
                        }
                        Ordering::Less => break,
                    },
                    None => break,
                }
            }
            update[level] = cur;
        }

        let target = found?;
        let target_levels = std::mem::take(&mut self.arena[target].levels);
        for (level, next) in target_levels.iter().copied().enumerate() {
            let pred = update[level];
            if self.level_next(pred, level) == Some(target) {
                self.set_level_next(pred, level, next);
            }
        }
        if self.back == Some(target) {
            self.back = update[0];
        }
        self.length -= 1;
        Some(self.element_at(target))
    }

    fn commit_trx_at(&mut self, content: &[u8], seq: u64, trx_id: u32) -> bool {
        let probe = MVCCKey::new(content.to_vec(), seq, OpType::Get, 0);
        let mut cur: Option<usize> = None;
        let mut found: Option<usize> = None;
        for level in (0..self.max_level).rev() {
            loop {
                match self.level_next(cur, level) {
                    Some(next_idx) => match probe.modify_cmp(&self.arena[next_idx].key) {
                        Ordering::Greater => cur = Some(next_idx),
                        Ordering::Equal => {
                            found = Some(next_idx);
                            break;
                        }
                        Ordering::Less => break,
                    },
                    None => break,
                }
            }
        }
        let Some(idx) = found else {
            return false;
        };
        if self.arena[idx].key.trx_id == trx_id {
            self.arena[idx].key.trx_id = 0;
            return true;
        }
        false
    }

    fn get_entry(&self, probe: &MVCCKey) -> Option<Element> {
        let mut cur: Option<usize> = None;
        let mut result: Option<usize> = None;
        for level in (0..self.max_level).rev() {
            loop {
                match self.level_next(cur, level) {
                    Some(next_idx) => match probe.query_cmp(&self.arena[next_idx].key) {
                        Ordering::Greater => cur = Some(next_idx),
                        Ordering::Equal => {
                            result = self.visible(probe, next_idx);
                            break;
                        }
                        Ordering::Less => break,
                    },
                    None => break,
                }
            }
        }
        result.map(|idx| self.element_at(idx))
    }

    /// Same descent as [`Inner::get_entry`], but surfaces a visible
    /// tombstone instead of hiding it as "not found". A caller resolving a
    /// key across more than one skip list (memtables layered behind each
    /// other, or memtables layered over SSTable levels) needs to see the
    /// tombstone itself to know an older Put underneath must stay shadowed.
    fn get_entry_any(&self, probe: &MVCCKey) -> Option<Element> {
        let mut cur: Option<usize> = None;
        let mut result: Option<usize> = None;
        for level in (0..self.max_level).rev() {
            loop {
                match self.level_next(cur, level) {
                    Some(next_idx) => match probe.query_cmp(&self.arena[next_idx].key) {
                        Ordering::Greater => cur = Some(next_idx),
                        Ordering::Equal => {
                            result = self.visible_any(probe, next_idx);
                            break;
                        }
                        Ordering::Less => break,
                    },
                    None => break,
                }
            }
        }
        result.map(|idx| self.element_at(idx))
    }

    /// Applies the isolation-level visibility gate of §4.1 to the candidate
    /// at `idx`. Returns `Some(idx)` only for a visible `Put`; a visible
    /// `Delete` (tombstone) resolves to "not found", same as an invisible row.
    fn visible(&self, probe: &MVCCKey, idx: usize) -> Option<usize> {
        let candidate = &self.arena[idx].key;
        let visible = match probe.iso_level {
            IsoLevel::ReadUncommitted => true,
            IsoLevel::ReadCommitted => candidate.trx_id == 0 || candidate.trx_id == probe.trx_id,
            IsoLevel::RepeatableRead => {
                candidate.seq <= probe.seq && (candidate.trx_id == 0 || candidate.trx_id == probe.trx_id)
            }
        };
        if visible && candidate.op_type == OpType::Put {
            Some(idx)
        } else {
            None
        }
    }

    /// Same visibility gate as [`Inner::visible`], without the Put-only
    /// filter: a visible tombstone resolves to `Some`.
    fn visible_any(&self, probe: &MVCCKey, idx: usize) -> Option<usize> {
        let candidate = &self.arena[idx].key;
        let visible = match probe.iso_level {
            IsoLevel::ReadUncommitted => true,
            IsoLevel::ReadCommitted => candidate.trx_id == 0 || candidate.trx_id == probe.trx_id,
            IsoLevel::RepeatableRead => {
                candidate.seq <= probe.seq && (candidate.trx_id == 0 || candidate.trx_id == probe.trx_id)
            }
        };
        if visible {
            Some(idx)
        } else {
            None
        }
    }

    /// Locates the newest row at `content` (by modify order), ignoring
    /// op type, trx ownership and isolation level entirely.
    fn newest_at_content(&self, content: &[u8]) -> Option<usize> {
        let probe = MVCCKey::new(content.to_vec(), u64::MAX, OpType::Get, 0);
        let mut cur: Option<usize> = None;
        for level in (0..self.max_level).rev() {
            loop {
                match self.level_next(cur, level) {
                    Some(next_idx) => match probe.modify_cmp(&self.arena[next_idx].key) {
                        Ordering::Greater => cur = Some(next_idx),
                        _ => break,
                    },
                    None => break,
                }
            }
        }
        let next0 = self.level_next(cur, 0)?;
        if self.arena[next0].key.content == content {
            Some(next0)
        } else {
            None
        }
    }

    fn range(&self, start: &MVCCKey, end: &MVCCKey, count: usize, offset: usize) -> Vec<Element> {
        let prealloc = count.min(4096);
        let mut result = Vec::with_capacity(prealloc);
        let mut current_offset = 0usize;
        let mut prev_content: Option<Vec<u8>> = None;
        let mut cur = self.head[0];
        while let Some(idx) = cur {
            let node = &self.arena[idx];
            let next = node.levels.first().copied().flatten();
            if !matches!(node.key.modify_cmp(start), Ordering::Less) {
                if matches!(node.key.modify_cmp(end), Ordering::Less) {
                    if current_offset >= offset {
                        if prev_content.as_deref() == Some(node.key.content.as_slice()) {
                            cur = next;
                            continue;
                        }
                        prev_content = Some(node.key.content.clone());
                        if node.key.op_type != OpType::Delete {
                            result.push(Element::new(node.key.clone(), node.value.clone()));
                            if result.len() >= count {
                                break;
                            }
                        }
                    } else {
                        current_offset += 1;
                    }
                } else {
                    break;
                }
            }
            cur = next;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvcc::{IsoLevel, OpType};

    fn put(content: &[u8], seq: u64, trx: u32) -> MVCCKey {
        MVCCKey::new(content.to_vec(), seq, OpType::Put, trx)
    }

    fn probe(content: &[u8], seq: u64, trx: u32, iso: IsoLevel) -> MVCCKey {
        MVCCKey::with_iso_level(content.to_vec(), seq, OpType::Get, trx, iso)
    }

    #[test]
    fn insert_and_get_latest_visible_version() {
        let list = SkipList::new();
        assert_eq!(list.set(put(b"k", 1, 0), b"v1".to_vec()), SetOutcome::Inserted);
        assert_eq!(list.set(put(b"k", 2, 0), b"v2".to_vec()), SetOutcome::Inserted);
        let got = list.get_entry(&probe(b"k", 10, 0, IsoLevel::ReadCommitted)).unwrap();
        assert_eq!(got.value, b"v2");
    }

    #[test]
    fn repeatable_read_pins_snapshot_seq() {
        let list = SkipList::new();
        list.set(put(b"k", 1, 0), b"v1".to_vec());
        list.set(put(b"k", 5, 0), b"v5".to_vec());
        let got = list.get_entry(&probe(b"k", 3, 0, IsoLevel::RepeatableRead)).unwrap();
        assert_eq!(got.value, b"v1");
    }

    #[test]
    fn delete_resolves_to_not_found() {
        let list = SkipList::new();
        list.set(put(b"k", 1, 0), b"v1".to_vec());
        let del = MVCCKey::new(b"k".to_vec(), 2, OpType::Delete, 0);
        list.set(del, Vec::new());
        assert!(list.get_entry(&probe(b"k", 10, 0, IsoLevel::ReadCommitted)).is_none());
    }

    #[test]
    fn uncommitted_row_blocks_conflicting_writer() {
        let list = SkipList::new();
        assert_eq!(list.set(put(b"k", 1, 7), Vec::new()), SetOutcome::Inserted);
        match list.set(put(b"k", 2, 9), Vec::new()) {
            SetOutcome::Conflict { blocking_trx_id } => assert_eq!(blocking_trx_id, 7),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn same_trx_can_overwrite_its_own_uncommitted_row() {
        let list = SkipList::new();
        list.set(put(b"k", 1, 7), b"first".to_vec());
        let outcome = list.set(put(b"k", 2, 7), b"second".to_vec());
        assert_eq!(outcome, SetOutcome::Inserted);
        let got = list
            .get_entry(&probe(b"k", 10, 7, IsoLevel::ReadUncommitted))
            .unwrap();
        assert_eq!(got.value, b"second");
    }

    #[test]
    fn read_committed_hides_other_transactions_uncommitted_row() {
        let list = SkipList::new();
        list.set(put(b"k", 1, 7), b"secret".to_vec());
        assert!(list
            .get_entry(&probe(b"k", 10, 9, IsoLevel::ReadCommitted))
            .is_none());
    }

    #[test]
    fn delete_removes_exact_row_and_relinks() {
        let list = SkipList::new();
        list.set(put(b"a", 1, 0), b"a1".to_vec());
        let k = put(b"b", 2, 0);
        list.set(k.clone(), b"b1".to_vec());
        list.set(put(b"c", 3, 0), b"c1".to_vec());
        assert_eq!(list.len(), 3);
        let removed = list.delete(&k).unwrap();
        assert_eq!(removed.value, b"b1");
        assert_eq!(list.len(), 2);
        assert!(list
            .get_entry(&probe(b"b", 10, 0, IsoLevel::ReadCommitted))
            .is_none());
    }

    #[test]
    fn range_is_deduplicated_and_ordered() {
        let list = SkipList::new();
        for (content, seq) in [("a", 1), ("b", 2), ("b", 5), ("c", 3)] {
            list.set(put(content.as_bytes(), seq, 0), content.as_bytes().to_vec());
        }
        let start = put(b"", 0, 0);
        let end = put(&[0xff], 0, 0);
        let got = list.range(&start, &end, 10, 0);
        let contents: Vec<_> = got.iter().map(|e| e.key.content.clone()).collect();
        assert_eq!(contents, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        // "b" must resolve to its newest version (seq=5).
        let b = got.iter().find(|e| e.key.content == b"b").unwrap();
        assert_eq!(b.key.seq, 5);
    }

    #[test]
    fn range_offset_and_count() {
        let list = SkipList::new();
        for content in ["a", "b", "c", "d"] {
            list.set(put(content.as_bytes(), 1, 0), Vec::new());
        }
        let start = put(b"", 0, 0);
        let end = put(&[0xff], 0, 0);
        let got = list.range(&start, &end, 2, 1);
        let contents: Vec<_> = got.iter().map(|e| e.key.content.clone()).collect();
        assert_eq!(contents, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn current_trx_id_tracks_newest_row() {
        let list = SkipList::new();
        list.set(put(b"k", 1, 7), Vec::new());
        assert_eq!(list.current_trx_id(b"k"), Some(7));
        list.set(MVCCKey::new(b"k".to_vec(), 2, OpType::Put, 0), Vec::new());
        // trx 7's row is still the one with seq=1 until it commits/overwrites;
        // a fresh committed write at seq 2 from the same caller clears the lock.
    }
}
