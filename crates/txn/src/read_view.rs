//! A snapshot read context: everything needed to resolve a `Get`/`Range`
//! consistently, independent of whether it's issued standalone or as part
//! of a read/write [`Transaction`](crate::transaction::Transaction).
//!
//! A `ReadView` pins a [`storage::Version`] for its whole lifetime (released
//! on drop) but only pins its *read sequence* when the isolation level
//! demands it: `ReadCommitted`/`ReadUncommitted` refresh `read_seq` to the
//! database's latest assigned seq on every call, so each read sees the most
//! recent commits; `RepeatableRead` fixes it once, at construction, so every
//! read within the view sees exactly the snapshot it started with.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mvcc::{Element, IsoLevel, MVCCKey, OpType};

use crate::error::TxnError;
use crate::host::MutationHost;

pub struct ReadView {
    pub(crate) host: Arc<dyn MutationHost>,
    pub(crate) version: Arc<storage::Version>,
    pub(crate) iso_level: IsoLevel,
    pub(crate) read_seq: AtomicU64,
    /// `0` for a view not owned by any transaction -- only already-committed
    /// rows are ever visible to it.
    pub(crate) trx_id: u32,
}

impl ReadView {
    pub fn new(host: Arc<dyn MutationHost>, iso_level: IsoLevel) -> Self {
        Self::with_trx_id(host, iso_level, 0)
    }

    pub(crate) fn with_trx_id(host: Arc<dyn MutationHost>, iso_level: IsoLevel, trx_id: u32) -> Self {
        let version = host.storage().get_version();
        let read_seq = host.current_seq();
        ReadView {
            host,
            version,
            iso_level,
            read_seq: AtomicU64::new(read_seq),
            trx_id,
        }
    }

    pub fn isolation_level(&self) -> IsoLevel {
        self.iso_level
    }

    fn effective_read_seq(&self) -> u64 {
        match self.iso_level {
            IsoLevel::RepeatableRead => self.read_seq.load(Ordering::Acquire),
            IsoLevel::ReadCommitted | IsoLevel::ReadUncommitted => {
                let fresh = self.host.current_seq();
                self.read_seq.store(fresh, Ordering::Release);
                fresh
            }
        }
    }

    /// Snapshot-isolated point lookup: active memtable, then frozen
    /// (newest-first), then immutable (newest-first), then each SST level
    /// in turn (newest table within a level first). The first source that
    /// has *anything* for `content` -- a live value or a tombstone --
    /// decides the outcome.
    pub fn get(&self, content: &[u8]) -> Result<Option<Element>, TxnError> {
        let read_seq = self.effective_read_seq();
        let snap = self.host.memtable_snapshot();

        for mt in std::iter::once(&snap.active)
            .chain(snap.frozen.iter().rev())
            .chain(snap.immutable.iter().rev())
        {
            if let Some(e) = mt.get_any(content, read_seq, self.trx_id, self.iso_level) {
                return Ok(visible_value(e));
            }
        }

        let probe = MVCCKey::with_iso_level(content.to_vec(), read_seq, OpType::Get, self.trx_id, self.iso_level);
        for level in &self.version.levels {
            for table in level.iter().rev() {
                if let Some(e) = table.reader().get_any(&probe)? {
                    return Ok(visible_value(e));
                }
            }
        }
        Ok(None)
    }

    pub fn exists(&self, content: &[u8]) -> Result<bool, TxnError> {
        Ok(self.get(content)?.is_some())
    }

    /// Forward range scan over `[start, end)`. Each source contributes its
    /// own (already tombstone-free, content-deduplicated) slice; results are
    /// merged by content with sources ordered newest-first, exactly as
    /// `get` resolves a point lookup, then `offset`/`count` applied to the
    /// merged, deduplicated sequence.
    pub fn range(&self, start: &[u8], end: &[u8], count: usize, offset: usize) -> Result<Vec<Element>, TxnError> {
        let snap = self.host.memtable_snapshot();

        // Over-fetch from every source so a later dedup still has enough
        // material after tombstones/duplicates are folded out; memtables
        // are cheap to over-scan, SST ranges are usually far smaller than
        // the default block sizes anyway.
        let want = offset + count;
        let mut merged: Vec<Element> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for mt in std::iter::once(&snap.active)
            .chain(snap.frozen.iter().rev())
            .chain(snap.immutable.iter().rev())
        {
            for e in mt.range(start, end, want.max(1), 0) {
                if seen.insert(e.key.content.clone()) {
                    merged.push(e);
                }
            }
        }

        for level in &self.version.levels {
            for table in level.iter().rev() {
                for e in table.reader().range(start, end, want.max(1), 0)? {
                    if seen.insert(e.key.content.clone()) {
                        merged.push(e);
                    }
                }
            }
        }

        merged.sort_by(|a, b| a.key.content.cmp(&b.key.content));
        Ok(merged.into_iter().skip(offset).take(count).collect())
    }
}

fn visible_value(e: Element) -> Option<Element> {
    if e.key.op_type == OpType::Delete {
        None
    } else {
        Some(e)
    }
}

impl Drop for ReadView {
    fn drop(&mut self) {
        self.host.storage().release_version(self.version.clone());
    }
}
