//! Minimal size-tiered compaction: whenever one level holds more tables
//! than the configured amplification ratio, merge it wholesale into the
//! level below. Tombstones are dropped only when compacting into the last
//! level, where a delete no longer needs to shadow anything further down.
//!
//! Table selection policy beyond this single trigger is intentionally out
//! of scope here -- this exists to keep the version/table-lifetime contract
//! (copy-on-write publish, deferred deletion once every reader has released
//! the superseded tables) exercised end to end, not to be a tuned compaction
//! strategy.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use sstable::SstReader;

use crate::error::EngineError;
use crate::DbInner;

impl DbInner {
    /// Compacts the lowest level that has grown past its amplification
    /// ratio, if any. Returns `Ok(false)` when no level qualifies.
    pub(crate) fn compact_one_level(&self) -> Result<bool, EngineError> {
        let current = self.storage.current();
        let n_levels = current.levels.len();
        let threshold = self.config.amplification_ratio as usize;

        let Some(level) = (0..n_levels.saturating_sub(1)).find(|&l| current.levels[l].len() > threshold)
        else {
            return Ok(false);
        };
        let target = level + 1;

        let mut readers: Vec<SstReader> = Vec::new();
        for table in current.levels[level].iter() {
            readers.push(SstReader::open(table.path())?);
        }
        for table in current.levels[target].iter() {
            readers.push(SstReader::open(table.path())?);
        }

        let drop_tombstones = target == n_levels - 1;
        let merged = if drop_tombstones {
            sstable::merge_tables_dropping_tombstones(&readers)?
        } else {
            sstable::merge_tables(&readers)?
        };

        let mut next = current.cow();
        let mut new_target = Vec::new();
        if !merged.is_empty() {
            let table_seq = self.table_seq.fetch_add(1, Ordering::AcqRel);
            let path = sstable::dump_table(
                &self.work_dir,
                target,
                table_seq,
                &merged,
                self.config.bloom_k,
                self.config.block_size,
            )?;
            new_target.push(Arc::new(storage::SstHandle::open(&path)?));
        }

        for table in current.levels[level].iter().chain(current.levels[target].iter()) {
            table.mark_for_deletion();
            next.tables_to_delete.push(table.clone());
        }
        next.levels[level].clear();
        next.levels[target] = new_target;

        self.storage.set_version(next)?;
        Ok(true)
    }
}
