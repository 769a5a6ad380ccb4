//! Drains immutable memtables into level-0 SST files, oldest first.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::EngineError;
use crate::DbInner;

impl DbInner {
    /// Flushes the oldest immutable memtable, if any. Returns `Ok(false)`
    /// when there is nothing to flush, so [`crate::workers::flush_worker`]
    /// can loop until the immutable list is drained.
    pub(crate) fn flush_oldest_immutable(&self) -> Result<bool, EngineError> {
        let oldest = {
            let switch = self.switch_lock.read().unwrap();
            switch.immutable.first().cloned()
        };
        let Some(mt) = oldest else {
            return Ok(false);
        };

        let rows = mt.iterator();
        if rows.is_empty() {
            let mut switch = self.switch_lock.write().unwrap();
            switch.immutable.retain(|m| !Arc::ptr_eq(m, &mt));
            return Ok(true);
        }

        let table_seq = self.table_seq.fetch_add(1, Ordering::AcqRel);
        let path = sstable::dump_table(
            &self.work_dir,
            0,
            table_seq,
            &rows,
            self.config.bloom_k,
            self.config.block_size,
        )?;
        let handle = Arc::new(storage::SstHandle::open(&path)?);

        let wal_offset = mt.wal_offset();
        let mut next = self.storage.current().cow();
        next.levels[0].push(handle);
        next.wal_offset = wal_offset;
        self.storage.set_version(next)?;

        {
            let mut switch = self.switch_lock.write().unwrap();
            switch.immutable.retain(|m| !Arc::ptr_eq(m, &mt));
        }

        let mut meta = self.meta.lock().unwrap();
        *meta = meta.next();
        meta.sstable_seq = self.table_seq.load(Ordering::Acquire);
        meta.wal_seq = self.seq.load(Ordering::Acquire);
        meta.wal_check_point = wal_offset;
        meta.flush(&self.work_dir)?;

        Ok(true)
    }
}
