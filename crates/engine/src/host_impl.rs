//! Implements [`txn::MutationHost`] for [`DbInner`]: the one place that
//! assigns a seq, appends to the WAL, and inserts into the active memtable
//! as a single atomic step.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use memtable::Memtable;
use mvcc::{MVCCKey, OpType};
use skiplist::SetOutcome;
use storage::Storage;
use txn::{HostError, MemtableSnapshot, MutationHost};

use crate::DbInner;

impl MutationHost for DbInner {
    fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    fn memtable_snapshot(&self) -> MemtableSnapshot {
        let switch = self.switch_lock.read().unwrap();
        MemtableSnapshot {
            active: switch.active.clone(),
            frozen: switch.frozen.clone(),
            immutable: switch.immutable.clone(),
        }
    }

    fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    fn append_put(
        &self,
        content: &[u8],
        value: &[u8],
        trx_id: u32,
    ) -> Result<(u64, Arc<Memtable>, SetOutcome), HostError> {
        self.append(content, Some(value), trx_id)
    }

    fn append_delete(
        &self,
        content: &[u8],
        trx_id: u32,
    ) -> Result<(u64, Arc<Memtable>, SetOutcome), HostError> {
        self.append(content, None, trx_id)
    }
}

impl DbInner {
    /// Assigns the next seq and applies a Put (`value = Some`) or Delete
    /// (`value = None`) to the active memtable, appending to the WAL first
    /// -- but only once the skip-list insert actually succeeds, so a
    /// [`SetOutcome::Conflict`] never leaves a phantom WAL record for a row
    /// that was never stored. `memtable_lock` makes the seq assignment, WAL
    /// append, and skip-list insert indivisible with respect to other
    /// writers; `switch_lock` (read-held) keeps "active memtable" stable for
    /// the duration against a concurrent freeze.
    fn append(
        &self,
        content: &[u8],
        value: Option<&[u8]>,
        trx_id: u32,
    ) -> Result<(u64, Arc<Memtable>, SetOutcome), HostError> {
        let _mem_guard = self.memtable_lock.lock().unwrap();
        let switch = self.switch_lock.read().unwrap();
        let seq = self.next_seq();

        let outcome = match value {
            Some(v) => switch.active.put(content.to_vec(), v.to_vec(), seq, trx_id),
            None => switch.active.delete(content.to_vec(), seq, trx_id),
        };

        if matches!(outcome, SetOutcome::Inserted | SetOutcome::Updated) {
            let op_type = if value.is_some() { OpType::Put } else { OpType::Delete };
            let key = MVCCKey::new(content.to_vec(), seq, op_type, trx_id);
            let payload = value.unwrap_or(&[]);
            {
                let mut wal = self.wal_writer.lock().unwrap();
                wal.append(&key, payload).map_err(|e| HostError::Wal(e.to_string()))?;
            }
            let delta = key.byte_size() as i64 + payload.len() as i64 + 16;
            switch.active.increase_bytes_size(delta);
        }

        let active = switch.active.clone();
        let active_bytes = active.bytes_size();
        drop(switch);

        if matches!(outcome, SetOutcome::Inserted | SetOutcome::Updated)
            && active_bytes >= self.config.memtable_size_bytes as usize
        {
            let _ = self.freeze_tx.try_send(());
        }

        Ok((seq, active, outcome))
    }
}
