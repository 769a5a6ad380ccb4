//! The seam between a transaction and whatever actually owns the memtable
//! pipeline, the write-ahead log, and the version registry.
//!
//! [`Transaction`](crate::transaction::Transaction) and
//! [`ReadView`](crate::read_view::ReadView) only ever talk to a `dyn
//! MutationHost` -- they never see a WAL writer or a switch-memtable lock
//! directly. The concrete implementation (the database orchestrator) owns
//! those resources and is responsible for making [`MutationHost::append_put`]
//! / [`MutationHost::append_delete`] atomic with respect to a concurrent
//! freeze, and for keeping [`MutationHost::memtable_snapshot`] consistent
//! with whichever memtable a mutation landed in.

use std::sync::Arc;

use memtable::Memtable;
use skiplist::SetOutcome;
use storage::Storage;

/// A consistent view of the memtable pipeline at a single instant.
pub struct MemtableSnapshot {
    pub active: Arc<Memtable>,
    /// Oldest first; scan `.iter().rev()` to check newest-to-oldest.
    pub frozen: Vec<Arc<Memtable>>,
    /// Oldest first; scan `.iter().rev()` to check newest-to-oldest.
    pub immutable: Vec<Arc<Memtable>>,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("write-ahead log error: {0}")]
    Wal(String),
}

pub trait MutationHost: Send + Sync {
    fn storage(&self) -> &Arc<Storage>;

    fn memtable_snapshot(&self) -> MemtableSnapshot;

    /// Highest seq assigned so far, used to refresh a read-committed or
    /// read-uncommitted read's snapshot boundary on every call.
    fn current_seq(&self) -> u64;

    /// Assigns the next seq and durably applies a `Put` to the active
    /// memtable, as one atomic step with the WAL append.
    fn append_put(
        &self,
        content: &[u8],
        value: &[u8],
        trx_id: u32,
    ) -> Result<(u64, Arc<Memtable>, SetOutcome), HostError>;

    /// Same as [`MutationHost::append_put`] for a tombstone.
    fn append_delete(
        &self,
        content: &[u8],
        trx_id: u32,
    ) -> Result<(u64, Arc<Memtable>, SetOutcome), HostError>;
}
