//! # Engine — storage orchestrator
//!
//! Ties together the [`memtable`], [`wal`], [`sstable`], [`storage`], and
//! [`txn`] crates into a complete, transactional LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Db                                │
//! │                                                            │
//! │  api.rs   → StartTransaction/WithTransaction/Put/Get/...  │
//! │               |                                            │
//! │               v                                            │
//! │  host_impl.rs → seq assign + WAL append + skip-list insert │
//! │               |        (txn::MutationHost)                │
//! │               |  (active memtable oversized?)              │
//! │               v                                            │
//! │  workers.rs → freeze worker  → frozen memtable             │
//! │            → collect worker → immutable memtable           │
//! │            → flush worker   → new L0 SST, version bump     │
//! │            → compact worker → merged next-level SST        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locks
//!
//! - `switch_lock` (RwLock over [`MemtableState`]): read-held during every
//!   client write/commit/rollback so the identity of "active memtable" is
//!   stable for the duration of the call; write-held only during the
//!   freeze swap, the collector's frozen→immutable promotion, and a
//!   flush/compaction's version publish.
//! - `memtable_lock` (plain `Mutex`): makes seq assignment atomic with the
//!   WAL append and skip-list insert that use it, so two writers can never
//!   interleave a WAL record out of seq order.
//! - the version lock lives inside [`storage::Storage`].
//!
//! ## Crash safety
//!
//! Every Put/Delete is appended to the WAL before it is visible in the
//! active memtable's skip list. A [`storage::Version`] only ever changes
//! by copy-on-write, persisted through an atomic rename, so a crash mid
//! flush or compaction leaves either the old version or the new one, never
//! a half-written one.

mod api;
mod compact;
mod error;
mod flush;
mod host_impl;
mod open;
mod workers;

pub use error::EngineError;
pub use txn::{IsoLevel, Transaction, TransactionOptions};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use config::Config;
use memtable::Memtable;
use storage::{Meta, Storage};
use txn::TransactionSet;
use wal::WalWriter;

/// Bound on the freeze/collect/flush/compact signal channels, matching the
/// source's fixed-size `chan int` buffers.
const WORKER_CHANNEL_CAPACITY: usize = 16;

/// The memtable pipeline at a single instant: one mutable active memtable,
/// and the frozen/immutable memtables still being drained toward disk.
/// Both lists are oldest-first; scan `.iter().rev()` to check newest first.
pub(crate) struct MemtableState {
    pub(crate) active: Arc<Memtable>,
    pub(crate) frozen: Vec<Arc<Memtable>>,
    pub(crate) immutable: Vec<Arc<Memtable>>,
}

pub(crate) struct DbInner {
    pub(crate) config: Config,
    pub(crate) work_dir: PathBuf,
    pub(crate) switch_lock: RwLock<MemtableState>,
    pub(crate) memtable_lock: Mutex<()>,
    pub(crate) wal_writer: Mutex<WalWriter>,
    pub(crate) storage: Arc<Storage>,
    pub(crate) meta: Mutex<Meta>,
    pub(crate) seq: AtomicU64,
    pub(crate) table_seq: AtomicU64,
    pub(crate) shutdown: AtomicBool,
    pub(crate) freeze_tx: crossbeam_channel::Sender<()>,
    pub(crate) freeze_rx: crossbeam_channel::Receiver<()>,
    pub(crate) collect_tx: crossbeam_channel::Sender<()>,
    pub(crate) collect_rx: crossbeam_channel::Receiver<()>,
    pub(crate) flush_tx: crossbeam_channel::Sender<()>,
    pub(crate) flush_rx: crossbeam_channel::Receiver<()>,
    pub(crate) compact_tx: crossbeam_channel::Sender<()>,
    pub(crate) compact_rx: crossbeam_channel::Receiver<()>,
    /// Set once, after `DbInner` itself is behind an `Arc`, so the
    /// transaction set can hold a `dyn MutationHost` pointing back at it.
    pub(crate) trx_set: std::sync::OnceLock<Arc<TransactionSet>>,
}

impl DbInner {
    pub(crate) fn trx_set(&self) -> &Arc<TransactionSet> {
        self.trx_set.get().expect("trx_set initialized during Db::open")
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, std::sync::atomic::Ordering::AcqRel) + 1
    }

    pub(crate) fn wal_path(&self) -> PathBuf {
        self.work_dir.join("wal.log")
    }
}

/// A handle to an open database. Cheap to clone (internally `Arc`-backed);
/// background workers hold their own clone of the inner state and are
/// joined by [`Db::close`].
pub struct Db {
    inner: Arc<DbInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let switch = self.inner.switch_lock.read().unwrap();
        f.debug_struct("Db")
            .field("work_dir", &self.inner.work_dir)
            .field("seq", &self.inner.seq.load(std::sync::atomic::Ordering::Acquire))
            .field("active_bytes", &switch.active.bytes_size())
            .field("frozen_count", &switch.frozen.len())
            .field("immutable_count", &switch.immutable.len())
            .field("active_transactions", &self.inner.trx_set().active_count())
            .finish()
    }
}

/// Best-effort flush on drop: data not yet flushed stays safe in the WAL
/// and is recovered on the next `Db::open`, but we still signal the
/// background workers to stop so the process doesn't leak threads.
impl Drop for Db {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, std::sync::atomic::Ordering::Release);
        for _ in 0..4 {
            let _ = self.inner.freeze_tx.try_send(());
            let _ = self.inner.collect_tx.try_send(());
            let _ = self.inner.flush_tx.try_send(());
            let _ = self.inner.compact_tx.try_send(());
        }
        if let Ok(mut workers) = self.workers.lock() {
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests;
