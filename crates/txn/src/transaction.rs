//! A read/write transaction: a [`ReadView`] plus the bookkeeping needed to
//! track what it wrote, enforce the optimistic per-row lock, and publish or
//! undo those writes on commit/rollback.
//!
//! Row locking is optimistic and embedded in the key itself (`trx_id`):
//! [`skiplist::SetOutcome::Conflict`] tells a writer another transaction
//! already owns the row it's trying to write, and a separate scan of the
//! frozen/immutable memtables (mirroring the source's
//! `checkLockOnFrozenMemtables`) catches locks on rows that haven't reached
//! the active memtable yet. Either case busy-waits, bounded by
//! [`config::TRX_TIMEOUT_SECONDS`], then retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use memtable::Memtable;
use mvcc::{Element, IsoLevel, OpType};
use skiplist::SetOutcome;

use crate::error::TxnError;
use crate::host::MutationHost;
use crate::read_view::ReadView;

/// One write this transaction has made, remembered so commit can publish it
/// in place and rollback can undo it precisely.
struct TrxOpRecord {
    memtable: Arc<Memtable>,
    content: Vec<u8>,
    seq: u64,
    op_type: OpType,
}

/// How long a busy-wait on a conflicting row is allowed to run before the
/// transaction gives up and must be rolled back.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct Transaction {
    read_view: ReadView,
    trx_id: u32,
    modification_record: Mutex<Vec<TrxOpRecord>>,
    ref_tables: Mutex<Vec<Arc<Memtable>>>,
    needs_rollback: AtomicBool,
    started_at: Instant,
    timeout: Duration,
}

impl Transaction {
    pub(crate) fn new(
        host: Arc<dyn MutationHost>,
        trx_id: u32,
        iso_level: IsoLevel,
        timeout: Duration,
        started_at: Instant,
    ) -> Self {
        let read_view = ReadView::with_trx_id(host, iso_level, trx_id);
        Transaction {
            read_view,
            trx_id,
            modification_record: Mutex::new(Vec::new()),
            ref_tables: Mutex::new(Vec::new()),
            needs_rollback: AtomicBool::new(false),
            started_at,
            timeout,
        }
    }

    pub fn id(&self) -> u32 {
        self.trx_id
    }

    pub fn isolation_level(&self) -> IsoLevel {
        self.read_view.isolation_level()
    }

    pub fn needs_rollback(&self) -> bool {
        self.needs_rollback.load(Ordering::Acquire)
    }

    pub fn get(&self, content: &[u8]) -> Result<Option<Element>, TxnError> {
        self.guard_rollback()?;
        self.read_view.get(content)
    }

    pub fn exists(&self, content: &[u8]) -> Result<bool, TxnError> {
        self.guard_rollback()?;
        self.read_view.exists(content)
    }

    pub fn range(&self, start: &[u8], end: &[u8], count: usize, offset: usize) -> Result<Vec<Element>, TxnError> {
        self.guard_rollback()?;
        self.read_view.range(start, end, count, offset)
    }

    pub fn put(&self, content: &[u8], value: &[u8]) -> Result<(), TxnError> {
        self.guard_rollback()?;
        loop {
            self.check_timeout()?;
            if let Some(blocking) = self.check_frozen_lock(content)? {
                self.wait_tick(blocking)?;
                continue;
            }
            let (seq, mt, outcome) = self
                .read_view
                .host
                .append_put(content, value, self.trx_id)?;
            match outcome {
                SetOutcome::Inserted | SetOutcome::Updated => {
                    self.record_write(mt, content, seq, OpType::Put);
                    return Ok(());
                }
                SetOutcome::Conflict { blocking_trx_id } => {
                    self.wait_tick(blocking_trx_id)?;
                }
            }
        }
    }

    pub fn delete(&self, content: &[u8]) -> Result<(), TxnError> {
        self.guard_rollback()?;
        loop {
            self.check_timeout()?;
            if let Some(blocking) = self.check_frozen_lock(content)? {
                self.wait_tick(blocking)?;
                continue;
            }
            let (seq, mt, outcome) = self.read_view.host.append_delete(content, self.trx_id)?;
            match outcome {
                SetOutcome::Inserted | SetOutcome::Updated => {
                    self.record_write(mt, content, seq, OpType::Delete);
                    return Ok(());
                }
                SetOutcome::Conflict { blocking_trx_id } => {
                    self.wait_tick(blocking_trx_id)?;
                }
            }
        }
    }

    /// Publishes every write this transaction made by clearing its row
    /// lock in place, releases every memtable reference it took, and
    /// releases the version it pinned at start. Released exactly once,
    /// here -- the transaction set that dispatches to this must not
    /// release it again.
    pub(crate) fn commit(&self) {
        let records = self.modification_record.lock().unwrap();
        for rec in records.iter() {
            rec.memtable.commit_row_at(&rec.content, rec.seq, self.trx_id);
        }
        drop(records);
        self.release_ref_tables();
        self.read_view.host.storage().release_version(self.read_view.version.clone());
    }

    /// Undoes every write this transaction made by deleting the exact rows
    /// it inserted, releases refs, and releases the pinned version exactly
    /// once, same as [`Transaction::commit`].
    pub(crate) fn rollback(&self) {
        let records = self.modification_record.lock().unwrap();
        for rec in records.iter() {
            rec.memtable.remove_row(&rec.content, rec.seq, rec.op_type);
        }
        drop(records);
        self.release_ref_tables();
        self.read_view.host.storage().release_version(self.read_view.version.clone());
    }

    fn guard_rollback(&self) -> Result<(), TxnError> {
        if self.needs_rollback() {
            Err(TxnError::NeedsRollback(self.trx_id))
        } else {
            Ok(())
        }
    }

    fn check_timeout(&self) -> Result<(), TxnError> {
        if self.started_at.elapsed() > self.timeout {
            self.needs_rollback.store(true, Ordering::Release);
            return Err(TxnError::LockTimeout(self.trx_id, 0));
        }
        Ok(())
    }

    /// Mirrors the source's `checkLockOnFrozenMemtables`: a row written by
    /// another live transaction may sit in a frozen or immutable memtable,
    /// not yet visible to the active memtable's own conflict check.
    fn check_frozen_lock(&self, content: &[u8]) -> Result<Option<u32>, TxnError> {
        let snap = self.read_view.host.memtable_snapshot();
        for mt in snap.frozen.iter().rev().chain(snap.immutable.iter().rev()) {
            if let Some(blocking) = mt.conflicting_trx(content, self.trx_id) {
                mt.ref_trx(self.trx_id);
                self.ref_tables.lock().unwrap().push(mt.clone());
                return Ok(Some(blocking));
            }
        }
        Ok(None)
    }

    fn wait_tick(&self, blocking_trx_id: u32) -> Result<(), TxnError> {
        self.check_timeout().map_err(|_| TxnError::LockTimeout(self.trx_id, blocking_trx_id))?;
        std::thread::sleep(POLL_INTERVAL);
        Ok(())
    }

    fn record_write(&self, mt: Arc<Memtable>, content: &[u8], seq: u64, op_type: OpType) {
        mt.ref_trx(self.trx_id);
        self.ref_tables.lock().unwrap().push(mt.clone());
        self.modification_record.lock().unwrap().push(TrxOpRecord {
            memtable: mt,
            content: content.to_vec(),
            seq,
            op_type,
        });
    }

    fn release_ref_tables(&self) {
        let tables = self.ref_tables.lock().unwrap();
        for mt in tables.iter() {
            mt.cancel_ref(self.trx_id);
        }
    }
}
