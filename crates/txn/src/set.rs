//! Registry of live transactions: allocates monotonic transaction ids,
//! tracks every in-flight [`Transaction`], and sweeps ones that have sat
//! past their timeout without committing or rolling back.
//!
//! Commit/rollback releases a transaction's pinned version *exactly once*:
//! [`Transaction::commit`]/[`Transaction::rollback`] release it themselves,
//! as the very last step of publishing or undoing the transaction's writes,
//! and this set must not release it again afterward. The source this is
//! modeled on released it twice -- once inside the transaction's own
//! commit/rollback, again in the transaction-set wrapper that called it --
//! which is corrected here by keeping version release solely on the
//! transaction's side of the seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mvcc::IsoLevel;

use crate::error::TxnError;
use crate::host::MutationHost;
use crate::transaction::Transaction;

pub struct TransactionSet {
    host: Arc<dyn MutationHost>,
    next_trx_id: AtomicU32,
    transactions: Mutex<HashMap<u32, Arc<Transaction>>>,
    default_iso_level: IsoLevel,
    timeout: Duration,
}

impl TransactionSet {
    pub fn new(host: Arc<dyn MutationHost>, default_iso_level: IsoLevel, timeout: Duration) -> Self {
        TransactionSet {
            host,
            next_trx_id: AtomicU32::new(1),
            transactions: Mutex::new(HashMap::new()),
            default_iso_level,
            timeout,
        }
    }

    pub fn start_transaction(&self, iso_level: Option<IsoLevel>) -> Arc<Transaction> {
        let trx_id = self.next_trx_id.fetch_add(1, Ordering::AcqRel);
        let trx = Arc::new(Transaction::new(
            self.host.clone(),
            trx_id,
            iso_level.unwrap_or(self.default_iso_level),
            self.timeout,
            Instant::now(),
        ));
        self.transactions.lock().unwrap().insert(trx_id, trx.clone());
        trx
    }

    pub fn get_transaction(&self, trx_id: u32) -> Option<Arc<Transaction>> {
        self.transactions.lock().unwrap().get(&trx_id).cloned()
    }

    fn take_transaction(&self, trx_id: u32) -> Result<Arc<Transaction>, TxnError> {
        self.transactions
            .lock()
            .unwrap()
            .remove(&trx_id)
            .ok_or(TxnError::UnknownTransaction(trx_id))
    }

    pub fn commit_transaction(&self, trx: &Arc<Transaction>) -> Result<(), TxnError> {
        self.take_transaction(trx.id())?;
        // `Transaction::commit` releases the pinned version itself; this
        // set must not release it a second time.
        trx.commit();
        Ok(())
    }

    pub fn commit_transaction_by_id(&self, trx_id: u32) -> Result<(), TxnError> {
        let trx = self.get_transaction(trx_id).ok_or(TxnError::UnknownTransaction(trx_id))?;
        self.commit_transaction(&trx)
    }

    pub fn rollback_transaction(&self, trx: &Arc<Transaction>) -> Result<(), TxnError> {
        self.take_transaction(trx.id())?;
        trx.rollback();
        Ok(())
    }

    pub fn rollback_transaction_by_id(&self, trx_id: u32) -> Result<(), TxnError> {
        let trx = self.get_transaction(trx_id).ok_or(TxnError::UnknownTransaction(trx_id))?;
        self.rollback_transaction(&trx)
    }

    /// Runs `f` inside a fresh transaction, committing on success and
    /// rolling back on any error -- mirroring the source's `WithTransaction`.
    pub fn with_transaction<T>(
        &self,
        iso_level: Option<IsoLevel>,
        f: impl FnOnce(&Transaction) -> Result<T, TxnError>,
    ) -> Result<T, TxnError> {
        let trx = self.start_transaction(iso_level);
        match f(&trx) {
            Ok(value) => {
                self.commit_transaction(&trx)?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.rollback_transaction(&trx);
                Err(err)
            }
        }
    }

    /// Rolls back every transaction that has sat past its timeout without
    /// committing or rolling back. Intended to be called roughly once per
    /// second by the host's background worker.
    pub fn sweep_timeouts(&self) {
        let expired: Vec<Arc<Transaction>> = {
            let transactions = self.transactions.lock().unwrap();
            transactions
                .values()
                .filter(|t| t.needs_rollback())
                .cloned()
                .collect()
        };
        for trx in expired {
            let _ = self.rollback_transaction(&trx);
        }
    }

    pub fn active_count(&self) -> usize {
        self.transactions.lock().unwrap().len()
    }
}
