//! The client-facing surface: standalone Put/Get/Delete/Range plus explicit
//! transaction control, all routed through [`txn::TransactionSet`].

use std::sync::Arc;

use mvcc::{Element, IsoLevel};
use txn::{MutationHost, ReadView, Transaction, TransactionOptions, TxnError};

use crate::Db;

impl Db {
    pub fn start_transaction(&self, options: TransactionOptions) -> Arc<Transaction> {
        self.inner.trx_set().start_transaction(options.isolation_level)
    }

    pub fn commit_transaction(&self, trx: &Arc<Transaction>) -> Result<(), TxnError> {
        self.inner.trx_set().commit_transaction(trx)
    }

    pub fn rollback_transaction(&self, trx: &Arc<Transaction>) -> Result<(), TxnError> {
        self.inner.trx_set().rollback_transaction(trx)
    }

    /// Runs `f` inside a fresh transaction, committing on success and
    /// rolling back on any error it returns.
    pub fn with_transaction<T>(
        &self,
        options: TransactionOptions,
        f: impl FnOnce(&Transaction) -> Result<T, TxnError>,
    ) -> Result<T, TxnError> {
        self.inner.trx_set().with_transaction(options.isolation_level, f)
    }

    /// Puts `content = value` in its own committed transaction.
    pub fn put(&self, content: &[u8], value: &[u8]) -> Result<(), TxnError> {
        self.with_transaction(TransactionOptions::default(), |trx| trx.put(content, value))
    }

    /// Deletes `content` in its own committed transaction.
    pub fn delete(&self, content: &[u8]) -> Result<(), TxnError> {
        self.with_transaction(TransactionOptions::default(), |trx| trx.delete(content))
    }

    /// Snapshot read outside of any explicit transaction, at the
    /// database's configured default isolation level.
    pub fn get(&self, content: &[u8]) -> Result<Option<Element>, TxnError> {
        self.read_view(None).get(content)
    }

    pub fn exists(&self, content: &[u8]) -> Result<bool, TxnError> {
        self.read_view(None).exists(content)
    }

    pub fn range(&self, start: &[u8], end: &[u8], count: usize, offset: usize) -> Result<Vec<Element>, TxnError> {
        self.read_view(None).range(start, end, count, offset)
    }

    fn read_view(&self, iso_level: Option<IsoLevel>) -> ReadView {
        let level = iso_level.unwrap_or(self.inner.config.default_isolation_level);
        ReadView::new(self.inner.clone() as Arc<dyn MutationHost>, level)
    }
}
