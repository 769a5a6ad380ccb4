//! Snapshot reads and row-locked read/write transactions over the memtable
//! pipeline and version registry, independent of whoever actually owns the
//! WAL and the memtable swap (see [`MutationHost`]).

mod error;
mod host;
mod read_view;
mod set;
mod transaction;


pub use error::TxnError;
pub use host::{HostError, MemtableSnapshot, MutationHost};
pub use mvcc::IsoLevel;
pub use read_view::ReadView;
pub use set::TransactionSet;
pub use transaction::Transaction;

/// Configures a transaction at creation. Mirrors the source's
/// `TransactionOptions`; the default isolation level is `ReadCommitted`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    pub isolation_level: Option<IsoLevel>,
}

impl TransactionOptions {
    pub fn with_isolation_level(level: IsoLevel) -> Self {
        TransactionOptions { isolation_level: Some(level) }
    }
}
