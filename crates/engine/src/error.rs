//! Errors surfaced by the database orchestrator itself, as distinct from
//! the per-transaction errors in [`txn::TxnError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sstable error: {0}")]
    Sst(#[from] sstable::SstError),

    #[error("storage error: {0}")]
    Storage(#[from] storage::VersionError),

    #[error("write-ahead log error: {0}")]
    Wal(#[from] wal::WalError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Txn(#[from] txn::TxnError),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}
