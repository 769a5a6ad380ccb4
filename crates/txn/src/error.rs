#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("sstable error: {0}")]
    Sst(#[from] sstable::SstError),

    #[error(transparent)]
    Host(#[from] crate::host::HostError),

    #[error("transaction {0} timed out waiting for a row lock held by {1}")]
    LockTimeout(u32, u32),

    #[error("transaction {0} was rolled back after a timeout and must not be reused")]
    NeedsRollback(u32),

    #[error("unknown transaction {0}")]
    UnknownTransaction(u32),
}
