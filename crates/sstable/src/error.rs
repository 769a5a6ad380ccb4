use crate::iblock::IBlockError;
use crate::row::RowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SstError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("row record error: {0}")]
    Row(#[from] RowError),

    #[error("block index error: {0}")]
    IBlock(#[from] IBlockError),

    #[error("malformed SST filename: {0}")]
    InvalidFilename(String),

    #[error("bad magic bytes in SST file")]
    BadMagic,

    #[error("refusing to overwrite existing table at {0}")]
    AlreadyExists(std::path::PathBuf),

    #[error("cannot dump an empty memtable to an SST")]
    EmptyTable,
}
