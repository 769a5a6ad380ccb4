//! Version and metadata registry sitting between the memtable pipeline and
//! on-disk tables.
//!
//! [`Storage`] owns the single current [`Version`] and hands out
//! reference-counted snapshots of it to readers; [`Meta`] tracks the small
//! amount of state (WAL sequence/checkpoint, next table sequence) that has
//! to survive a restart but does not belong inside a version snapshot.

mod meta;
mod version;

pub use meta::{Meta, META_BACKUPS};
pub use version::{SstHandle, Storage, Version, VersionError};
