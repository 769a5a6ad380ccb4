//! Process-level bookkeeping that survives restarts: which WAL sequence and
//! table sequence to resume from, and where the WAL reader should seek to.
//!
//! Stored as small JSON files named `meta%010d`, with a `current` pointer
//! file naming the latest one and up to [`META_BACKUPS`] older generations
//! kept around as a safety margin against a torn write mid-rotation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::version::VersionError;

pub const META_BACKUPS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Meta {
    pub meta_version: u64,
    pub work_dir: String,
    pub wal_seq: u64,
    pub wal_check_point: u64,
    pub sstable_seq: u64,
}

impl Meta {
    pub fn new(work_dir: impl Into<String>) -> Self {
        Meta {
            meta_version: 1,
            work_dir: work_dir.into(),
            wal_seq: 0,
            wal_check_point: 0,
            sstable_seq: 1,
        }
    }

    fn file_name(generation: u64) -> String {
        format!("meta{:010}", generation)
    }

    /// Loads the metadata named by `work_dir/current`, or builds a fresh
    /// one rooted at `work_dir` if no metadata has ever been written.
    pub fn load(work_dir: impl AsRef<Path>) -> Result<Self, VersionError> {
        let work_dir = work_dir.as_ref();
        let pointer = work_dir.join("current");
        let Ok(name) = fs::read_to_string(&pointer) else {
            return Ok(Meta::new(work_dir.to_string_lossy().into_owned()));
        };
        let path = work_dir.join(name.trim());
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes this generation out, advances `current` to point at it, and
    /// prunes generations older than [`META_BACKUPS`].
    pub fn flush(&self, work_dir: impl AsRef<Path>) -> Result<(), VersionError> {
        let work_dir = work_dir.as_ref();
        let generation = self.meta_version;
        let name = Self::file_name(generation);
        let path = work_dir.join(&name);
        fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        fs::write(work_dir.join("current"), &name)?;

        if generation > META_BACKUPS as u64 {
            let stale = generation - META_BACKUPS as u64;
            let stale_path = work_dir.join(Self::file_name(stale));
            let _ = fs::remove_file(stale_path);
        }
        Ok(())
    }

    /// Returns the next generation of this metadata, bumping `meta_version`.
    pub fn next(&self) -> Self {
        Meta {
            meta_version: self.meta_version + 1,
            ..self.clone()
        }
    }

    pub fn path_for(&self, work_dir: impl AsRef<Path>) -> PathBuf {
        work_dir.as_ref().join(Self::file_name(self.meta_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_fresh_meta_when_absent() {
        let dir = tempdir().unwrap();
        let meta = Meta::load(dir.path()).unwrap();
        assert_eq!(meta.meta_version, 1);
        assert_eq!(meta.sstable_seq, 1);
    }

    #[test]
    fn round_trips_through_flush_and_load() {
        let dir = tempdir().unwrap();
        let mut meta = Meta::new(dir.path().to_string_lossy().into_owned());
        meta.wal_seq = 10;
        meta.sstable_seq = 4;
        meta.flush(dir.path()).unwrap();

        let reloaded = Meta::load(dir.path()).unwrap();
        assert_eq!(reloaded, meta);
    }

    #[test]
    fn prunes_generations_older_than_backup_window() {
        let dir = tempdir().unwrap();
        let mut meta = Meta::new(dir.path().to_string_lossy().into_owned());
        for _ in 0..(META_BACKUPS as u64 + 3) {
            meta.flush(dir.path()).unwrap();
            meta = meta.next();
        }
        let oldest = dir.path().join(Meta::file_name(1));
        assert!(!oldest.exists());
    }
}
