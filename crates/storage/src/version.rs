//! Versions: immutable, copy-on-write snapshots of the on-disk levels.
//!
//! A [`Version`] is never mutated after publication. Changing anything about
//! the database's level structure — a new L0 table after a flush, a
//! compacted level after a merge — means building a brand new `Version` and
//! swapping it into [`Storage`] under the version lock. Every in-flight
//! [`Version`] a transaction is reading from stays exactly as it was handed
//! out, even while newer versions are published underneath it.
//!
//! Table lifetime is reference-counted per version: a table can be named by
//! more than one published `Version` at once (most tables simply carry over
//! unchanged from one version to the next), and a table marked for deletion
//! by compaction is only unlinked once every version that still names it has
//! been released.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sstable::SstReader;

/// A single on-disk table plus the bookkeeping `Storage` needs to decide
/// when it is safe to unlink.
pub struct SstHandle {
    reader: SstReader,
    path: PathBuf,
    level: usize,
    seq: u64,
    /// Number of currently published versions that name this table in
    /// their `levels`. Incremented when a version naming this table is
    /// published, decremented when such a version is released.
    version_refcount: AtomicUsize,
    /// Set once compaction has decided this table is superseded. A table
    /// is only unlinked once this is true AND `version_refcount` is zero.
    marked_for_deletion: AtomicBool,
}

impl SstHandle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VersionError> {
        let path = path.as_ref().to_path_buf();
        let reader = SstReader::open(&path)?;
        let level = reader.level();
        let seq = reader.seq();
        Ok(SstHandle {
            reader,
            path,
            level,
            seq,
            version_refcount: AtomicUsize::new(0),
            marked_for_deletion: AtomicBool::new(false),
        })
    }

    pub fn reader(&self) -> &SstReader {
        &self.reader
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn mark_for_deletion(&self) {
        self.marked_for_deletion.store(true, Ordering::Release);
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion.load(Ordering::Acquire)
    }

    /// Unlinks the backing file. Callers must only call this once the
    /// table's `version_refcount` has reached zero.
    fn remove_file(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Errors raised while loading or persisting version/table state.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("sstable error: {0}")]
    Sst(#[from] sstable::SstError),

    #[error("malformed version.json: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk shape of `version.json` (§6 of the version-manifest contract):
/// every level's table filenames, the filenames still pending deletion, and
/// the WAL offset up to which the levels plus captured memtables account
/// for every durable record.
#[derive(Debug, Serialize, Deserialize)]
struct VersionJson {
    levels: Vec<Vec<String>>,
    tables_to_delete: Vec<String>,
    wal_offset: u64,
}

/// An immutable snapshot of `{levels, tables_to_delete, wal_offset}`.
///
/// Memtables (active/frozen/immutable) are NOT part of a `Version` — they
/// live directly on the `Db` orchestrator and are read in addition to, not
/// through, a version's levels. A `Version` only ever describes on-disk
/// state, which is exactly what needs a consistent point-in-time view across
/// a background flush or compaction.
pub struct Version {
    pub levels: Vec<Vec<std::sync::Arc<SstHandle>>>,
    pub tables_to_delete: Vec<std::sync::Arc<SstHandle>>,
    pub wal_offset: u64,
    reader_refs: AtomicUsize,
}

impl Version {
    pub fn empty(n_levels: usize) -> Self {
        Version {
            levels: vec![Vec::new(); n_levels],
            tables_to_delete: Vec::new(),
            wal_offset: 0,
            reader_refs: AtomicUsize::new(0),
        }
    }

    /// Builds a new version by cloning `self`'s level structure (tables are
    /// shared via `Arc`, not copied) so the caller can append/replace
    /// individual levels without disturbing `self`.
    pub fn cow(&self) -> Self {
        Version {
            levels: self.levels.clone(),
            tables_to_delete: self.tables_to_delete.clone(),
            wal_offset: self.wal_offset,
            reader_refs: AtomicUsize::new(0),
        }
    }

    /// Highest `seq` recorded on disk across every level, used to resume
    /// the table-sequence counter after a restart.
    pub fn max_table_seq(&self) -> u64 {
        self.levels
            .iter()
            .flatten()
            .map(|t| t.seq())
            .max()
            .unwrap_or(0)
    }

    fn to_json(&self) -> VersionJson {
        VersionJson {
            levels: self
                .levels
                .iter()
                .map(|level| {
                    level
                        .iter()
                        .map(|t| t.path().file_name().unwrap().to_string_lossy().into_owned())
                        .collect()
                })
                .collect(),
            tables_to_delete: self
                .tables_to_delete
                .iter()
                .map(|t| t.path().file_name().unwrap().to_string_lossy().into_owned())
                .collect(),
            wal_offset: self.wal_offset,
        }
    }
}

/// The version registry: owns the current [`Version`], ref-counts it per
/// reader, and defers deleting a table until no published version still
/// names it.
pub struct Storage {
    work_dir: PathBuf,
    current: Mutex<std::sync::Arc<Version>>,
}

impl Storage {
    /// Loads `version.json` (falling back to the `.bak` rotation, then to
    /// an empty version) and opens every table it names.
    pub fn open(work_dir: impl Into<PathBuf>, n_levels: usize) -> Result<Self, VersionError> {
        let work_dir = work_dir.into();
        let version = Self::load_version(&work_dir, n_levels)?;
        let version = std::sync::Arc::new(version);
        // The current slot itself holds an implicit reader pin, released in
        // `set_version` when this version is superseded. Without it, a
        // version that is replaced before any transaction ever reads it
        // would never run its table-refcount decrement.
        version.reader_refs.fetch_add(1, Ordering::AcqRel);
        let storage = Storage {
            work_dir,
            current: Mutex::new(version),
        };
        storage.persist_current()?;
        Ok(storage)
    }

    fn load_version(work_dir: &Path, n_levels: usize) -> Result<Version, VersionError> {
        let primary = work_dir.join("version.json");
        let backup = work_dir.join("version.json.bak");

        let json = match fs::read(&primary) {
            Ok(bytes) => Some(bytes),
            Err(_) => fs::read(&backup).ok(),
        };

        let Some(bytes) = json else {
            return Ok(Version::empty(n_levels));
        };

        let parsed: VersionJson = serde_json::from_slice(&bytes)?;
        let mut levels = Vec::with_capacity(parsed.levels.len().max(n_levels));
        for level_names in &parsed.levels {
            let mut level = Vec::with_capacity(level_names.len());
            for name in level_names {
                let handle = std::sync::Arc::new(SstHandle::open(work_dir.join(name))?);
                handle.version_refcount.fetch_add(1, Ordering::AcqRel);
                level.push(handle);
            }
            levels.push(level);
        }
        while levels.len() < n_levels {
            levels.push(Vec::new());
        }

        // Tables still pending deletion from a prior run have no live reader
        // anywhere (no process survives a restart holding a `Version`), so
        // they are immediately eligible: open them, mark them, and let the
        // very first `release_version` (triggered by `persist_current`'s
        // bookkeeping below) unlink them if they are not also in `levels`.
        let mut tables_to_delete = Vec::with_capacity(parsed.tables_to_delete.len());
        for name in &parsed.tables_to_delete {
            let path = work_dir.join(name);
            if !path.exists() {
                continue;
            }
            let handle = std::sync::Arc::new(SstHandle::open(&path)?);
            handle.mark_for_deletion();
            tables_to_delete.push(handle);
        }

        Ok(Version {
            levels,
            tables_to_delete,
            wal_offset: parsed.wal_offset,
            reader_refs: AtomicUsize::new(0),
        })
    }

    /// Atomically rotates `version.json` to `version.json.bak` and writes
    /// the current version out fresh.
    fn persist_current(&self) -> Result<(), VersionError> {
        let current = self.current.lock().unwrap().clone();
        let bytes = serde_json::to_vec_pretty(&current.to_json())?;
        let primary = self.work_dir.join("version.json");
        let backup = self.work_dir.join("version.json.bak");
        if primary.exists() {
            fs::rename(&primary, &backup)?;
        }
        fs::write(&primary, bytes)?;
        if let Ok(dir) = File::open(&self.work_dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    /// Takes a reference on the current version (called once per
    /// transaction, at start).
    pub fn get_version(&self) -> std::sync::Arc<Version> {
        let current = self.current.lock().unwrap();
        current.reader_refs.fetch_add(1, Ordering::AcqRel);
        current.clone()
    }

    /// Releases a reference taken by [`Storage::get_version`]. When the
    /// last reference on `v` drops, every table named by `v.levels` has its
    /// own per-version refcount decremented; a table whose count reaches
    /// zero while marked for deletion is unlinked from disk.
    pub fn release_version(&self, v: std::sync::Arc<Version>) {
        if v.reader_refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        for table in v.levels.iter().flatten() {
            if table.version_refcount.fetch_sub(1, Ordering::AcqRel) == 1
                && table.is_marked_for_deletion()
            {
                table.remove_file();
            }
        }
    }

    /// Publishes `new_version` as current, incrementing the per-version
    /// refcount of every table it names, and persists it to disk.
    pub fn set_version(&self, new_version: Version) -> Result<std::sync::Arc<Version>, VersionError> {
        for table in new_version.levels.iter().flatten() {
            table.version_refcount.fetch_add(1, Ordering::AcqRel);
        }
        let arc = std::sync::Arc::new(new_version);
        arc.reader_refs.fetch_add(1, Ordering::AcqRel);
        let old = {
            let mut current = self.current.lock().unwrap();
            std::mem::replace(&mut *current, arc.clone())
        };
        self.persist_current()?;
        // Release the superseded version's implicit current-slot pin. If no
        // transaction ever took a reader pin on it, this is the only
        // release it gets, and runs its table-refcount decrement now.
        self.release_version(old);
        Ok(arc)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn current(&self) -> std::sync::Arc<Version> {
        self.current.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvcc::{Element, MVCCKey, OpType};
    use tempfile::tempdir;

    fn dump(dir: &Path, level: usize, seq: u64, content: &[u8]) -> PathBuf {
        let rows = vec![Element::new(
            MVCCKey::new(content.to_vec(), 1, OpType::Put, 0),
            b"v".to_vec(),
        )];
        sstable::dump_table(dir, level, seq, &rows, 4, 4096).unwrap()
    }

    #[test]
    fn opens_empty_when_no_version_file() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path(), 7).unwrap();
        assert_eq!(storage.current().levels.len(), 7);
        assert!(dir.path().join("version.json").exists());
    }

    #[test]
    fn set_version_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path(), 3).unwrap();
        dump(dir.path(), 0, 1, b"a");
        let handle = std::sync::Arc::new(SstHandle::open(dir.path().join("00L0000000001.sst")).unwrap());
        let mut nv = storage.current().cow();
        nv.levels[0].push(handle);
        nv.wal_offset = 42;
        storage.set_version(nv).unwrap();

        let reopened = Storage::open(dir.path(), 3).unwrap();
        assert_eq!(reopened.current().levels[0].len(), 1);
        assert_eq!(reopened.current().wal_offset, 42);
    }

    #[test]
    fn table_is_deleted_only_after_last_version_releases_it() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path(), 1).unwrap();
        dump(dir.path(), 0, 1, b"a");
        let handle = std::sync::Arc::new(SstHandle::open(dir.path().join("00L0000000001.sst")).unwrap());

        let mut v1 = storage.current().cow();
        v1.levels[0].push(handle.clone());
        let v1 = storage.set_version(v1).unwrap();
        let reader1 = storage.get_version();

        let mut v2 = storage.current().cow();
        v2.levels[0].clear();
        handle.mark_for_deletion();
        v2.tables_to_delete.push(handle.clone());
        storage.set_version(v2).unwrap();

        // v1 still references the table; it must survive.
        assert!(handle.path().exists());
        storage.release_version(v1.clone());
        storage.release_version(reader1);
        assert!(!handle.path().exists());
    }
}
