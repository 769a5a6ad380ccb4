//! Library-level tests exercised from the `cli` crate's dev-dependency on
//! `engine`/`memtable` directly, covering the WAL-replay durability story
//! and memtable behavior under a heavy write/delete workload -- the same
//! scenarios the interactive shell relies on without going through a
//! spawned subprocess.

use config::Config;
use engine::Db;
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> Db {
    let config = Config::builder().work_dir(dir).levels(3).wal_sync(true).build().unwrap();
    Db::open(config).unwrap()
}

#[test]
fn wal_replay_rebuilds_state_after_reopen() {
    let dir = tempdir().unwrap();
    {
        let db = open(dir.path());
        db.put(b"a", b"1").unwrap();
        db.delete(b"a").unwrap();
        db.put(b"b", b"2").unwrap();
    }

    let db = open(dir.path());
    assert_eq!(db.get(b"a").unwrap(), None);
    assert_eq!(db.get(b"b").unwrap().unwrap().value, b"2");
}

#[test]
fn wal_durability_without_a_clean_shutdown() {
    let dir = tempdir().unwrap();
    {
        let db = open(dir.path());
        db.put(b"k", b"v").unwrap();
        // Simulates a crash: `db` is dropped here without any extra
        // bookkeeping beyond what `Db::put` already made durable.
    }

    let db = open(dir.path());
    assert_eq!(db.get(b"k").unwrap().unwrap().value, b"v");
}

#[cfg(test)]
mod load_test {
    use memtable::Memtable;

    #[test]
    fn write_heavy_workload_keeps_one_row_per_key() {
        let mem = Memtable::new();
        let mut seq = 0u64;

        for i in 0..100_000u32 {
            seq += 1;
            let key = format!("key{}", i % 10_000).into_bytes();
            let val = vec![b'x'; 100];
            mem.put(key, val, seq, 0);
        }

        assert!(mem.len() <= 10_000);
    }

    #[test]
    fn delete_heavy_workload_ends_with_a_tombstone() {
        let mem = Memtable::new();
        let mut seq = 0u64;

        for _ in 0..10_000u32 {
            seq += 1;
            mem.put(b"k".to_vec(), b"v".to_vec(), seq, 0);
            seq += 1;
            mem.delete(b"k".to_vec(), seq, 0);
        }

        assert!(mem.get(b"k", seq, 0, Default::default()).is_none());
        assert_eq!(mem.len(), 1);
    }
}
