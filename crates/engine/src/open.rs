//! `Db::open`: loads metadata and the version registry, replays the WAL
//! tail that hasn't yet been folded into an SST, and starts the four
//! background workers.
//!
//! ## Recovery steps
//!
//! 1. Load [`storage::Meta`] (or start fresh if this is a new database).
//! 2. Load [`storage::Storage`]'s current [`storage::Version`] -- its
//!    `wal_offset` marks how much of the log is already durable on disk.
//! 3. Build a fresh active memtable and replay the WAL from that offset
//!    into it; every replayed record is necessarily already committed
//!    (the wire format never carries an in-flight `trx_id`).
//! 4. Reopen the WAL for appending, positioned past whatever was on disk
//!    before this open (append-mode preserves the bytes; only the logical
//!    cursor needs correcting).
//! 5. Resume the seq and table-seq counters from whichever of the replay
//!    and the persisted metadata is higher.

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use config::Config;
use memtable::Memtable;
use mvcc::OpType;
use storage::{Meta, Storage};
use txn::{MutationHost, TransactionSet};
use wal::{WalReader, WalWriter};

use crate::error::EngineError;
use crate::workers;
use crate::{Db, DbInner, MemtableState, WORKER_CHANNEL_CAPACITY};

impl Db {
    pub fn open(config: Config) -> Result<Db, EngineError> {
        fs::create_dir_all(&config.work_dir)?;

        let meta = Meta::load(&config.work_dir)?;
        let storage = Arc::new(Storage::open(&config.work_dir, config.levels)?);
        let version = storage.current();

        let active = Arc::new(Memtable::new());
        let wal_path = config.work_dir.join("wal.log");
        let mut max_replayed_seq = 0u64;
        if wal_path.exists() {
            let mut reader = WalReader::open(&wal_path)?;
            reader.seek(version.wal_offset)?;
            reader.replay(|key, value| {
                match key.op_type {
                    OpType::Put => {
                        active.put(key.content.clone(), value, key.seq, 0);
                    }
                    OpType::Delete => {
                        active.delete(key.content.clone(), key.seq, 0);
                    }
                    _ => {}
                }
                max_replayed_seq = max_replayed_seq.max(key.seq);
            })?;
        }

        let existing_len = fs::metadata(&wal_path).map(|m| m.len()).unwrap_or(0);
        let mut wal_writer = WalWriter::create(&wal_path, config.wal_sync)?;
        wal_writer.set_offset(existing_len);

        let table_seq_start = meta.sstable_seq.max(version.max_table_seq() + 1);
        let seq_start = meta.wal_seq.max(max_replayed_seq);

        let (freeze_tx, freeze_rx) = crossbeam_channel::bounded(WORKER_CHANNEL_CAPACITY);
        let (collect_tx, collect_rx) = crossbeam_channel::bounded(WORKER_CHANNEL_CAPACITY);
        let (flush_tx, flush_rx) = crossbeam_channel::bounded(WORKER_CHANNEL_CAPACITY);
        let (compact_tx, compact_rx) = crossbeam_channel::bounded(WORKER_CHANNEL_CAPACITY);

        let inner = Arc::new(DbInner {
            work_dir: config.work_dir.clone(),
            switch_lock: RwLock::new(MemtableState {
                active,
                frozen: Vec::new(),
                immutable: Vec::new(),
            }),
            memtable_lock: Mutex::new(()),
            wal_writer: Mutex::new(wal_writer),
            storage,
            meta: Mutex::new(meta),
            seq: AtomicU64::new(seq_start),
            table_seq: AtomicU64::new(table_seq_start),
            shutdown: AtomicBool::new(false),
            freeze_tx,
            freeze_rx,
            collect_tx,
            collect_rx,
            flush_tx,
            flush_rx,
            compact_tx,
            compact_rx,
            trx_set: std::sync::OnceLock::new(),
            config: config.clone(),
        });

        let trx_set = Arc::new(TransactionSet::new(
            inner.clone() as Arc<dyn MutationHost>,
            config.default_isolation_level,
            Duration::from_secs(config.trx_timeout_seconds),
        ));
        inner
            .trx_set
            .set(trx_set)
            .unwrap_or_else(|_| unreachable!("trx_set is only ever set once, here"));

        let workers = vec![
            spawn(&inner, workers::freeze_worker),
            spawn(&inner, workers::collect_worker),
            spawn(&inner, workers::flush_worker),
            spawn(&inner, workers::compact_worker),
        ];

        Ok(Db {
            inner,
            workers: Mutex::new(workers),
        })
    }
}

fn spawn(
    inner: &Arc<DbInner>,
    f: fn(Arc<DbInner>),
) -> std::thread::JoinHandle<()> {
    let inner = inner.clone();
    std::thread::spawn(move || f(inner))
}
