//! The four background loops that drive a memtable from active to
//! on-disk, and compact the levels behind them: freeze, collect, flush,
//! compact. Each is woken by a dedicated bounded signal channel and also
//! polls on a fallback interval so work started by a freeze that fired
//! while a worker was mid-iteration is never stranded.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use memtable::Memtable;

use crate::DbInner;

const FREEZE_POLL: Duration = Duration::from_millis(200);
const COLLECT_POLL: Duration = Duration::from_secs(1);
const FLUSH_POLL: Duration = Duration::from_millis(500);
const COMPACT_POLL: Duration = Duration::from_secs(2);

pub(crate) fn freeze_worker(inner: Arc<DbInner>) {
    while !inner.shutdown.load(Ordering::Acquire) {
        let _ = inner.freeze_rx.recv_timeout(FREEZE_POLL);
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        let mut switch = inner.switch_lock.write().unwrap();
        if (switch.active.bytes_size() as u64) < inner.config.memtable_size_bytes {
            continue;
        }
        let old = switch.active.clone();
        old.freeze();
        let wal_offset = inner.wal_writer.lock().unwrap().offset();
        old.set_wal_offset(wal_offset);
        switch.frozen.push(old);
        switch.active = Arc::new(Memtable::new());
        drop(switch);

        let _ = inner.collect_tx.try_send(());
    }
}

/// Promotes frozen memtables with no outstanding transaction refs to
/// immutable, and sweeps timed-out transactions (mirrors the source's
/// `checkLockOnFrozenMemtables` cleanup cadence).
pub(crate) fn collect_worker(inner: Arc<DbInner>) {
    while !inner.shutdown.load(Ordering::Acquire) {
        let _ = inner.collect_rx.recv_timeout(COLLECT_POLL);
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        let mut promoted = false;
        {
            let mut switch = inner.switch_lock.write().unwrap();
            let mut i = 0;
            while i < switch.frozen.len() {
                if switch.frozen[i].count_refs() == 0 {
                    let mt = switch.frozen.remove(i);
                    switch.immutable.push(mt);
                    promoted = true;
                } else {
                    i += 1;
                }
            }
        }
        if promoted {
            let _ = inner.flush_tx.try_send(());
        }

        inner.trx_set().sweep_timeouts();
    }
}

pub(crate) fn flush_worker(inner: Arc<DbInner>) {
    while !inner.shutdown.load(Ordering::Acquire) {
        let _ = inner.flush_rx.recv_timeout(FLUSH_POLL);
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        loop {
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            match inner.flush_oldest_immutable() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    log::error!("memtable flush failed: {e}");
                    break;
                }
            }
        }
        let _ = inner.compact_tx.try_send(());
    }
}

pub(crate) fn compact_worker(inner: Arc<DbInner>) {
    while !inner.shutdown.load(Ordering::Acquire) {
        let _ = inner.compact_rx.recv_timeout(COMPACT_POLL);
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        loop {
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            match inner.compact_one_level() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    log::error!("compaction failed: {e}");
                    break;
                }
            }
        }
    }
}
