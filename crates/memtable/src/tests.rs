use super::*;
use mvcc::OpType;

// -------------------- Basic CRUD --------------------

#[test]
fn put_and_get_single_key() {
    let m = Memtable::new();
    m.put(b"k1".to_vec(), b"v1".to_vec(), 1, 0);
    assert_eq!(m.len(), 1);
    let got = m.get(b"k1", 10, 0, IsoLevel::ReadCommitted).unwrap();
    assert_eq!(got.key.seq, 1);
    assert_eq!(got.value, b"v1");
}

#[test]
fn put_newer_version_shadows_older() {
    let m = Memtable::new();
    m.put(b"k1".to_vec(), b"v1".to_vec(), 1, 0);
    m.put(b"k1".to_vec(), b"v2".to_vec(), 2, 0);
    let got = m.get(b"k1", 10, 0, IsoLevel::ReadCommitted).unwrap();
    assert_eq!(got.value, b"v2");
}

#[test]
fn delete_shadows_value_as_not_found() {
    let m = Memtable::new();
    m.put(b"k1".to_vec(), b"v1".to_vec(), 1, 0);
    m.delete(b"k1".to_vec(), 2, 0);
    assert!(m.get(b"k1", 10, 0, IsoLevel::ReadCommitted).is_none());
}

#[test]
fn exists_reflects_visibility() {
    let m = Memtable::new();
    m.put(b"k1".to_vec(), b"v1".to_vec(), 1, 0);
    assert!(m.exists(b"k1", 10, 0, IsoLevel::ReadCommitted));
    m.delete(b"k1".to_vec(), 2, 0);
    assert!(!m.exists(b"k1", 10, 0, IsoLevel::ReadCommitted));
}

#[test]
fn missing_key_returns_none() {
    let m = Memtable::new();
    assert!(m.get(b"nope", 10, 0, IsoLevel::ReadCommitted).is_none());
}

// -------------------- Range --------------------

#[test]
fn range_returns_ordered_unique_contents() {
    let m = Memtable::new();
    for (content, seq) in [("a", 1), ("b", 2), ("b", 5), ("c", 3)] {
        m.put(content.as_bytes().to_vec(), content.as_bytes().to_vec(), seq, 0);
    }
    let got = m.range(b"", &[0xff], 10, 0);
    let contents: Vec<_> = got.iter().map(|e| e.key.content.clone()).collect();
    assert_eq!(contents, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

// -------------------- First / Last / Iterator --------------------

#[test]
fn first_and_last_track_extremes() {
    let m = Memtable::new();
    m.put(b"b".to_vec(), b"1".to_vec(), 1, 0);
    m.put(b"a".to_vec(), b"2".to_vec(), 2, 0);
    m.put(b"c".to_vec(), b"3".to_vec(), 3, 0);
    assert_eq!(m.first().unwrap().key.content, b"a".to_vec());
    assert_eq!(m.last().unwrap().key.content, b"c".to_vec());
}

#[test]
fn iterator_covers_every_logical_row_including_tombstones() {
    let m = Memtable::new();
    m.put(b"a".to_vec(), b"1".to_vec(), 1, 0);
    m.delete(b"b".to_vec(), 2, 0);
    let all = m.iterator();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|e| e.key.content == b"a" && e.key.op_type == OpType::Put));
    assert!(all.iter().any(|e| e.key.content == b"b" && e.key.op_type == OpType::Delete));
}

// -------------------- Reference counting --------------------

#[test]
fn ref_and_cancel_ref_track_count() {
    let m = Memtable::new();
    assert_eq!(m.count_refs(), 0);
    m.ref_trx(1);
    m.ref_trx(2);
    assert_eq!(m.count_refs(), 2);
    m.cancel_ref(1);
    assert_eq!(m.count_refs(), 1);
    m.cancel_ref(1); // idempotent
    assert_eq!(m.count_refs(), 1);
}

// -------------------- Byte-size accounting --------------------

#[test]
fn increase_bytes_size_is_caller_driven() {
    let m = Memtable::new();
    assert_eq!(m.bytes_size(), 0);
    m.put(b"k".to_vec(), b"v".to_vec(), 1, 0);
    // Inserting into the index alone does not move the byte counter;
    // the caller accounts for bytes explicitly.
    assert_eq!(m.bytes_size(), 0);
    m.increase_bytes_size(25);
    assert_eq!(m.bytes_size(), 25);
    m.increase_bytes_size(-10);
    assert_eq!(m.bytes_size(), 15);
}

// -------------------- Freeze / WAL offset --------------------

#[test]
fn freeze_flips_mutability_and_is_idempotent() {
    let m = Memtable::new();
    assert!(m.is_mutable());
    m.freeze();
    assert!(!m.is_mutable());
    m.freeze();
    assert!(!m.is_mutable());
}

#[test]
fn wal_offset_round_trips() {
    let m = Memtable::new();
    assert_eq!(m.wal_offset(), 0);
    m.set_wal_offset(4096);
    assert_eq!(m.wal_offset(), 4096);
}

// -------------------- Conflict detection passthrough --------------------

#[test]
fn conflicting_trx_detects_other_transactions_uncommitted_row() {
    let m = Memtable::new();
    m.put(b"k".to_vec(), b"v".to_vec(), 1, 7);
    assert_eq!(m.conflicting_trx(b"k", 9), Some(7));
    assert_eq!(m.conflicting_trx(b"k", 7), None);
}

#[test]
fn current_trx_id_reports_newest_owner() {
    let m = Memtable::new();
    assert_eq!(m.current_trx_id(b"k"), None);
    m.put(b"k".to_vec(), b"v".to_vec(), 1, 7);
    assert_eq!(m.current_trx_id(b"k"), Some(7));
}

// -------------------- Debug --------------------

#[test]
fn debug_impl_works() {
    let m = Memtable::new();
    let debug = format!("{:?}", m);
    assert!(debug.contains("Memtable"));
}
