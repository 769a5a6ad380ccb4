use super::*;
use std::io::Cursor;

// -------------------- Construction --------------------

#[test]
fn new_creates_valid_filter() {
    let bf = BloomFilter::new(100, DEFAULT_K);
    assert_eq!(bf.k(), DEFAULT_K);
    assert!(!bf.bits.is_empty());
}

#[test]
fn k_is_capped_by_hash_pool_size() {
    let bf = BloomFilter::new(100, 999);
    assert_eq!(bf.k(), HASH_POOL.len());
}

#[test]
fn k_is_at_least_one() {
    let bf = BloomFilter::new(100, 0);
    assert_eq!(bf.k(), 1);
}

// -------------------- Insert / Contains --------------------

#[test]
fn inserted_key_is_found() {
    let mut bf = BloomFilter::new(100, DEFAULT_K);
    bf.insert(b"hello");
    assert!(bf.may_contain(b"hello"));
}

#[test]
fn missing_key_is_not_found() {
    let bf = BloomFilter::new(100, DEFAULT_K);
    assert!(!bf.may_contain(b"hello"));
}

#[test]
fn many_keys_all_found() {
    let mut bf = BloomFilter::new(1000, DEFAULT_K);
    for i in 0..1000u64 {
        bf.insert(&i.to_le_bytes());
    }
    for i in 0..1000u64 {
        assert!(bf.may_contain(&i.to_le_bytes()), "key {} should be found", i);
    }
}

#[test]
fn empty_key() {
    let mut bf = BloomFilter::new(10, DEFAULT_K);
    bf.insert(b"");
    assert!(bf.may_contain(b""));
}

#[test]
fn binary_key() {
    let mut bf = BloomFilter::new(10, DEFAULT_K);
    let key = vec![0u8, 1, 2, 255, 254, 253];
    bf.insert(&key);
    assert!(bf.may_contain(&key));
}

#[test]
fn counter_tracks_insertions() {
    let mut bf = BloomFilter::new(100, DEFAULT_K);
    assert!(bf.is_empty());
    bf.insert(b"a");
    bf.insert(b"b");
    assert_eq!(bf.len(), 2);
}

#[test]
fn false_positive_rate_is_reasonable() {
    let mut bf = BloomFilter::new(1000, DEFAULT_K);
    for i in 0..1000u64 {
        bf.insert(format!("present-{i}").as_bytes());
    }
    let mut false_positives = 0;
    for i in 0..1000u64 {
        if bf.may_contain(format!("absent-{i}").as_bytes()) {
            false_positives += 1;
        }
    }
    assert!(
        false_positives < 150,
        "false positive rate too high: {false_positives}/1000"
    );
}

// -------------------- Serialization --------------------

#[test]
fn roundtrip_serialize_deserialize() {
    let mut bf = BloomFilter::new(500, DEFAULT_K);
    for i in 0..500u64 {
        bf.insert(&i.to_le_bytes());
    }

    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), bf.serialized_size());

    let mut cursor = Cursor::new(&buf);
    let bf2 = BloomFilter::read_from(&mut cursor).unwrap();

    assert_eq!(bf2.k(), bf.k());
    assert_eq!(bf2.len(), bf.len());
    for i in 0..500u64 {
        assert!(
            bf2.may_contain(&i.to_le_bytes()),
            "key {} missing after roundtrip",
            i
        );
    }
}

#[test]
fn wire_layout_is_k_then_counter_then_be_words() {
    let mut bf = BloomFilter::with_bit_log2(7, 2);
    bf.insert(b"x");

    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();

    assert_eq!(buf[0], 2u8);
    let counter = u64::from_le_bytes(buf[1..9].try_into().unwrap());
    assert_eq!(counter, 1);
    assert_eq!((buf.len() - 9) % 8, 0);
}

#[test]
fn serialized_size_is_correct() {
    let bf = BloomFilter::new(100, DEFAULT_K);
    assert_eq!(bf.serialized_size(), 1 + 8 + bf.bits.len() * 8);
}

#[test]
fn m_is_recovered_from_word_count_on_load() {
    let bf = BloomFilter::with_bit_log2(10, DEFAULT_K);
    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();

    let mut cursor = Cursor::new(buf);
    let loaded = BloomFilter::read_from(&mut cursor).unwrap();
    assert_eq!(loaded.bits.len(), bf.bits.len());
}

// -------------------- Debug --------------------

#[test]
fn debug_impl_works() {
    let bf = BloomFilter::new(100, DEFAULT_K);
    let debug = format!("{:?}", bf);
    assert!(debug.contains("BloomFilter"));
}

// -------------------- Edge cases --------------------

#[test]
fn single_item_filter() {
    let mut bf = BloomFilter::new(1, DEFAULT_K);
    bf.insert(b"only");
    assert!(bf.may_contain(b"only"));
}

#[test]
fn hash_pool_functions_are_not_all_equal() {
    let key = b"distinct-hash-probe";
    let outputs: Vec<u64> = HASH_POOL.iter().map(|h| h(key)).collect();
    let first = outputs[0];
    assert!(outputs.iter().any(|&h| h != first));
}
