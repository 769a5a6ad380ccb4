//! # Bloom filter
//!
//! A space-efficient probabilistic set used by every SSTable to answer
//! "is this key definitely absent?" without touching disk.
//!
//! Sizing departs from the textbook `m`/`k` formula on purpose: `m` is
//! `log2` of the bit count (so the bit array is always a power of two,
//! addressable with a mask) and `k` is a small fixed hash-function count
//! rather than something derived from a target false-positive rate. Each
//! of the `k` positions comes from a distinct entry in a fixed pool of
//! non-cryptographic string hashes (ported from a well-known C hash-function
//! survey) instead of double-hashing a single pair -- cheap to compute, and
//! with an 11-function pool there is plenty of independence for a filter
//! whose whole job is shaving disk seeks, not resisting adversarial input.
//!
//! ## Wire format
//!
//! ```text
//! [k: u8][counter: u64 LE][bits: [u64; 2^(m-6)] BE words]
//! ```
//!
//! `counter` is the number of keys ever inserted; it round-trips for
//! diagnostics but plays no role in membership queries. `m` is not stored
//! directly -- it is recovered on load as `log2` of the word count.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 4);
//! bf.insert(b"hello");
//! assert!(bf.may_contain(b"hello"));
//! ```

use std::io::{self, Read, Write};

/// Default number of hash functions applied per key.
pub const DEFAULT_K: usize = 4;

/// A frozen-size bloom filter with `2^m` bits and `k` hash functions.
pub struct BloomFilter {
    bits: Vec<u64>,
    m: u32,
    k: usize,
    counter: u64,
}

impl BloomFilter {
    /// Allocates a filter sized for roughly `expected_items` keys, with `k`
    /// hash functions (capped by the size of the hash pool).
    ///
    /// `m` is chosen as `max(ceil(log2(expected_items)), 7)` bits.
    pub fn new(expected_items: usize, k: usize) -> Self {
        let bits_log2 = (usize::BITS - expected_items.max(1).leading_zeros()) as u32;
        Self::with_bit_log2(bits_log2.max(7), k)
    }

    /// Allocates a filter with an explicit `2^m`-bit array.
    pub fn with_bit_log2(m: u32, k: usize) -> Self {
        let m = m.max(6);
        let k = k.min(HASH_POOL.len()).max(1);
        let word_count = 1usize << (m - 6);
        BloomFilter {
            bits: vec![0u64; word_count],
            m,
            k,
            counter: 0,
        }
    }

    /// Number of keys inserted so far. Round-trips through persistence but
    /// plays no role in membership queries.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.counter
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counter == 0
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    fn mask(&self) -> u64 {
        if self.m >= 64 {
            u64::MAX
        } else {
            (1u64 << self.m) - 1
        }
    }

    fn positions<'a>(&'a self, key: &'a [u8]) -> impl Iterator<Item = u64> + 'a {
        let mask = self.mask();
        HASH_POOL[..self.k].iter().map(move |h| h(key) & mask)
    }

    /// Hashes `key` with each of the `k` pool functions and sets those bits.
    pub fn insert(&mut self, key: &[u8]) {
        let bits: Vec<u64> = self.positions(key).collect();
        for bit in bits {
            self.bits[(bit >> 6) as usize] |= 1 << (bit & 0x3f);
        }
        self.counter += 1;
    }

    /// Returns `false` if `key` is definitely absent; `true` means "maybe present".
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.positions(key)
            .all(|bit| self.bits[(bit >> 6) as usize] & (1 << (bit & 0x3f)) != 0)
    }

    /// Serialized size in bytes: `1 (k) + 8 (counter) + 8 * bits.len()`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        1 + 8 + self.bits.len() * 8
    }

    /// Writes `u8 k | u64 counter (LE) | bits (BE u64 words)`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[self.k as u8])?;
        w.write_all(&self.counter.to_le_bytes())?;
        for word in &self.bits {
            w.write_all(&word.to_be_bytes())?;
        }
        Ok(())
    }

    /// Reads the format written by [`BloomFilter::write_to`].
    ///
    /// `m` is recovered as `log2` of the word count.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut k_byte = [0u8; 1];
        r.read_exact(&mut k_byte)?;
        let k = k_byte[0] as usize;

        let mut counter_bytes = [0u8; 8];
        r.read_exact(&mut counter_bytes)?;
        let counter = u64::from_le_bytes(counter_bytes);

        let mut rest = Vec::new();
        r.read_to_end(&mut rest)?;
        if rest.len() % 8 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bloom filter bit section is not word-aligned",
            ));
        }
        let word_count = rest.len().max(1) / 8;
        let m = 6 + (usize::BITS - 1 - word_count.max(1).leading_zeros());

        let mut bits = Vec::with_capacity(word_count);
        for chunk in rest.chunks_exact(8) {
            bits.push(u64::from_be_bytes(chunk.try_into().unwrap()));
        }
        if bits.is_empty() {
            bits.push(0);
        }
        Ok(BloomFilter {
            bits,
            m,
            k,
            counter,
        })
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("m", &self.m)
            .field("k", &self.k)
            .field("counter", &self.counter)
            .finish()
    }
}

/// Fixed pool of non-cryptographic string hashes. Order matters: `k`
/// selects the first `k` entries, so changing `k` never reshuffles the
/// positions a smaller `k` already committed to.
pub const HASH_POOL: [fn(&[u8]) -> u64; 11] = [
    rs_hash, js_hash, pjw_hash, elf_hash, bkdr_hash, sdbm_hash, djb_hash, dek_hash, bp_hash,
    fnv_hash, ap_hash,
];

fn rs_hash(data: &[u8]) -> u64 {
    let (mut a, b): (u64, u64) = (63689, 378551);
    let mut hash: u64 = 0;
    for &byte in data {
        hash = hash.wrapping_mul(a).wrapping_add(byte as u64);
        a = a.wrapping_mul(b);
    }
    hash
}

fn js_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 1315423911;
    for &byte in data {
        hash ^= (hash << 5).wrapping_add(byte as u64).wrapping_add(hash >> 2);
    }
    hash
}

fn pjw_hash(data: &[u8]) -> u64 {
    const BITS_IN_UINT: u64 = 64;
    const THREE_QUARTERS: u64 = 48;
    const ONE_EIGHTH: u64 = 8;
    let high_bits: u64 = 0xFFFF_FFFFu64 << (BITS_IN_UINT - ONE_EIGHTH);
    let mut hash: u64 = 0;
    for &byte in data {
        hash = (hash << ONE_EIGHTH).wrapping_add(byte as u64);
        let test = hash & high_bits;
        if test != 0 {
            hash = (hash ^ (test >> THREE_QUARTERS)) & !high_bits;
        }
    }
    hash
}

fn elf_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 0;
    for &byte in data {
        hash = (hash << 4).wrapping_add(byte as u64);
        let x = hash & 0xF000_0000;
        if x != 0 {
            hash ^= x >> 24;
        }
        hash &= !x;
    }
    hash
}

fn bkdr_hash(data: &[u8]) -> u64 {
    const SEED: u64 = 131;
    let mut hash: u64 = 0;
    for &byte in data {
        hash = hash.wrapping_mul(SEED).wrapping_add(byte as u64);
    }
    hash
}

fn sdbm_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 0;
    for &byte in data {
        hash = (byte as u64)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash);
    }
    hash
}

fn djb_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &byte in data {
        hash = ((hash << 5).wrapping_add(hash)).wrapping_add(byte as u64);
    }
    hash
}

fn dek_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = data.len() as u64;
    for &byte in data {
        hash = ((hash << 5) ^ (hash >> 27)) ^ (byte as u64);
    }
    hash
}

fn bp_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 0;
    for &byte in data {
        hash = (hash << 7) ^ (byte as u64);
    }
    hash
}

fn fnv_hash(data: &[u8]) -> u64 {
    const FNV_PRIME: u64 = 0x811c_9dc5;
    let mut hash: u64 = 0;
    for &byte in data {
        hash = hash.wrapping_mul(FNV_PRIME);
        hash ^= byte as u64;
    }
    hash
}

fn ap_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xAAAA_AAAA;
    for (i, &byte) in data.iter().enumerate() {
        hash ^= if i & 1 == 0 {
            (hash << 7) ^ (byte as u64).wrapping_mul(hash >> 3)
        } else {
            !((hash << 11).wrapping_add(byte as u64) ^ (hash >> 5))
        };
    }
    hash
}

#[cfg(test)]
mod tests;
