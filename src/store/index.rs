//! The in-memory hash index.
//!
//! Records live in 1024 insertion-ordered buckets partitioned by
//! `block_size % NUM_BUCKETS`; a Bloom filter in front of the buckets
//! answers "definitely absent" without a scan. Lookups walk one bucket
//! linearly and stop at the first record within the similarity threshold.
//!
//! The index tracks a modification counter that gates snapshot rewrites:
//! every successful write or delete increments it, and a successful sync
//! resets it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use crate::bloom::BloomFilter;
use crate::fuzzy::{FuzzyHash, LEV_LIMIT};
use crate::store::record::Record;
use crate::store::unix_now;

/// Number of hash buckets.
pub const NUM_BUCKETS: usize = 1024;

/// Number of modifications that triggers a hash file rewrite.
pub const MOD_LIMIT: u32 = 10_000;

/// Bucketed fuzzy hash store with interior mutability.
#[derive(Debug)]
pub struct HashIndex {
    buckets: Vec<RwLock<VecDeque<Record>>>,
    bloom: RwLock<BloomFilter>,
    mods: AtomicU32,
}

impl HashIndex {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(NUM_BUCKETS);
        for _ in 0..NUM_BUCKETS {
            buckets.push(RwLock::new(VecDeque::new()));
        }
        Self {
            buckets,
            bloom: RwLock::new(BloomFilter::default()),
            mods: AtomicU32::new(0),
        }
    }

    fn bucket_of(block_size: u32) -> usize {
        block_size as usize % NUM_BUCKETS
    }

    /// Whether a stored hash matches the given one within the similarity
    /// threshold. Never mutates.
    pub fn check(&self, hash: &FuzzyHash) -> bool {
        if !self.bloom.read().unwrap().maybe_contains(&hash.pipe) {
            return false;
        }

        let bucket = self.buckets[Self::bucket_of(hash.block_size)]
            .read()
            .unwrap();
        for record in bucket.iter() {
            let prob = record.hash.similarity(hash);
            if prob > LEV_LIMIT {
                tracing::info!(probability = prob, "fuzzy hash found");
                return true;
            }
        }

        tracing::debug!("fuzzy hash not found");
        false
    }

    /// Insert the hash with the current time. Returns false when the Bloom
    /// filter already claims presence (treated as "already stored").
    pub fn write(&self, hash: FuzzyHash) -> bool {
        if self.bloom.read().unwrap().maybe_contains(&hash.pipe) {
            return false;
        }

        let record = Record::new(hash, unix_now());
        self.buckets[Self::bucket_of(hash.block_size)]
            .write()
            .unwrap()
            .push_front(record);
        self.bloom.write().unwrap().add(&hash.pipe);
        self.mods.fetch_add(1, Ordering::SeqCst);
        tracing::info!("fuzzy hash added");
        true
    }

    /// Remove every stored record matching the hash. Returns true when at
    /// least one was removed.
    pub fn delete(&self, hash: &FuzzyHash) -> bool {
        if !self.bloom.read().unwrap().maybe_contains(&hash.pipe) {
            return false;
        }

        let mut bucket = self.buckets[Self::bucket_of(hash.block_size)]
            .write()
            .unwrap();
        let mut bloom = self.bloom.write().unwrap();
        let before = bucket.len();
        bucket.retain(|record| {
            if record.hash.matches(hash) {
                bloom.del(&record.hash.pipe);
                false
            } else {
                true
            }
        });

        let removed = before - bucket.len();
        if removed > 0 {
            self.mods.fetch_add(1, Ordering::SeqCst);
            tracing::info!(removed, "fuzzy hash deleted");
            true
        } else {
            false
        }
    }

    /// Insert a record as loaded from the snapshot: head insert plus Bloom
    /// add, without counting a modification.
    pub(crate) fn insert_loaded(&self, record: Record) {
        self.bloom.write().unwrap().add(&record.hash.pipe);
        self.buckets[Self::bucket_of(record.hash.block_size)]
            .write()
            .unwrap()
            .push_front(record);
    }

    /// Modifications since the last successful snapshot.
    pub fn mods(&self) -> u32 {
        self.mods.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_mods(&self) {
        self.mods.store(0, Ordering::SeqCst);
    }

    /// Push the modification counter past any limit so the next sync runs
    /// unconditionally. Used on shutdown.
    pub fn force_dirty(&self) {
        self.mods.store(MOD_LIMIT + 1, Ordering::SeqCst);
    }

    /// Total number of stored records.
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.read().unwrap().len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn buckets(&self) -> &[RwLock<VecDeque<Record>>] {
        &self.buckets
    }

    pub(crate) fn bloom(&self) -> &RwLock<BloomFilter> {
        &self.bloom
    }
}

impl Default for HashIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzy::HASH_PIPE_LEN;

    fn hash_from(byte: u8, block_size: u32) -> FuzzyHash {
        FuzzyHash::new([byte; HASH_PIPE_LEN], block_size)
    }

    #[test]
    fn test_write_then_check() {
        let index = HashIndex::new();
        let hash = hash_from(b'a', 128);

        assert!(!index.check(&hash));
        assert!(index.write(hash));
        assert!(index.check(&hash));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_check_miss_on_empty_store() {
        let index = HashIndex::new();
        assert!(!index.check(&hash_from(b'z', 128)));
    }

    #[test]
    fn test_repeated_write_is_rejected() {
        let index = HashIndex::new();
        let hash = hash_from(b'a', 128);

        assert!(index.write(hash));
        // The Bloom guard treats the second write as already present.
        assert!(!index.write(hash));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_delete_then_check() {
        let index = HashIndex::new();
        let hash = hash_from(b'a', 128);

        assert!(index.write(hash));
        assert!(index.delete(&hash));
        assert!(!index.check(&hash));
        assert!(index.is_empty());
    }

    #[test]
    fn test_delete_missing_hash() {
        let index = HashIndex::new();
        assert!(!index.delete(&hash_from(b'a', 128)));
    }

    #[test]
    fn test_delete_after_delete_is_negative() {
        let index = HashIndex::new();
        let hash = hash_from(b'a', 128);

        assert!(index.write(hash));
        assert!(index.delete(&hash));
        assert!(!index.delete(&hash));
    }

    #[test]
    fn test_mods_counter() {
        let index = HashIndex::new();
        assert_eq!(index.mods(), 0);

        assert!(index.write(hash_from(b'a', 1)));
        assert!(index.write(hash_from(b'b', 2)));
        assert_eq!(index.mods(), 2);

        assert!(index.delete(&hash_from(b'a', 1)));
        assert_eq!(index.mods(), 3);

        index.reset_mods();
        assert_eq!(index.mods(), 0);

        index.force_dirty();
        assert!(index.mods() > MOD_LIMIT);
    }

    #[test]
    fn test_bucket_partitioning() {
        let index = HashIndex::new();
        // Block sizes 5 and 5 + 1024 share a bucket but are distinct hashes.
        assert!(index.write(hash_from(b'a', 5)));
        assert!(index.write(hash_from(b'b', 5 + NUM_BUCKETS as u32)));

        for (b, bucket) in index.buckets().iter().enumerate() {
            for record in bucket.read().unwrap().iter() {
                assert_eq!(record.hash.block_size as usize % NUM_BUCKETS, b);
            }
        }

        // Same bucket, different block size: no cross-match.
        assert!(index.check(&hash_from(b'a', 5)));
        assert!(!index.check(&hash_from(b'a', 5 + NUM_BUCKETS as u32)));
    }

    #[test]
    fn test_bloom_reflects_live_records() {
        let index = HashIndex::new();
        for i in 0..100u8 {
            index.write(hash_from(i, i as u32));
        }

        let bloom = index.bloom().read().unwrap();
        for bucket in index.buckets() {
            for record in bucket.read().unwrap().iter() {
                assert!(bloom.maybe_contains(&record.hash.pipe));
            }
        }
    }

    #[test]
    fn test_most_recent_first_ordering() {
        let index = HashIndex::new();
        assert!(index.write(hash_from(b'a', 7)));
        assert!(index.write(hash_from(b'b', 7)));

        let bucket = index.buckets()[7].read().unwrap();
        assert_eq!(bucket.front().unwrap().hash.pipe[0], b'b');
        assert_eq!(bucket.back().unwrap().hash.pipe[0], b'a');
    }

    #[test]
    fn test_delete_removes_all_matching() {
        let index = HashIndex::new();
        let hash = hash_from(b'a', 9);

        // Two identical records forced past the Bloom guard, as happens when
        // a snapshot load races a deleted-then-rewritten hash.
        index.insert_loaded(Record::new(hash, unix_now()));
        index.insert_loaded(Record::new(hash, unix_now()));
        assert_eq!(index.len(), 2);

        assert!(index.delete(&hash));
        assert!(index.is_empty());
    }
}
