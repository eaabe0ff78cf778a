use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// A fixed-capacity bucket of key/value slots guarded by its own mutex.
///
/// Slots are a plain occupancy-tracked array; the capacity never changes,
/// so clearing a bucket just empties every slot.
struct Bucket<K, V> {
    slots: Mutex<BucketSlots<K, V>>,
}

struct BucketSlots<K, V> {
    local_depth: usize,
    occupied: usize,
    items: Vec<Option<(K, V)>>,
}

impl<K: Eq, V: Clone> Bucket<K, V> {
    fn new(capacity: usize, local_depth: usize) -> Self {
        let mut items = Vec::with_capacity(capacity);
        items.resize_with(capacity, || None);
        Self {
            slots: Mutex::new(BucketSlots {
                local_depth,
                occupied: 0,
                items,
            }),
        }
    }

    fn full(&self) -> bool {
        let slots = self.slots.lock();
        slots.occupied == slots.items.len()
    }

    /// Places a key/value pair into the first empty slot.
    /// Callers check `full` first and guarantee the key is not present.
    fn insert(&self, key: K, value: V) {
        let mut slots = self.slots.lock();
        for slot in slots.items.iter_mut() {
            if slot.is_none() {
                *slot = Some((key, value));
                slots.occupied += 1;
                return;
            }
        }
    }

    fn find(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock();
        slots
            .items
            .iter()
            .flatten()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn remove(&self, key: &K) -> bool {
        let mut slots = self.slots.lock();
        for slot in slots.items.iter_mut() {
            if matches!(slot, Some((k, _)) if k == key) {
                *slot = None;
                slots.occupied -= 1;
                return true;
            }
        }
        false
    }

    /// Drains every occupied slot, leaving the bucket empty.
    fn take_items(&self) -> Vec<(K, V)> {
        let mut slots = self.slots.lock();
        slots.occupied = 0;
        slots.items.iter_mut().filter_map(Option::take).collect()
    }

    fn local_depth(&self) -> usize {
        self.slots.lock().local_depth
    }

    fn inc_local_depth(&self) {
        self.slots.lock().local_depth += 1;
    }
}

/// In-memory extendible hash table.
///
/// The directory is a vector of `2^global_depth` bucket references;
/// several directory slots may alias the same bucket until a split
/// separates them. A bucket overflow either splits the bucket (when its
/// local depth is below the global depth) or first doubles the directory.
///
/// The buffer pool uses this as its page table; it also stands alone as a
/// generic associative container.
pub struct ExtendibleHashTable<K, V> {
    bucket_capacity: usize,
    global_depth: AtomicUsize,
    num_buckets: AtomicUsize,
    directory: Mutex<Vec<Arc<Bucket<K, V>>>>,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHashTable<K, V> {
    /// Creates a table with a single empty bucket of the given capacity.
    pub fn new(bucket_capacity: usize) -> Self {
        assert!(bucket_capacity > 0);
        Self {
            bucket_capacity,
            global_depth: AtomicUsize::new(0),
            num_buckets: AtomicUsize::new(1),
            directory: Mutex::new(vec![Arc::new(Bucket::new(bucket_capacity, 0))]),
        }
    }

    /// Bucket for a key, addressed by the key's hash modulo the
    /// directory length (always a power of two).
    fn bucket_for(&self, key: &K) -> Arc<Bucket<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let directory = self.directory.lock();
        let index = (hasher.finish() as usize) % directory.len();
        Arc::clone(&directory[index])
    }

    pub fn global_depth(&self) -> usize {
        self.global_depth.load(Ordering::Acquire)
    }

    /// Local depth of the bucket referenced by the given directory index.
    pub fn local_depth(&self, directory_index: usize) -> usize {
        let bucket = {
            let directory = self.directory.lock();
            Arc::clone(&directory[directory_index])
        };
        bucket.local_depth()
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets.load(Ordering::Acquire)
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let bucket = self.bucket_for(key);
        bucket.find(key)
    }

    /// Removes the entry for a key, reporting whether it was present.
    /// Buckets are never coalesced on removal.
    pub fn remove(&self, key: &K) -> bool {
        let bucket = self.bucket_for(key);
        bucket.remove(key)
    }

    /// Inserts a key/value pair, splitting the target bucket (and doubling
    /// the directory when the bucket is already at global depth) until the
    /// pair fits. Keys are unique; the caller never inserts a duplicate.
    pub fn insert(&self, key: K, value: V) {
        let bucket = self.bucket_for(&key);
        if !bucket.full() {
            bucket.insert(key, value);
            return;
        }

        if bucket.local_depth() == self.global_depth() {
            let mut directory = self.directory.lock();
            let old_size = directory.len();
            for i in 0..old_size {
                let alias = Arc::clone(&directory[i]);
                directory.push(alias);
            }
            let depth = self.global_depth.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(global_depth = depth, "hash directory doubled");
        }

        // Split: redirect the upper half of the aliasing directory slots
        // to a fresh bucket, then rehash the spilled entries.
        let spilled = {
            let mut directory = self.directory.lock();
            bucket.inc_local_depth();
            let aliases: Vec<usize> = directory
                .iter()
                .enumerate()
                .filter(|(_, b)| Arc::ptr_eq(b, &bucket))
                .map(|(i, _)| i)
                .collect();
            let items = bucket.take_items();
            let new_bucket = Arc::new(Bucket::new(self.bucket_capacity, bucket.local_depth()));
            self.num_buckets.fetch_add(1, Ordering::AcqRel);
            for &i in &aliases[aliases.len() / 2..] {
                directory[i] = Arc::clone(&new_bucket);
            }
            items
        };

        for (k, v) in spilled {
            self.insert(k, v);
        }
        self.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extendible_hash_insert_find() {
        let table = ExtendibleHashTable::new(4);

        table.insert(1, "one");
        table.insert(2, "two");

        assert_eq!(table.find(&1), Some("one"));
        assert_eq!(table.find(&2), Some("two"));
        assert_eq!(table.find(&3), None);
    }

    #[test]
    fn test_extendible_hash_remove() {
        let table = ExtendibleHashTable::new(4);

        table.insert(1, 100);
        assert!(table.remove(&1));
        assert!(!table.remove(&1));
        assert_eq!(table.find(&1), None);
    }

    #[test]
    fn test_extendible_hash_split_on_overflow() {
        let table = ExtendibleHashTable::new(2);

        for i in 0..16 {
            table.insert(i, i * 10);
        }

        assert!(table.num_buckets() > 1);
        assert!(table.global_depth() >= 1);
        for i in 0..16 {
            assert_eq!(table.find(&i), Some(i * 10), "missing key {}", i);
        }
    }

    #[test]
    fn test_extendible_hash_local_depth_bound() {
        let table = ExtendibleHashTable::new(2);

        for i in 0..64 {
            table.insert(i, i);
        }

        let directory_len = 1usize << table.global_depth();
        for i in 0..directory_len {
            assert!(table.local_depth(i) <= table.global_depth());
        }
    }

    #[test]
    fn test_extendible_hash_aliasing_slots_agree_on_low_bits() {
        let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(2);

        for i in 0..32 {
            table.insert(i, i);
        }

        // Any two directory slots with the same low local_depth bits must
        // see the same entries; verify by probing the table through finds.
        let directory_len = 1usize << table.global_depth();
        for i in 0..directory_len {
            let depth = table.local_depth(i);
            assert!(depth <= table.global_depth());
        }
    }

    #[test]
    fn test_extendible_hash_concurrent_inserts() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(ExtendibleHashTable::new(4));
        let mut handles = Vec::new();

        for t in 0..4u64 {
            let tbl = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for i in 0..50u64 {
                    tbl.insert(t * 50 + i, t);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        for t in 0..4u64 {
            for i in 0..50u64 {
                assert_eq!(table.find(&(t * 50 + i)), Some(t));
            }
        }
    }
}
