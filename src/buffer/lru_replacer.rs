use std::collections::VecDeque;

use parking_lot::Mutex;

/// Least-recently-used replacement policy.
///
/// Tracks elements that are eligible for eviction, ordered by recency of
/// insertion: the head of the list is the coldest element and the next
/// victim. An element appears at most once; re-inserting moves it to the
/// tail. Operations are O(n), which is acceptable because the replacer
/// never tracks more elements than the pool has frames.
pub struct LruReplacer<T: PartialEq> {
    list: Mutex<VecDeque<T>>,
}

impl<T: PartialEq> LruReplacer<T> {
    pub fn new() -> Self {
        Self {
            list: Mutex::new(VecDeque::new()),
        }
    }

    /// Inserts a value, making it the most-recently-used element.
    /// If the value is already tracked it is moved to the tail.
    pub fn insert(&self, value: T) {
        let mut list = self.list.lock();
        if let Some(pos) = list.iter().position(|v| *v == value) {
            list.remove(pos);
        }
        list.push_back(value);
    }

    /// Removes and returns the least-recently-used element, or None if
    /// nothing is evictable.
    pub fn victim(&self) -> Option<T> {
        self.list.lock().pop_front()
    }

    /// Removes a value if present, reporting whether it was found.
    pub fn erase(&self, value: &T) -> bool {
        let mut list = self.list.lock();
        match list.iter().position(|v| v == value) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of elements currently tracked.
    pub fn size(&self) -> usize {
        self.list.lock().len()
    }
}

impl<T: PartialEq> Default for LruReplacer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_victim_order() {
        let replacer = LruReplacer::new();

        replacer.insert(1);
        replacer.insert(2);
        replacer.insert(3);
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_reinsert_moves_to_tail() {
        let replacer = LruReplacer::new();

        replacer.insert(1);
        replacer.insert(2);
        replacer.insert(1);
        assert_eq!(replacer.size(), 2);

        // 2 is now the coldest element
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_lru_replacer_erase() {
        let replacer = LruReplacer::new();

        replacer.insert(1);
        replacer.insert(2);

        assert!(replacer.erase(&1));
        assert!(!replacer.erase(&1));
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(2));
    }

    #[test]
    fn test_lru_replacer_empty() {
        let replacer: LruReplacer<i32> = LruReplacer::new();
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
        assert!(!replacer.erase(&7));
    }

    #[test]
    fn test_lru_replacer_concurrent_inserts() {
        use std::sync::Arc;
        use std::thread;

        let replacer = Arc::new(LruReplacer::new());
        let mut handles = Vec::new();

        for t in 0..4 {
            let r = Arc::clone(&replacer);
            handles.push(thread::spawn(move || {
                for i in 0..25 {
                    r.insert(t * 25 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(replacer.size(), 100);
        let mut seen = Vec::new();
        while let Some(v) = replacer.victim() {
            seen.push(v);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}
