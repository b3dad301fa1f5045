//! Per-content-hash mutual exclusion.
//!
//! A directory-level lock would serialize every upload; keying the mutex
//! by content hash serializes only identical-content races, which is what
//! the at-most-one-finalized-copy guarantee needs.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

/// Process-wide table of lazily created per-hash mutexes. Entries are
/// retained for the process lifetime; the set of distinct content hashes
/// observed bounds the table size.
#[derive(Debug, Default)]
pub struct HashLockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl HashLockTable {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Lookup-or-insert the mutex for `hash`; the insert is atomic with
    /// respect to concurrent callers of the same hash.
    pub fn lock_for(&self, hash: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.locks.get(hash) {
            return existing.value().clone();
        }
        self.locks
            .entry(hash.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_hash_yields_the_same_mutex() {
        let table = HashLockTable::new();
        let first = table.lock_for("abc");
        let second = table.lock_for("abc");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_hashes_yield_distinct_mutexes() {
        let table = HashLockTable::new();
        let a = table.lock_for("a");
        let b = table.lock_for("b");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn critical_sections_for_one_hash_are_serialized() {
        let table = Arc::new(HashLockTable::new());
        let in_section = Arc::new(Mutex::new(false));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                let in_section = Arc::clone(&in_section);
                thread::spawn(move || {
                    let lock = table.lock_for("same-hash");
                    let _guard = lock.lock().unwrap();

                    {
                        let mut flag = in_section.lock().unwrap();
                        assert!(!*flag, "two handlers inside one critical section");
                        *flag = true;
                    }
                    thread::sleep(Duration::from_millis(10));
                    *in_section.lock().unwrap() = false;
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }
    }
}
