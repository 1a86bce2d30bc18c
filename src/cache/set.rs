use tokio::sync::{Mutex, MutexGuard};

/// A single cached key-value pair, owned by the set that contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub referenced: bool,
}

/// One set of the cache. Entries keep insertion order except when a CLOCK
/// scan replaces a victim in place.
#[derive(Debug)]
pub struct CacheSet {
    entries: Vec<CacheEntry>,
    capacity: usize,
}

impl CacheSet {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the cached value and marks the entry as referenced.
    pub fn get(&mut self, key: &str) -> Option<String> {
        self.entries
            .iter_mut()
            .find(|entry| entry.key == key)
            .map(|entry| {
                entry.referenced = true;
                entry.value.clone()
            })
    }

    /// Inserts or overwrites `key`.
    ///
    /// An overwrite counts as a touch. A new entry goes to the back while the
    /// set has room; otherwise the CLOCK scan picks a victim.
    pub fn put(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) {
            entry.value = value.to_string();
            entry.referenced = true;
            return;
        }

        let entry = CacheEntry {
            key: key.to_string(),
            value: value.to_string(),
            referenced: false,
        };

        if self.entries.len() < self.capacity {
            self.entries.push(entry);
            return;
        }

        let victim = self.clock_victim();
        tracing::trace!("Evicting '{}' for '{}'", self.entries[victim].key, key);
        self.entries[victim] = entry;
    }

    /// Walks the full set from the front, clearing reference bits, and
    /// returns the index of the first cold entry.
    ///
    /// Terminates within two passes: the first pass leaves every bit clear.
    fn clock_victim(&mut self) -> usize {
        let len = self.entries.len();
        let mut hand = 0;

        loop {
            let entry = &mut self.entries[hand];
            if !entry.referenced {
                return hand;
            }
            entry.referenced = false;
            hand = (hand + 1) % len;
        }
    }

    /// Removes `key` if present; no-op otherwise.
    pub fn del(&mut self, key: &str) {
        if let Some(pos) = self.entries.iter().position(|entry| entry.key == key) {
            self.entries.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries in set order, for inspection.
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }
}

/// Set-associative second-chance cache.
pub struct KvCache {
    sets: Vec<Mutex<CacheSet>>,
}

impl KvCache {
    /// # Panics
    /// If either dimension is zero.
    pub fn new(num_sets: usize, max_elems_per_set: usize) -> Self {
        assert!(num_sets > 0, "cache needs at least one set");
        assert!(max_elems_per_set > 0, "cache sets need room for one entry");

        let sets = (0..num_sets)
            .map(|_| Mutex::new(CacheSet::new(max_elems_per_set)))
            .collect();

        Self { sets }
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    /// The set a key belongs to.
    pub fn set_index(&self, key: &str) -> usize {
        string_hash(key).unsigned_abs() as usize % self.sets.len()
    }

    /// Locks the set guarding `key`. Operations on different sets proceed in
    /// parallel; operations on the same set serialize here.
    pub async fn lock_for(&self, key: &str) -> MutexGuard<'_, CacheSet> {
        self.sets[self.set_index(key)].lock().await
    }

    /// Number of entries currently in set `index`.
    pub async fn set_len(&self, index: usize) -> usize {
        self.sets[index].lock().await.len()
    }
}

/// 32-bit polynomial hash over UTF-16 code units (`h = 31 * h + c`).
fn string_hash(key: &str) -> i32 {
    key.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}
