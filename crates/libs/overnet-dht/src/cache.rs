use std::collections::HashMap;

/// Bounded key/value result cache with least-recently-used eviction.
///
/// Small enough that eviction is a linear scan for the stalest entry.
pub struct LruCache {
    cap: usize,
    clock: u64,
    entries: HashMap<String, Entry>,
}

struct Entry {
    value: String,
    used: u64,
}

impl LruCache {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1), clock: 0, entries: HashMap::new() }
    }

    pub fn get(&mut self, key: &str) -> Option<&str> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(key)?;
        entry.used = clock;
        Some(&entry.value)
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.clock += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.cap {
            if let Some(stalest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.used)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&stalest);
            }
        }
        self.entries.insert(key, Entry { value, used: self.clock });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
