//! LRU index
//!
//! Access-ordered index of CLEAN entries with a running size total.
//!
//! Every insert or touch stamps the entry with a fresh sequence number; the
//! `order` map is keyed by that number, so its first element is always the
//! least recently used entry and ties cannot occur.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::key::CacheKey;

use super::{CacheEntry, EntryState};

/// Access-ordered index of committed entries
#[derive(Debug, Default)]
pub struct LruIndex {
    entries: HashMap<CacheKey, CacheEntry>,
    order: BTreeMap<u64, CacheKey>,
    next_sequence: u64,
    total_size: u64,
}

impl LruIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace an entry as most recently used
    ///
    /// Returns the replaced entry, if any.
    pub fn insert(&mut self, key: CacheKey, size: u64, path: PathBuf) -> Option<CacheEntry> {
        let replaced = self.remove(&key);

        let sequence = self.bump();
        self.order.insert(sequence, key.clone());
        self.total_size += size;
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                size,
                sequence,
                state: EntryState::Clean,
                path,
            },
        );
        replaced
    }

    /// Mark an entry as most recently used
    pub fn touch(&mut self, key: &CacheKey) -> bool {
        let sequence = self.bump();
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.order.remove(&entry.sequence);
                entry.sequence = sequence;
                self.order.insert(sequence, key.clone());
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let mut entry = self.entries.remove(key)?;
        self.order.remove(&entry.sequence);
        self.total_size -= entry.size;
        entry.state = EntryState::Removed;
        Some(entry)
    }

    /// Remove and return the least recently used entry
    pub fn pop_lru(&mut self) -> Option<CacheEntry> {
        let key = self.order.values().next()?.clone();
        self.remove(&key)
    }

    /// Remove every entry, returning them least recently used first
    pub fn drain(&mut self) -> Vec<CacheEntry> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.pop_lru() {
            drained.push(entry);
        }
        drained
    }

    /// Entries from least to most recently used
    pub fn iter_lru(&self) -> impl Iterator<Item = &CacheEntry> + '_ {
        self.order.values().filter_map(move |key| self.entries.get(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry sizes
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    fn bump(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}
