// Write-back LRU cache of decoded pattern bundles in front of the flash store.
//
// Only a handful of patterns fit in RAM; the rest live in flash. Edits mark an
// entry dirty and reach flash on flush or when the entry is evicted. Nothing in
// here panics on bad input: an invalid key or a flash failure yields None and
// the sequencer keeps running on whatever it already has.

use std::time::Duration;

use crate::config::StorageConfig;
use crate::pipeline::project::PatternBundle;
use crate::shared::{PatternKey, CACHE_CAPACITY, TRACK_COUNT};

use super::codec::PatternStore;
use super::device::BlockDevice;
use super::StorageError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub dirty: usize,
    pub flash_loads: u64,
    pub flash_failures: u64,
}

struct Entry {
    key: Option<PatternKey>, // None = free
    last_access: u32,
    dirty: bool,
    bundle: Box<PatternBundle>,
}

impl Entry {
    fn free() -> Self {
        Self {
            key: None,
            last_access: 0,
            dirty: false,
            bundle: Box::default(),
        }
    }
}

pub struct PatternCache<D> {
    store: PatternStore<D>,
    entries: Vec<Entry>,
    clock: u32,
    stats: CacheStats,
}

impl<D: BlockDevice> PatternCache<D> {
    pub fn new(store: PatternStore<D>) -> Self {
        Self::with_capacity(store, CACHE_CAPACITY)
    }

    pub fn with_capacity(store: PatternStore<D>, capacity: usize) -> Self {
        let entries = (0..capacity.max(1)).map(|_| Entry::free()).collect();
        Self {
            store,
            entries,
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn store(&self) -> &PatternStore<D> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PatternStore<D> {
        &mut self.store
    }

    /// Hands back the flash store. Unflushed edits are dropped, like pulling the power.
    pub fn into_store(self) -> PatternStore<D> {
        self.store
    }

    fn config(&self) -> &StorageConfig {
        self.store.config()
    }

    fn key(&self, track: usize, pattern: usize) -> Option<PatternKey> {
        if track >= TRACK_COUNT || pattern >= self.config().patterns_per_track {
            return None;
        }
        let key = PatternKey::new(track, pattern);
        (key.slot(self.config().patterns_per_track) < self.store.slot_count()).then_some(key)
    }

    fn find(&self, key: PatternKey) -> Option<usize> {
        self.entries.iter().position(|e| e.key == Some(key))
    }

    fn touch(&mut self, index: usize) {
        self.clock = self.clock.wrapping_add(1);
        self.entries[index].last_access = self.clock;
    }

    // first free entry, otherwise the one accessed longest ago
    fn find_lru(&self) -> usize {
        if let Some(free) = self.entries.iter().position(|e| e.key.is_none()) {
            return free;
        }
        let mut victim = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.last_access < self.entries[victim].last_access {
                victim = i;
            }
        }
        victim
    }

    fn save_entry(&mut self, index: usize) -> Result<(), StorageError> {
        let entry = &self.entries[index];
        let Some(key) = entry.key else {
            return Ok(());
        };
        let slot = key.slot(self.config().patterns_per_track);
        match self.store.save(slot, &entry.bundle) {
            Ok(()) => {
                self.entries[index].dirty = false;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(track = key.track, pattern = key.pattern, error = %e, "pattern save failed, keeping it dirty");
                Err(e)
            }
        }
    }

    // miss path: reuse a victim entry for `key`, filled from flash or empty
    fn install(&mut self, key: PatternKey) -> Option<usize> {
        let victim = self.find_lru();
        if self.entries[victim].dirty {
            // never drop unsaved edits to make room
            self.save_entry(victim).ok()?;
        }

        let slot = key.slot(self.config().patterns_per_track);
        let bundle = match self.store.load(slot) {
            Ok(Some(bundle)) => {
                self.stats.flash_loads += 1;
                bundle
            }
            Ok(None) => PatternBundle::default(),
            Err(e) => {
                self.stats.flash_failures += 1;
                tracing::warn!(track = key.track, pattern = key.pattern, error = %e, "pattern load failed");
                return None;
            }
        };

        if let Some(old) = self.entries[victim].key {
            self.stats.evictions += 1;
            tracing::debug!(track = old.track, pattern = old.pattern, "evicted pattern");
        }
        let entry = &mut self.entries[victim];
        entry.key = Some(key);
        entry.dirty = false;
        *entry.bundle = bundle;
        self.touch(victim);
        Some(victim)
    }

    pub fn get(&mut self, track: usize, pattern: usize) -> Option<&mut PatternBundle> {
        let key = self.key(track, pattern)?;
        let index = match self.find(key) {
            Some(index) => {
                self.stats.hits += 1;
                self.touch(index);
                index
            }
            None => {
                self.stats.misses += 1;
                self.install(key)?
            }
        };
        Some(self.entries[index].bundle.as_mut())
    }

    pub fn mark_dirty(&mut self, track: usize, pattern: usize) {
        let Some(key) = self.key(track, pattern) else {
            return;
        };
        if let Some(index) = self.find(key) {
            self.entries[index].dirty = true;
        }
    }

    /// Pulls a pattern into the cache ahead of time, e.g. when the next pattern is queued.
    pub fn preload(&mut self, track: usize, pattern: usize) {
        let Some(key) = self.key(track, pattern) else {
            return;
        };
        if self.find(key).is_none() {
            self.install(key);
        }
    }

    pub fn contains(&self, track: usize, pattern: usize) -> bool {
        self.key(track, pattern)
            .is_some_and(|key| self.find(key).is_some())
    }

    /// Cached bundle without loading it or counting as an access. Safe from the tick path.
    pub fn peek(&self, track: usize, pattern: usize) -> Option<&PatternBundle> {
        let index = self.key(track, pattern).and_then(|key| self.find(key))?;
        Some(self.entries[index].bundle.as_ref())
    }

    pub fn is_dirty(&self, track: usize, pattern: usize) -> bool {
        self.key(track, pattern)
            .and_then(|key| self.find(key))
            .is_some_and(|index| self.entries[index].dirty)
    }

    /// Writes every dirty entry. Entries that fail stay dirty; the first error is returned
    /// after all entries have been tried. A blocking flush pauses after each write so the
    /// flash controller can settle.
    pub fn flush(&mut self, blocking: bool) -> Result<usize, StorageError> {
        let settle = Duration::from_millis(self.config().flush_settle_ms);
        let mut first_error = None;
        let mut saved = 0;
        for index in 0..self.entries.len() {
            if !self.entries[index].dirty {
                continue;
            }
            match self.save_entry(index) {
                Ok(()) => saved += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
            if blocking && !settle.is_zero() {
                std::thread::sleep(settle);
            }
        }
        if saved > 0 {
            tracing::info!(saved, "flushed patterns to flash");
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    /// Flushes then frees one entry. Returns false if it had to stay because its save failed.
    pub fn evict(&mut self, track: usize, pattern: usize) -> bool {
        let Some(index) = self.key(track, pattern).and_then(|key| self.find(key)) else {
            return true;
        };
        if self.entries[index].dirty && self.save_entry(index).is_err() {
            return false;
        }
        self.entries[index] = Entry::free();
        self.stats.evictions += 1;
        true
    }

    /// Forgets a pattern entirely: the cached copy is dropped unsaved and its flash slot erased.
    pub fn delete(&mut self, track: usize, pattern: usize) -> Result<(), StorageError> {
        let Some(key) = self.key(track, pattern) else {
            return Ok(());
        };
        if let Some(index) = self.find(key) {
            self.entries[index] = Entry::free();
        }
        self.store.erase(key.slot(self.config().patterns_per_track))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached: self.entries.iter().filter(|e| e.key.is_some()).count(),
            dirty: self.entries.iter().filter(|e| e.dirty).count(),
            ..self.stats
        }
    }
}
