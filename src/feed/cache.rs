//! Bounded day-keyed record cache.
//!
//! Fixed capacity, evicting the oldest *inserted* entry when full. Reads never
//! reorder entries and re-setting a key keeps its original position, so this
//! is insertion-order FIFO rather than LRU.
//!
//! Insertion order is kept in a slot arena with index-based prev/next links
//! instead of pointers; vacated slots are recycled through a free list.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
}

// -------------------------------------------------------------------------
// Statistics
// -------------------------------------------------------------------------

/// Cache statistics for monitoring performance.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Get current stats as a tuple: (hits, misses, evictions).
    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
        )
    }

    /// Calculate hit rate as a fraction (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

// -------------------------------------------------------------------------
// Slot arena
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotIdx(usize);

#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: V,
    prev: Option<SlotIdx>,
    next: Option<SlotIdx>,
}

// -------------------------------------------------------------------------
// BoundedCache
// -------------------------------------------------------------------------

/// Fixed-capacity map with oldest-insertion-first eviction.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    index: HashMap<K, SlotIdx>,
    slots: Vec<Option<Slot<K, V>>>,
    free: Vec<usize>,
    /// Oldest entry.
    head: Option<SlotIdx>,
    /// Newest entry.
    tail: Option<SlotIdx>,
    stats: CacheStats,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            index: HashMap::with_capacity(capacity.min(4096)),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            stats: CacheStats::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn has(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Look up a value. Counts toward hit/miss stats but never reorders.
    pub fn get(&self, key: &K) -> Option<&V> {
        let found = self
            .index
            .get(key)
            .and_then(|idx| self.slot(*idx))
            .map(|slot| &slot.value);
        if found.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Insert or replace a value.
    ///
    /// A new key is appended as the newest entry; if the cache is full the
    /// oldest entry is evicted first and its key returned. Replacing an
    /// existing key keeps its position.
    pub fn set(&mut self, key: K, value: V) -> Option<K> {
        if let Some(idx) = self.index.get(&key).copied() {
            if let Some(slot) = self.slot_mut(idx) {
                slot.value = value;
            }
            return None;
        }

        let evicted = if self.index.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let idx = self.alloc(key.clone(), value);
        self.link_back(idx);
        self.index.insert(key, idx);
        evicted
    }

    /// Remove a key, relinking its neighbours.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.unlink(idx).map(|slot| slot.value)
    }

    /// Drop every entry and reset statistics.
    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.stats.reset();
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Keys from oldest to newest insertion.
    pub fn keys_oldest_first(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let slot = self.slot(cursor?)?;
            cursor = slot.next;
            Some(&slot.key)
        })
    }

    fn evict_oldest(&mut self) -> Option<K> {
        let head = self.head?;
        let slot = self.unlink(head)?;
        self.index.remove(&slot.key);
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        debug!(key = ?slot.key, capacity = self.capacity, "evicted oldest cache entry");
        Some(slot.key)
    }

    // -- Arena helpers --

    fn alloc(&mut self, key: K, value: V) -> SlotIdx {
        let slot = Slot {
            key,
            value,
            prev: None,
            next: None,
        };
        if let Some(free) = self.free.pop() {
            self.slots[free] = Some(slot);
            SlotIdx(free)
        } else {
            self.slots.push(Some(slot));
            SlotIdx(self.slots.len() - 1)
        }
    }

    fn link_back(&mut self, idx: SlotIdx) {
        match self.tail {
            Some(old_tail) => {
                if let Some(slot) = self.slot_mut(old_tail) {
                    slot.next = Some(idx);
                }
                if let Some(slot) = self.slot_mut(idx) {
                    slot.prev = Some(old_tail);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Take a slot out of the arena, splicing both neighbours together.
    fn unlink(&mut self, idx: SlotIdx) -> Option<Slot<K, V>> {
        let slot = self.slots.get_mut(idx.0)?.take()?;

        match slot.prev {
            Some(prev) => {
                if let Some(p) = self.slot_mut(prev) {
                    p.next = slot.next;
                }
            }
            None => self.head = slot.next,
        }
        match slot.next {
            Some(next) => {
                if let Some(n) = self.slot_mut(next) {
                    n.prev = slot.prev;
                }
            }
            None => self.tail = slot.prev,
        }

        self.free.push(idx.0);
        Some(slot)
    }

    fn slot(&self, idx: SlotIdx) -> Option<&Slot<K, V>> {
        self.slots.get(idx.0)?.as_ref()
    }

    fn slot_mut(&mut self, idx: SlotIdx) -> Option<&mut Slot<K, V>> {
        self.slots.get_mut(idx.0)?.as_mut()
    }
}
