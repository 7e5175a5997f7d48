//! Fixed-capacity LRU with hit/miss accounting.
//!
//! Recency is a doubly-linked list threaded through an arena of slots, with a
//! `HashMap` index from key to slot. The structure itself is single-threaded;
//! concurrent owners wrap it in a `Mutex` and hold the guard across
//! lookup-then-mutate sequences.

use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

struct Slot<K, V> {
    key: K,
    value: V,
    /// Last write time; the age sweep evicts on this, not on access.
    written_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct LruCache<K, V> {
    capacity: usize,
    slots: Vec<Option<Slot<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// `capacity` must be at least 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity),
            head: None,
            tail: None,
            hits: 0,
            misses: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Look up a key, recording hit/miss and promoting the entry to the
    /// front on hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let Some(&slot_id) = self.index.get(key) else {
            self.misses += 1;
            return None;
        };
        self.hits += 1;
        self.detach(slot_id);
        self.push_front(slot_id);
        self.slots[slot_id].as_ref().map(|s| &s.value)
    }

    /// Peek without touching recency or counters.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        let slot_id = *self.index.get(key)?;
        self.slots[slot_id].as_ref().map(|s| &s.value)
    }

    /// Insert or update, moving the entry to the front and refreshing its
    /// write timestamp. Evicts the tail on overflow.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(&slot_id) = self.index.get(&key) {
            if let Some(slot) = self.slots[slot_id].as_mut() {
                slot.value = value;
                slot.written_at = Instant::now();
            }
            self.detach(slot_id);
            self.push_front(slot_id);
            return;
        }

        if self.index.len() >= self.capacity {
            self.evict_tail();
        }

        let slot = Slot {
            key: key.clone(),
            value,
            written_at: Instant::now(),
            prev: None,
            next: None,
        };
        let slot_id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(slot);
                id
            },
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            },
        };
        self.index.insert(key, slot_id);
        self.push_front(slot_id);
    }

    /// Update a present entry in place without changing recency. Returns
    /// whether the key existed.
    pub fn update_in_place(&mut self, key: &K, f: impl FnOnce(&mut V)) -> bool {
        let Some(&slot_id) = self.index.get(key) else {
            return false;
        };
        if let Some(slot) = self.slots[slot_id].as_mut() {
            f(&mut slot.value);
            slot.written_at = Instant::now();
            true
        } else {
            false
        }
    }

    pub fn delete(&mut self, key: &K) -> Option<V> {
        let slot_id = self.index.remove(key)?;
        self.detach(slot_id);
        let slot = self.slots[slot_id].take()?;
        self.free.push(slot_id);
        Some(slot.value)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    /// Remove every entry last written longer than `max_age` ago. Returns
    /// how many were removed.
    pub fn sweep_older_than(&mut self, max_age: Duration) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(max_age) else {
            return 0;
        };
        let stale: Vec<K> = self
            .index
            .iter()
            .filter_map(|(key, &slot_id)| {
                self.slots[slot_id]
                    .as_ref()
                    .filter(|s| s.written_at < cutoff)
                    .map(|_| key.clone())
            })
            .collect();
        let count = stale.len();
        for key in stale {
            self.delete(&key);
        }
        count
    }

    // ── List plumbing ────────────────────────────────────────────────────

    fn detach(&mut self, slot_id: usize) {
        let (prev, next) = match &self.slots[slot_id] {
            Some(slot) => (slot.prev, slot.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(slot) = self.slots[p].as_mut() {
                    slot.next = next;
                }
            },
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(slot) = self.slots[n].as_mut() {
                    slot.prev = prev;
                }
            },
            None => self.tail = prev,
        }
        if let Some(slot) = self.slots[slot_id].as_mut() {
            slot.prev = None;
            slot.next = None;
        }
    }

    fn push_front(&mut self, slot_id: usize) {
        let old_head = self.head;
        if let Some(slot) = self.slots[slot_id].as_mut() {
            slot.prev = None;
            slot.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(slot) = self.slots[h].as_mut() {
                slot.prev = Some(slot_id);
            }
        }
        self.head = Some(slot_id);
        if self.tail.is_none() {
            self.tail = Some(slot_id);
        }
    }

    fn evict_tail(&mut self) {
        let Some(tail_id) = self.tail else { return };
        let key = match &self.slots[tail_id] {
            Some(slot) => slot.key.clone(),
            None => return,
        };
        self.delete(&key);
    }
}
