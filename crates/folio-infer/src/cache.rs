//! LRU cache for query embeddings.
//!
//! Visitors tend to ask the same handful of questions ("What is KYARA?"),
//! so the retrieval path keeps recent query vectors around instead of
//! paying for an embeddings round-trip on every message.
//! Default: 256 entries, 1-hour TTL.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use ndarray::Array1;
use parking_lot::Mutex;

struct Slot {
    embedding: Array1<f32>,
    stored_at: Instant,
}

/// Thread-safe LRU cache of query text to embedding.
pub struct QueryCache {
    inner: Mutex<Slots>,
}

struct Slots {
    by_query: HashMap<String, Slot>,
    /// Least recently used at the front.
    recency: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
}

impl Slots {
    fn touch(&mut self, query: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == query) {
            if let Some(key) = self.recency.remove(pos) {
                self.recency.push_back(key);
            }
        }
    }

    fn forget(&mut self, query: &str) {
        self.by_query.remove(query);
        self.recency.retain(|k| k != query);
    }
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Slots {
                by_query: HashMap::with_capacity(capacity),
                recency: VecDeque::with_capacity(capacity),
                capacity: capacity.max(1),
                ttl,
            }),
        }
    }

    /// Create a cache with default settings (256 entries, 1hr TTL).
    pub fn default_cache() -> Self {
        Self::new(256, Duration::from_secs(3600))
    }

    /// Cached embedding for `query`, or None on miss or expiry.
    pub fn get(&self, query: &str) -> Option<Array1<f32>> {
        let mut guard = self.inner.lock();
        let slots = &mut *guard;
        let ttl = slots.ttl;

        let fresh = match slots.by_query.get(query) {
            Some(slot) if slot.stored_at.elapsed() < ttl => slot.embedding.clone(),
            Some(_) => {
                slots.forget(query);
                return None;
            }
            None => return None,
        };
        slots.touch(query);
        Some(fresh)
    }

    pub fn put(&self, query: String, embedding: Array1<f32>) {
        let mut slots = self.inner.lock();
        let slot = Slot {
            embedding,
            stored_at: Instant::now(),
        };

        if slots.by_query.insert(query.clone(), slot).is_some() {
            slots.touch(&query);
            return;
        }

        slots.recency.push_back(query);
        while slots.by_query.len() > slots.capacity {
            match slots.recency.pop_front() {
                Some(oldest) => {
                    slots.by_query.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_query.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
