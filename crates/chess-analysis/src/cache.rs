//! Bounded in-memory result cache with a pluggable eviction policy.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Bookkeeping a policy can rank entries by.
#[derive(Debug)]
pub struct EntryMeta {
    /// Insertion sequence number.
    pub inserted: u64,
    /// Sequence number of the last hit (or the insert).
    pub last_used: u64,
}

/// Chooses which entry leaves a full cache.
pub trait EvictionPolicy: Send + Sync {
    /// Entries with the lowest rank are evicted first.
    fn rank(&self, meta: &EntryMeta) -> u64;
}

/// Evict the entry that was read or written longest ago.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastRecentlyUsed;

impl EvictionPolicy for LeastRecentlyUsed {
    fn rank(&self, meta: &EntryMeta) -> u64 {
        meta.last_used
    }
}

/// Evict the oldest insert, regardless of hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstInFirstOut;

impl EvictionPolicy for FirstInFirstOut {
    fn rank(&self, meta: &EntryMeta) -> u64 {
        meta.inserted
    }
}

/// Eviction policy named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionKind {
    #[default]
    Lru,
    Fifo,
}

impl EvictionPolicy for EvictionKind {
    fn rank(&self, meta: &EntryMeta) -> u64 {
        match self {
            EvictionKind::Lru => LeastRecentlyUsed.rank(meta),
            EvictionKind::Fifo => FirstInFirstOut.rank(meta),
        }
    }
}

struct Entry<V> {
    value: V,
    inserted: u64,
    last_used: AtomicU64,
    created: Instant,
}

/// A map that holds at most `capacity` entries.
///
/// Lookups take the read lock only; recency is tracked with an atomic stamp
/// per entry. Inserts take the write lock, drop expired entries, and evict
/// the lowest-ranked entry when the cache is full.
pub struct BoundedCache<K, V, P = LeastRecentlyUsed> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    capacity: usize,
    ttl: Option<Duration>,
    clock: AtomicU64,
    policy: P,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V, LeastRecentlyUsed> {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, LeastRecentlyUsed)
    }
}

impl<K: Eq + Hash + Clone, V: Clone, P: EvictionPolicy> BoundedCache<K, V, P> {
    pub fn with_policy(capacity: usize, policy: P) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            ttl: None,
            clock: AtomicU64::new(0),
            policy,
        }
    }

    /// Treat entries older than `ttl` as absent.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn expired(&self, entry: &Entry<V>) -> bool {
        self.ttl.is_some_and(|ttl| entry.created.elapsed() >= ttl)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.read();
        let entry = entries.get(key)?;
        if self.expired(entry) {
            return None;
        }
        entry.last_used.store(self.tick(), Ordering::Relaxed);
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.write();
        if self.ttl.is_some() {
            entries.retain(|_, e| !self.expired(e));
        }

        if !entries.contains_key(&key) {
            while entries.len() >= self.capacity {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, e)| {
                        self.policy.rank(&EntryMeta {
                            inserted: e.inserted,
                            last_used: e.last_used.load(Ordering::Relaxed),
                        })
                    })
                    .map(|(k, _)| k.clone());
                match victim {
                    Some(k) => {
                        entries.remove(&k);
                    }
                    None => break,
                }
            }
        }

        let stamp = self.tick();
        entries.insert(
            key,
            Entry {
                value,
                inserted: stamp,
                last_used: AtomicU64::new(stamp),
                created: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.write().remove(key).map(|e| e.value)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
