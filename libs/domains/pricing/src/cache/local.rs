//! Process-local cache tier with TTL and least-recently-accessed eviction

use glob::Pattern;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::quotes::Quote;

/// A cached quote plus its bookkeeping. Never handed out of the cache layer.
#[derive(Debug, Clone)]
struct CacheRecord {
    quote: Quote,
    created_at: Instant,
    expires_at: Instant,
    access_count: u64,
    last_access: Instant,
    /// Position in the store's access order
    access_seq: u64,
}

impl CacheRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bookkeeping snapshot of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub age: Duration,
    pub idle: Duration,
    pub access_count: u64,
}

/// Result of a local lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LocalLookup {
    Hit(Quote),
    Miss,
    /// The entry existed but had expired; it has been removed
    Expired,
}

/// Records plus an index of keys by access sequence. Sequences only grow, so
/// the first index entry is always the least recently accessed key.
#[derive(Debug, Default)]
struct Store {
    records: HashMap<String, CacheRecord>,
    access_order: BTreeMap<u64, String>,
    seq: u64,
}

impl Store {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn remove(&mut self, key: &str) -> Option<CacheRecord> {
        let record = self.records.remove(key)?;
        self.access_order.remove(&record.access_seq);
        Some(record)
    }

    fn pop_least_recent(&mut self) -> Option<String> {
        let (_, key) = self.access_order.pop_first()?;
        self.records.remove(&key);
        Some(key)
    }
}

/// Bounded in-memory store.
///
/// Every operation takes one lock, so lookups, access bookkeeping and
/// eviction never interleave.
#[derive(Debug)]
pub struct LocalStore {
    capacity: usize,
    store: Mutex<Store>,
}

impl LocalStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            store: Mutex::new(Store::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> LocalLookup {
        let now = Instant::now();
        let mut store = self.lock();

        let expired = match store.records.get(key) {
            None => return LocalLookup::Miss,
            Some(record) => record.is_expired(now),
        };
        if expired {
            store.remove(key);
            return LocalLookup::Expired;
        }

        let seq = store.next_seq();
        let Some(record) = store.records.get_mut(key) else {
            return LocalLookup::Miss;
        };
        let previous = std::mem::replace(&mut record.access_seq, seq);
        record.access_count += 1;
        record.last_access = now;
        let quote = record.quote.clone();

        store.access_order.remove(&previous);
        store.access_order.insert(seq, key.to_string());
        LocalLookup::Hit(quote)
    }

    /// Insert or replace an entry; returns how many entries were evicted
    pub fn insert(&self, key: String, quote: Quote, ttl: Duration) -> u64 {
        let now = Instant::now();
        let mut store = self.lock();
        let seq = store.next_seq();

        store.remove(&key);
        store.access_order.insert(seq, key.clone());
        store.records.insert(
            key,
            CacheRecord {
                quote,
                created_at: now,
                expires_at: now + ttl,
                access_count: 0,
                last_access: now,
                access_seq: seq,
            },
        );

        let mut evicted = 0;
        while store.records.len() > self.capacity {
            if store.pop_least_recent().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    /// Remove keys matching a pattern; returns the removed keys
    pub fn remove_matching(&self, pattern: &Pattern) -> Vec<String> {
        let mut store = self.lock();
        let matching: Vec<String> = store
            .records
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect();
        for key in &matching {
            store.remove(key);
        }
        matching
    }

    /// Age, idle time and access count of an entry, for diagnostics
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let store = self.lock();
        store.records.get(key).map(|r| EntryInfo {
            age: r.created_at.elapsed(),
            idle: r.last_access.elapsed(),
            access_count: r.access_count,
        })
    }
}
