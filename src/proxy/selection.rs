//! Sticky backend selection.
//!
//! A request fingerprint is pinned to one backend for `cache_expiry`
//! seconds. On a miss (or once the entry has expired) the
//! [`SelectionStrategy`] picks a backend and the choice is written back.
//! Lookup, choice and write happen under one mutex with no I/O inside,
//! so two concurrent misses for the same fingerprint simply leave the
//! last writer's choice in place.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use super::path::Fingerprint;
use super::registry::{BackendEndpoint, BackendRegistry};

/// Picks the backend for a fingerprint that has no live cache entry.
pub trait SelectionStrategy: Send + Sync {
    /// Index into `backends`, which is never empty.
    fn choose(&self, backends: &[BackendEndpoint]) -> usize;
}

/// Uniform random choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomStrategy;

impl SelectionStrategy for RandomStrategy {
    fn choose(&self, backends: &[BackendEndpoint]) -> usize {
        rand::thread_rng().gen_range(0..backends.len())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    backend: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Fingerprint -> backend key, with optional per-entry expiry.
#[derive(Debug)]
pub(crate) struct SelectionCache {
    entries: HashMap<Fingerprint, CacheEntry>,
    ttl: Option<Duration>,
}

impl SelectionCache {
    /// `ttl` of `None` pins entries until the process exits.
    #[must_use]
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Build from the `cache_expiry` setting, where `0` means no expiry.
    #[must_use]
    pub fn from_expiry_secs(secs: u64) -> Self {
        Self::new((secs > 0).then(|| Duration::from_secs(secs)))
    }

    #[must_use]
    pub fn get(&self, key: &Fingerprint, now: Instant) -> Option<&str> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.backend.as_str())
    }

    pub fn insert(&mut self, key: Fingerprint, backend: String, now: Instant) {
        let expires_at = self.ttl.map(|ttl| now + ttl);
        self.entries.insert(key, CacheEntry { backend, expires_at });
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub endpoint: &'a BackendEndpoint,
    pub cache_hit: bool,
}

pub struct BackendSelector {
    cache: Mutex<SelectionCache>,
    strategy: Box<dyn SelectionStrategy>,
}

impl BackendSelector {
    #[must_use]
    pub fn new(cache_expiry_secs: u64, strategy: Box<dyn SelectionStrategy>) -> Self {
        Self {
            cache: Mutex::new(SelectionCache::from_expiry_secs(cache_expiry_secs)),
            strategy,
        }
    }

    /// Return the pinned backend for `fingerprint`, choosing and pinning
    /// one on a miss. `registry` must not be empty.
    pub fn select<'r>(&self, fingerprint: &Fingerprint, registry: &'r BackendRegistry) -> Selection<'r> {
        let now = Instant::now();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(endpoint) = cache.get(fingerprint, now).and_then(|key| registry.get(key)) {
            return Selection {
                endpoint,
                cache_hit: true,
            };
        }

        let backends = registry.endpoints();
        let endpoint = &backends[self.strategy.choose(backends) % backends.len()];
        cache.insert(fingerprint.clone(), endpoint.key().to_string(), now);
        Selection {
            endpoint,
            cache_hit: false,
        }
    }

    /// Purge expired entries; called periodically by the maintenance task.
    pub fn sweep(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .purge_expired(Instant::now())
    }

    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
