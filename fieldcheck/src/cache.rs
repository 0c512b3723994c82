//! Bounded, thread-safe caches for descriptors and compiled expressions
//!
//! Both caches are least-recently-used and bounded by entry count. A capacity
//! of zero disables a cache: every lookup misses and nothing is stored.
//!
//! Lookups never hold the lock while building a missing entry. Two threads
//! that miss on the same key may both build it; builds are pure, so the only
//! cost is duplicate work, and whichever insert lands last is kept.

use crate::config::{CacheSettings, Config};
use crate::descriptor::ValidatedType;
use crate::error::Result;
use crate::expression::Expression;
use lru::LruCache;
use std::any::TypeId;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// A least-recently-used map shared between threads
pub struct BoundedCache<K: Hash + Eq, V> {
    name: &'static str,
    entries: Option<Mutex<LruCache<K, Arc<V>>>>,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries; zero disables it
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// Maximum number of entries, zero when disabled
    pub fn capacity(&self) -> usize {
        self.entries
            .as_ref()
            .map_or(0, |entries| lock(entries).cap().get())
    }

    /// Number of entries currently stored
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| lock(entries).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an entry, marking it most recently used
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entries = self.entries.as_ref()?;
        lock(entries).get(key).cloned()
    }

    /// Store an entry, evicting the least recently used one when full
    pub fn insert(&self, key: K, value: Arc<V>) {
        if let Some(entries) = &self.entries {
            lock(entries).put(key, value);
        }
    }

    /// Return the cached entry for `key`, building and storing it on a miss
    pub fn get_or_try_insert_with<Q, E, F>(&self, key: &Q, build: F) -> std::result::Result<Arc<V>, E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(hit) = self.get(key) {
            trace!("{} cache hit", self.name);
            return Ok(hit);
        }

        let value = Arc::new(build()?);
        self.insert(key.to_owned(), Arc::clone(&value));
        Ok(value)
    }

    /// Infallible form of [`BoundedCache::get_or_try_insert_with`]
    pub fn get_or_insert_with<Q, F>(&self, key: &Q, build: F) -> Arc<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce() -> V,
    {
        match self.get_or_try_insert_with(key, || Ok::<V, std::convert::Infallible>(build())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

// The cache holds no invariant a panicking builder could break: builds happen
// outside the lock, so a poisoned guard is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Descriptor cache key: the same type read under two configurations yields
/// two independent descriptors
pub type TypeKey = (TypeId, Arc<Config>);

/// The caches shared by validators
///
/// Construct once and hand the same `Arc<Caches>` to every validator that
/// should share compiled state.
pub struct Caches {
    types: BoundedCache<TypeKey, ValidatedType>,
    expressions: BoundedCache<String, Expression>,
}

impl Caches {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            types: BoundedCache::new("type", settings.type_cache_size),
            expressions: BoundedCache::new("expression", settings.expr_cache_size),
        }
    }

    /// Caches sized from the environment, see [`CacheSettings::from_env`]
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(CacheSettings::from_env()?))
    }

    /// Caches that never store anything
    pub fn disabled() -> Self {
        Self::new(CacheSettings::disabled())
    }

    pub fn types(&self) -> &BoundedCache<TypeKey, ValidatedType> {
        &self.types
    }

    pub fn expressions(&self) -> &BoundedCache<String, Expression> {
        &self.expressions
    }

    /// Compiled program for `source`, compiling on a miss
    pub fn expression(&self, source: &str) -> Result<Arc<Expression>> {
        self.expressions
            .get_or_try_insert_with(source, || Expression::compile(source))
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}
