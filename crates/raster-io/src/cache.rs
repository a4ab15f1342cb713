//! Explicit caches for pipeline results.
//!
//! There is no process-wide cache: every cache is a value owned by the
//! caller, keyed by the complete set of inputs, and invalidated only by
//! key mismatch or an explicit call. Caches keep every entry unless built
//! with a capacity, in which case the least recently used entry is evicted.

use std::fs;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;
use map_common::{MapError, MapResult, Raster};
use tracing::debug;

/// Hit/miss counters for a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Mapping from an input key to a shared result, in LRU order.
pub struct ResultCache<K: Hash + Eq, V> {
    cache: LruCache<K, Arc<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Cache of decoded rasters.
pub type RasterCache<K> = ResultCache<K, Raster>;

impl<K: Hash + Eq + Clone, V> ResultCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1), or
    /// every entry when `capacity` is `None`.
    pub fn new(capacity: Option<usize>) -> Self {
        let cache = match capacity {
            Some(capacity) => {
                LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
            }
            None => LruCache::unbounded(),
        };
        Self {
            cache,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a key, updating LRU order.
    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        match self.cache.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(Arc::clone(value))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert a value, returning the shared handle.
    pub fn insert(&mut self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        if self.cache.len() == self.cache.cap().get() && !self.cache.contains(&key) {
            self.evictions += 1;
        }
        self.cache.put(key, Arc::clone(&value));
        value
    }

    /// Return the cached value or compute, store and return it.
    /// Errors are not cached.
    pub fn get_or_try_insert<F>(&mut self, key: K, compute: F) -> MapResult<Arc<V>>
    where
        F: FnOnce() -> MapResult<V>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = compute()?;
        Ok(self.insert(key, value))
    }

    /// Drop every entry whose key matches the predicate. Returns the count removed.
    pub fn invalidate_where<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let stale: Vec<K> = self
            .cache
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.cache.pop(key);
        }
        stale.len()
    }

    /// Remove one entry.
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.cache.pop(key).is_some()
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            evictions: self.evictions,
        }
    }
}

/// Identity of a raster load: the file as it exists right now plus the band.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadKey {
    pub path: PathBuf,
    pub band: usize,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl LoadKey {
    /// Build a key from current file metadata.
    pub fn for_path(path: &Path, band: usize) -> MapResult<Self> {
        let canonical = fs::canonicalize(path)
            .map_err(|_| MapError::ResourceNotFound(path.display().to_string()))?;
        let meta = fs::metadata(&canonical)?;
        Ok(Self {
            path: canonical,
            band,
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Loader that memoizes decoded rasters by [`LoadKey`].
pub struct CachedLoader {
    cache: RasterCache<LoadKey>,
}

impl CachedLoader {
    /// `capacity` bounds the number of decoded rasters kept; `None` keeps all.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            cache: RasterCache::new(capacity),
        }
    }

    /// Load band 1, reusing a prior decode of the same unchanged file.
    pub fn load(&mut self, path: impl AsRef<Path>) -> MapResult<Arc<Raster>> {
        self.load_band(path, 1)
    }

    pub fn load_band(&mut self, path: impl AsRef<Path>, band: usize) -> MapResult<Arc<Raster>> {
        let path = path.as_ref();
        let key = LoadKey::for_path(path, band)?;
        let source = key.path.clone();
        self.cache.get_or_try_insert(key, || {
            debug!(path = %source.display(), band, "Cache miss, decoding raster");
            crate::geotiff::load_band(&source, band)
        })
    }

    /// Forget every cached band of a file.
    pub fn invalidate(&mut self, path: impl AsRef<Path>) -> usize {
        let target = fs::canonicalize(path.as_ref()).unwrap_or_else(|_| path.as_ref().to_path_buf());
        self.cache.invalidate_where(|key| key.path == target)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
