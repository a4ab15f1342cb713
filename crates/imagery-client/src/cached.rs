//! Memoizing wrapper around any [`ImagerySource`].

use async_trait::async_trait;
use map_common::MapResult;
use raster_io::{CacheStats, ResultCache};
use tokio::sync::Mutex;
use tracing::debug;

use crate::query::{FetchKey, ImageryQuery, VisParams};
use crate::source::{ImageryResult, ImagerySource};

/// Caches results keyed by the complete query plus visualization.
///
/// The cache belongs to this value; dropping it or calling [`clear`]
/// discards every entry. Failed fetches are not cached.
///
/// [`clear`]: CachedImagerySource::clear
pub struct CachedImagerySource<S> {
    inner: S,
    cache: Mutex<ResultCache<FetchKey, ImageryResult>>,
}

impl<S: ImagerySource> CachedImagerySource<S> {
    /// `capacity` bounds the entry count; `None` keeps every result.
    pub fn new(inner: S, capacity: Option<usize>) -> Self {
        Self {
            inner,
            cache: Mutex::new(ResultCache::new(capacity)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }
}

#[async_trait]
impl<S: ImagerySource> ImagerySource for CachedImagerySource<S> {
    async fn fetch(
        &self,
        query: &ImageryQuery,
        vis: Option<&VisParams>,
    ) -> MapResult<ImageryResult> {
        let key = query.cache_key(vis);

        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!(collection = %query.collection, "Imagery cache hit");
            return Ok((*hit).clone());
        }

        // The lock is not held across the remote call.
        let result = self.inner.fetch(query, vis).await?;
        self.cache.lock().await.insert(key, result.clone());
        Ok(result)
    }
}
