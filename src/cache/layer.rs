//! Cache layer that orchestrates the cache-first fetch policy.

use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheResult, CacheSource, CachedResponse, RequestKey};
use crate::db::StorageError;
use crate::http::{Request, Response, ResponseType};
use crate::net::NetworkError;

/// Path fragments that mark a response as worth keeping.
pub const CACHEABLE_PATHS: &[&str] = &["/api/", "/static/"];

/// Image extensions that mark a response as worth keeping.
pub const CACHEABLE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"];

/// Whether a successful response for `url` goes into the dynamic bucket.
pub fn should_cache(url: &str) -> bool {
  CACHEABLE_PATHS.iter().any(|p| url.contains(p))
    || CACHEABLE_EXTENSIONS.iter().any(|ext| url.ends_with(ext))
}

/// Names of the two live buckets for one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketNames {
  pub static_bucket: String,
  pub dynamic_bucket: String,
}

impl BucketNames {
  pub fn new(static_prefix: &str, dynamic_prefix: &str, version: &str) -> Self {
    Self {
      static_bucket: format!("{}-{}", static_prefix, version),
      dynamic_bucket: format!("{}-{}", dynamic_prefix, version),
    }
  }

  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_bucket || name == self.dynamic_bucket
  }
}

/// Cache layer that manages caching logic and network fetching.
///
/// Sits between intercepted requests and the network: serves hits without a
/// round-trip, grows the dynamic bucket from successful responses, and falls
/// back to cached content when the network is gone.
#[derive(Clone)]
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
  buckets: BucketNames,
  /// Key of the page served for failed navigations
  offline_page: RequestKey,
  /// Dynamic-bucket writes still in flight
  pending_writes: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl CacheLayer {
  pub fn new(
    storage: Arc<dyn CacheStorage>,
    buckets: BucketNames,
    offline_page: RequestKey,
  ) -> Self {
    Self {
      storage,
      buckets,
      offline_page,
      pending_writes: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn buckets(&self) -> &BucketNames {
    &self.buckets
  }

  pub fn storage(&self) -> &Arc<dyn CacheStorage> {
    &self.storage
  }

  /// Write the install manifest into the static bucket as one batch.
  pub fn precache(&self, entries: &[(RequestKey, Response)]) -> Result<(), StorageError> {
    self.storage.put_all(&self.buckets.static_bucket, entries)
  }

  /// Delete every bucket that does not belong to the current version.
  pub fn evict_stale(&self) -> Result<Vec<String>, StorageError> {
    let mut evicted = Vec::new();
    for name in self.storage.bucket_names()? {
      if self.buckets.is_current(&name) {
        continue;
      }
      if self.storage.delete_bucket(&name)? {
        debug!(bucket = %name, "deleted stale bucket");
        evicted.push(name);
      }
    }
    Ok(evicted)
  }

  /// Look up a key across all buckets. Read failures count as misses.
  pub fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
    match self.storage.match_any(key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(%key, error = %e, "cache lookup failed");
        None
      }
    }
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - any hit is returned immediately, never revalidated
  /// 2. On miss, fetch from network
  /// 3. Successful same-origin responses to cacheable URLs are written to the
  ///    dynamic bucket in the background
  /// 4. On network failure, navigations get the offline page and other
  ///    requests get whatever the cache holds for them
  pub async fn fetch<F, Fut>(
    &self,
    request: &Request,
    fetcher: F,
  ) -> Result<CacheResult<Response>, NetworkError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, NetworkError>>,
  {
    let key = request.key();

    if let Some(cached) = self.lookup(&key) {
      debug!(%key, bucket = %cached.bucket, "cache hit");
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    match fetcher().await {
      Ok(response) => {
        if is_storable(&response) && should_cache(key.url()) {
          self.store_in_background(key, response.clone());
        }
        Ok(CacheResult::from_network(response))
      }
      Err(err) => {
        debug!(%key, error = %err, "network failed, trying cache");
        let (fallback_key, source) = if request.is_navigation() {
          (&self.offline_page, CacheSource::OfflinePage)
        } else {
          (&key, CacheSource::CacheFallback)
        };

        match self.lookup(fallback_key) {
          Some(cached) => Ok(CacheResult::offline(cached.response, source, cached.cached_at)),
          None => Err(err),
        }
      }
    }
  }

  /// Persist a response copy without holding up the caller.
  fn store_in_background(&self, key: RequestKey, response: Response) {
    let storage = Arc::clone(&self.storage);
    let bucket = self.buckets.dynamic_bucket.clone();

    let handle = tokio::task::spawn_blocking(move || {
      match storage.put(&bucket, &key, &response) {
        Ok(()) => debug!(%key, %bucket, "stored response"),
        Err(e) => warn!(%key, %bucket, error = %e, "dynamic cache write failed"),
      }
    });

    if let Ok(mut pending) = self.pending_writes.lock() {
      pending.retain(|h| !h.is_finished());
      pending.push(handle);
    }
  }

  /// Wait for every background write started so far.
  pub async fn settle(&self) {
    let handles = match self.pending_writes.lock() {
      Ok(mut pending) => std::mem::take(&mut *pending),
      Err(_) => return,
    };

    for result in join_all(handles).await {
      if let Err(e) = result {
        warn!(error = %e, "background cache write did not finish");
      }
    }
  }
}

/// Only complete same-origin 200 responses are stored.
fn is_storable(response: &Response) -> bool {
  response.status == 200 && response.response_type == ResponseType::Basic
}
