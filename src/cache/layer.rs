//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::http::{Request, Response};

use super::storage::{CacheStorage, CachedResponse};
use super::traits::{CacheResult, StorePolicy};

/// Cache layer that manages caching logic and network fetching.
///
/// Storage errors never fail a strategy: a failed read counts as a miss and a
/// failed write is logged while the network response is still returned.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Exact-key lookup. Entries older than `max_age` are treated as absent.
  pub fn lookup(
    &self,
    namespace: &str,
    request: &Request,
    max_age: Option<Duration>,
  ) -> Option<CachedResponse> {
    let cached = match self.storage.match_request(namespace, request) {
      Ok(cached) => cached?,
      Err(e) => {
        warn!(namespace, key = %request.cache_key(), error = %e, "cache read failed");
        return None;
      }
    };

    if let Some(max_age) = max_age {
      if Utc::now() - cached.cached_at > max_age {
        debug!(namespace, key = %request.cache_key(), "cached entry expired");
        return None;
      }
    }

    Some(cached)
  }

  /// Write `response` if `policy` admits it. Failures are logged, not returned.
  pub fn store(
    &self,
    namespace: &str,
    request: &Request,
    response: &Response,
    policy: StorePolicy,
  ) {
    if !policy.admits(response) {
      return;
    }

    if let Err(e) = self.storage.put(namespace, request, response) {
      warn!(namespace, key = %request.cache_key(), error = %e, "cache write failed");
    }
  }

  /// Fetch with network-first strategy.
  ///
  /// 1. Fetch from network; on success write through per `policy` and return
  /// 2. On network failure or an upstream error status, return the cached
  ///    entry for the same key (offline mode)
  /// 3. With no usable entry, return the failure
  pub async fn network_first<F, Fut>(
    &self,
    namespace: &str,
    request: &Request,
    policy: StorePolicy,
    max_age: Option<Duration>,
    fetcher: F,
  ) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    let err = match live_response(fetcher().await) {
      Ok(response) => {
        self.store(namespace, request, &response, policy);
        return Ok(CacheResult::from_network(response));
      }
      Err(e) => e,
    };

    debug!(url = %request.url, error = %err, "network failed, trying cache");
    match self.lookup(namespace, request, max_age) {
      Some(cached) => Ok(CacheResult::offline(cached.response, cached.cached_at)),
      None => Err(err),
    }
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - if present, return immediately without touching the network
  /// 2. On a miss, fetch from network and write through per `policy`
  /// 3. Network failures and upstream error statuses are returned as errors
  pub async fn cache_first<F, Fut>(
    &self,
    namespace: &str,
    request: &Request,
    policy: StorePolicy,
    fetcher: F,
  ) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    if let Some(cached) = self.lookup(namespace, request, None) {
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    let response = live_response(fetcher().await)?;
    self.store(namespace, request, &response, policy);
    Ok(CacheResult::from_network(response))
  }
}

/// Turn an upstream error status into a failure, so it takes the same
/// fallback path as an unreachable network.
pub fn live_response(fetched: Result<Response>) -> Result<Response> {
  let response = fetched?;
  if response.is_upstream_error() {
    return Err(eyre!(
      "upstream returned {} {}",
      response.status,
      response.status_text
    ));
  }
  Ok(response)
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
