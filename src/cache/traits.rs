//! Core types for the caching system.

use chrono::{DateTime, Utc};

use crate::http::Response;

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Data served from cache without touching the network.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Cached data served because the network failed.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// A cached stand-in page (shell or offline page) served for a different request.
  pub fn fallback(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Fallback,
      cached_at: Some(cached_at),
    }
  }

  /// Data generated locally because neither network nor cache could answer.
  pub fn synthesized(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Synthesized,
      cached_at: None,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  Network,
  /// Cache hit on a cache-first path
  Cache,
  /// Network unavailable, serving the cached entry for the same request
  Offline,
  /// Network unavailable, serving the shell or offline page
  Fallback,
  Synthesized,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      CacheSource::Network => "network",
      CacheSource::Cache => "cache",
      CacheSource::Offline => "offline",
      CacheSource::Fallback => "fallback",
      CacheSource::Synthesized => "synthesized",
    };
    f.pad(s)
  }
}

/// Which network responses a strategy writes back into cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePolicy {
  Never,
  /// Status exactly 200, any response type
  Ok200,
  /// Status 200, same-origin and not redirected
  SameOrigin200,
}

impl StorePolicy {
  pub fn admits(&self, response: &Response) -> bool {
    match self {
      StorePolicy::Never => false,
      StorePolicy::Ok200 => response.status == 200,
      StorePolicy::SameOrigin200 => response.is_same_origin_ok(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::ResponseType;

  #[test]
  fn test_store_policy() {
    let ok = Response::new(200, "a");
    let cors = Response::new(200, "a").with_type(ResponseType::Cors);
    let not_found = Response::new(404, "");

    assert!(!StorePolicy::Never.admits(&ok));
    assert!(StorePolicy::Ok200.admits(&cors));
    assert!(!StorePolicy::Ok200.admits(&not_found));
    assert!(StorePolicy::SameOrigin200.admits(&ok));
    assert!(!StorePolicy::SameOrigin200.admits(&cors));
    assert!(!StorePolicy::SameOrigin200.admits(&Response::opaque()));
  }
}
