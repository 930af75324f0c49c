//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Values that can live in the query cache.
///
/// Serialization is only used for the persisted offline snapshots; in memory
/// values are shared as `Arc<T>`.
pub trait Cacheable: Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Cacheable for T where T: Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Identity of a cached query.
pub trait QueryKey {
  /// Resource kind (e.g. "orders", "users"), used by invalidation patterns
  fn resource(&self) -> &'static str;

  /// Item id for single-entity queries, `None` for listings
  fn item_id(&self) -> Option<String>;

  /// Stable, fixed-length hash identifying this query
  fn cache_hash(&self) -> String;

  /// Human-readable description for logs
  fn description(&self) -> String;
}

/// Selects cache entries for invalidation or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
  /// One query by hash
  Exact(String),
  /// Every listing of a resource (all pages, all filters)
  Lists(&'static str),
  /// The single-entity query for one item
  Item(&'static str, String),
  /// Listings and items of a resource
  Resource(&'static str),
}

impl KeyPattern {
  pub fn item(resource: &'static str, id: impl ToString) -> Self {
    KeyPattern::Item(resource, id.to_string())
  }

  pub fn matches(&self, hash: &str, resource: &str, item: Option<&str>) -> bool {
    match self {
      KeyPattern::Exact(h) => h == hash,
      KeyPattern::Lists(r) => *r == resource && item.is_none(),
      KeyPattern::Item(r, id) => *r == resource && item == Some(id.as_str()),
      KeyPattern::Resource(r) => *r == resource,
    }
  }
}

/// Notifications for mounted consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// Entry marked stale; consumers showing it should refetch
  Invalidated { hash: String },
  /// A fetch stored a new value
  Updated { hash: String },
  /// Entry dropped (e.g. the item was deleted)
  Removed { hash: String },
}

impl CacheEvent {
  pub fn hash(&self) -> &str {
    match self {
      CacheEvent::Invalidated { hash }
      | CacheEvent::Updated { hash }
      | CacheEvent::Removed { hash } => hash,
    }
  }
}

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
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, stale; a background refresh is running
  CacheStale,
  /// Network unavailable, serving a persisted snapshot
  Offline,
}
