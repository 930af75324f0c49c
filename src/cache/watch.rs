//! Per-consumer view of cache notifications.

use tokio::sync::broadcast::{self, error::TryRecvError};

use super::traits::{CacheEvent, QueryKey};
use super::CacheLayer;

/// Tracks one query hash and reports when its consumer should refetch.
///
/// A view owns one of these while it is on screen; dropping the view drops
/// the subscription.
pub struct CacheWatch {
  rx: broadcast::Receiver<CacheEvent>,
  hash: String,
}

impl CacheWatch {
  pub fn new<K: QueryKey>(cache: &CacheLayer, key: &K) -> Self {
    Self {
      rx: cache.subscribe(),
      hash: key.cache_hash(),
    }
  }

  /// Follow a different key (e.g. after a filter change).
  pub fn track<K: QueryKey>(&mut self, key: &K) {
    self.hash = key.cache_hash();
  }

  pub fn hash(&self) -> &str {
    &self.hash
  }

  /// Drain pending notifications; true if any concerned the tracked key.
  ///
  /// A lagged receiver may have missed one, so lag also counts.
  pub fn poll(&mut self) -> bool {
    let mut hit = false;
    loop {
      match self.rx.try_recv() {
        Ok(event) => {
          if event.hash() == self.hash {
            hit = true;
          }
        }
        Err(TryRecvError::Lagged(_)) => hit = true,
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
      }
    }
    hit
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{KeyPattern, NoopStorage};

  struct Key(&'static str);

  impl QueryKey for Key {
    fn resource(&self) -> &'static str {
      "orders"
    }
    fn item_id(&self) -> Option<String> {
      None
    }
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }
    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  #[tokio::test]
  async fn test_watch_only_reports_tracked_key() {
    let cache = CacheLayer::new(NoopStorage);
    let mut watch = CacheWatch::new(&cache, &Key("mine"));
    assert!(!watch.poll());

    cache.set_value(&Key("other"), vec![1u32]).unwrap();
    assert!(!watch.poll());

    cache.set_value(&Key("mine"), vec![2u32]).unwrap();
    cache.invalidate(&KeyPattern::Lists("orders")).unwrap();
    assert!(watch.poll());
    assert!(!watch.poll());
  }

  #[tokio::test]
  async fn test_track_switches_key() {
    let cache = CacheLayer::new(NoopStorage);
    let mut watch = CacheWatch::new(&cache, &Key("page-1"));
    watch.track(&Key("page-2"));
    assert_eq!(watch.hash(), "page-2");

    cache.set_value(&Key("page-1"), vec![1u32]).unwrap();
    assert!(!watch.poll());
    cache.set_value(&Key("page-2"), vec![2u32]).unwrap();
    assert!(watch.poll());
  }
}
