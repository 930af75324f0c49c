//! Query cache: stale-while-revalidate reads, coalesced fetches, and
//! invalidation after mutations.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::storage::{CacheStorage, SnapshotRecord};
use super::traits::{CacheEvent, CacheResult, Cacheable, KeyPattern, QueryKey};
use crate::error::{DeskError, DeskResult};

type AnyValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, DeskResult<AnyValue>>>;

/// Freshness and retry settings.
#[derive(Debug, Clone)]
pub struct CachePolicy {
  /// How long before cached data is considered stale
  pub stale_time: Duration,
  /// Extra attempts after the first failed fetch
  pub retries: u32,
  /// Fixed pause between attempts
  pub retry_delay: Duration,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(30),
      retries: 3,
      retry_delay: Duration::from_secs(1),
    }
  }
}

struct Entry {
  resource: &'static str,
  item: Option<String>,
  description: String,
  value: Option<AnyValue>,
  fetched_at: Option<Instant>,
  cached_at: Option<DateTime<Utc>>,
  invalidated: bool,
  /// Bumped on every invalidation so older fetches cannot mark the entry fresh
  generation: u64,
  in_flight: Option<SharedFetch>,
}

impl Entry {
  fn new<K: QueryKey>(key: &K) -> Self {
    Self {
      resource: key.resource(),
      item: key.item_id(),
      description: key.description(),
      value: None,
      fetched_at: None,
      cached_at: None,
      invalidated: false,
      generation: 0,
      in_flight: None,
    }
  }

  fn is_fresh(&self, stale_time: Duration) -> bool {
    match self.fetched_at {
      Some(at) => !self.invalidated && at.elapsed() < stale_time,
      None => false,
    }
  }

  fn matches(&self, hash: &str, pattern: &KeyPattern) -> bool {
    pattern.matches(hash, self.resource, self.item.as_deref())
  }
}

/// Process-wide query cache.
///
/// Cloning is cheap and every clone shares the same entries, so one instance
/// is created at startup and handed to every consumer.
#[derive(Clone)]
pub struct CacheLayer {
  entries: Arc<Mutex<HashMap<String, Entry>>>,
  storage: Arc<dyn CacheStorage>,
  policy: CachePolicy,
  events: broadcast::Sender<CacheEvent>,
}

impl CacheLayer {
  /// Create a new cache layer with the given snapshot storage.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      entries: Arc::new(Mutex::new(HashMap::new())),
      storage: Arc::new(storage),
      policy: CachePolicy::default(),
      events,
    }
  }

  pub fn with_policy(mut self, policy: CachePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  /// Receive invalidation/update notifications. Dropping the receiver
  /// unsubscribes.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  fn lock(&self) -> DeskResult<MutexGuard<'_, HashMap<String, Entry>>> {
    self
      .entries
      .lock()
      .map_err(|e| DeskError::Cache(format!("lock poisoned: {}", e)))
  }

  /// Read through the cache.
  ///
  /// 1. Fresh entry: return it, no network
  /// 2. Stale entry: return it and refresh in the background
  /// 3. Missing entry: fetch, joining any fetch already in flight for the key
  /// 4. Fetch failed after retries: serve the persisted snapshot if any
  pub async fn fetch<K, T, F, Fut>(&self, key: &K, fetcher: F) -> DeskResult<CacheResult<Arc<T>>>
  where
    K: QueryKey,
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DeskResult<T>> + Send + 'static,
  {
    let hash = key.cache_hash();

    let pending = {
      let mut entries = self.lock()?;
      let entry = entries
        .entry(hash.clone())
        .or_insert_with(|| Entry::new(key));

      if let Some(value) = entry.value.clone() {
        let cached_at = entry.cached_at.unwrap_or_else(Utc::now);
        if entry.is_fresh(self.policy.stale_time) {
          debug!(query = %entry.description, "cache hit");
          return Ok(CacheResult::from_cache(
            downcast(value, &hash)?,
            cached_at,
            false,
          ));
        }

        if entry.in_flight.is_none() {
          debug!(query = %entry.description, "stale, revalidating in background");
          self.start_fetch(&hash, entry, fetcher);
        }
        return Ok(CacheResult::from_cache(
          downcast(value, &hash)?,
          cached_at,
          true,
        ));
      }

      match &entry.in_flight {
        Some(in_flight) => {
          debug!(query = %entry.description, "joining in-flight fetch");
          in_flight.clone()
        }
        None => {
          debug!(query = %entry.description, "cache miss");
          self.start_fetch(&hash, entry, fetcher)
        }
      }
    };

    match pending.await {
      Ok(value) => Ok(CacheResult::from_network(downcast(value, &hash)?)),
      Err(err) => match self.load_snapshot::<T>(&hash) {
        Some((data, cached_at)) => {
          warn!(error = %err, "fetch failed, serving offline snapshot");
          Ok(CacheResult::offline(Arc::new(data), cached_at))
        }
        None => Err(err),
      },
    }
  }

  /// Begin a fetch for `entry` and register it as the in-flight one.
  ///
  /// The fetch is driven by its own task, so callers that stop waiting do not
  /// cancel the request.
  fn start_fetch<T, F, Fut>(&self, hash: &str, entry: &mut Entry, fetcher: F) -> SharedFetch
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DeskResult<T>> + Send + 'static,
  {
    let generation = entry.generation;
    let cache = self.clone();
    let hash = hash.to_string();
    let description = entry.description.clone();

    let fut: BoxFuture<'static, DeskResult<AnyValue>> = async move {
      let result = retry_fixed(&cache.policy, &description, &fetcher).await;
      cache.finish_fetch(&hash, generation, result)
    }
    .boxed();
    let shared = fut.shared();

    entry.in_flight = Some(shared.clone());
    tokio::spawn(shared.clone());
    shared
  }

  /// Store the outcome of a fetch and notify subscribers.
  fn finish_fetch<T: Cacheable>(
    &self,
    hash: &str,
    generation: u64,
    result: DeskResult<T>,
  ) -> DeskResult<AnyValue> {
    let value = match result {
      Ok(value) => value,
      Err(err) => {
        if let Ok(mut entries) = self.lock() {
          if let Some(entry) = entries.get_mut(hash) {
            entry.in_flight = None;
          }
        }
        return Err(err);
      }
    };

    let snapshot = serde_json::to_vec(&value);
    let value: AnyValue = Arc::new(value);

    let record = {
      let mut entries = self.lock()?;
      match entries.get_mut(hash) {
        Some(entry) => {
          entry.value = Some(Arc::clone(&value));
          entry.fetched_at = Some(Instant::now());
          entry.cached_at = Some(Utc::now());
          entry.in_flight = None;
          // Invalidated while the request was out: keep it stale
          entry.invalidated = entry.generation != generation;
          (!entry.invalidated).then(|| {
            (
              entry.resource,
              entry.item.clone(),
              entry.description.clone(),
            )
          })
        }
        // Removed while in flight; nothing to update
        None => None,
      }
    };

    if let (Some((resource, item, description)), Ok(data)) = (record, snapshot) {
      let stored = self.storage.store(SnapshotRecord {
        hash,
        resource,
        item: item.as_deref(),
        description: &description,
        data: &data,
      });
      if let Err(err) = stored {
        warn!(error = %err, "failed to persist cache snapshot");
      }
    }

    let _ = self.events.send(CacheEvent::Updated {
      hash: hash.to_string(),
    });
    Ok(value)
  }

  fn load_snapshot<T: Cacheable>(&self, hash: &str) -> Option<(T, DateTime<Utc>)> {
    let snapshot = match self.storage.load(hash) {
      Ok(Some(snapshot)) => snapshot,
      Ok(None) => return None,
      Err(err) => {
        warn!(error = %err, "failed to read cache snapshot");
        return None;
      }
    };
    match serde_json::from_slice(&snapshot.data) {
      Ok(data) => Some((data, snapshot.cached_at)),
      Err(err) => {
        warn!(error = %err, "discarding unreadable cache snapshot");
        None
      }
    }
  }

  /// Mark matching entries stale and tell mounted consumers to refetch.
  ///
  /// Returns the number of in-memory entries affected.
  pub fn invalidate(&self, pattern: &KeyPattern) -> DeskResult<usize> {
    let hashes: Vec<String> = {
      let mut entries = self.lock()?;
      entries
        .iter_mut()
        .filter(|(hash, entry)| entry.matches(hash, pattern))
        .map(|(hash, entry)| {
          entry.invalidated = true;
          entry.generation += 1;
          hash.clone()
        })
        .collect()
    };

    self.storage.remove(pattern)?;
    debug!(?pattern, count = hashes.len(), "invalidated");

    for hash in &hashes {
      let _ = self.events.send(CacheEvent::Invalidated { hash: hash.clone() });
    }
    Ok(hashes.len())
  }

  /// Drop matching entries entirely.
  pub fn remove(&self, pattern: &KeyPattern) -> DeskResult<usize> {
    let hashes: Vec<String> = {
      let mut entries = self.lock()?;
      let hashes: Vec<String> = entries
        .iter()
        .filter(|(hash, entry)| entry.matches(hash, pattern))
        .map(|(hash, _)| hash.clone())
        .collect();
      for hash in &hashes {
        entries.remove(hash);
      }
      hashes
    };

    self.storage.remove(pattern)?;

    for hash in &hashes {
      let _ = self.events.send(CacheEvent::Removed { hash: hash.clone() });
    }
    Ok(hashes.len())
  }

  /// Seed or replace an entry with a known-good value.
  pub fn set_value<K: QueryKey, T: Cacheable>(&self, key: &K, value: T) -> DeskResult<Arc<T>> {
    let hash = key.cache_hash();
    let data = serde_json::to_vec(&value)?;
    let value = Arc::new(value);

    {
      let mut entries = self.lock()?;
      let entry = entries
        .entry(hash.clone())
        .or_insert_with(|| Entry::new(key));
      entry.value = Some(Arc::clone(&value) as AnyValue);
      entry.fetched_at = Some(Instant::now());
      entry.cached_at = Some(Utc::now());
      entry.invalidated = false;
      // Anything in flight predates this value
      entry.generation += 1;
    }

    self.storage.store(SnapshotRecord {
      hash: &hash,
      resource: key.resource(),
      item: key.item_id().as_deref(),
      description: &key.description(),
      data: &data,
    })?;
    let _ = self.events.send(CacheEvent::Updated { hash });
    Ok(value)
  }

  /// Rewrite in-memory values of type `T` under `pattern` in place.
  ///
  /// `edit` returns `None` to leave a value alone. Entries holding another
  /// type are skipped. Freshness is untouched, so callers that also want a
  /// server copy invalidate afterwards. Returns the number of entries changed.
  pub fn update_values<T, F>(&self, pattern: &KeyPattern, edit: F) -> DeskResult<usize>
  where
    T: Cacheable,
    F: Fn(&T) -> Option<T>,
  {
    let hashes: Vec<String> = {
      let mut entries = self.lock()?;
      entries
        .iter_mut()
        .filter(|(hash, entry)| entry.matches(hash, pattern))
        .filter_map(|(hash, entry)| {
          let current = entry.value.clone()?.downcast::<T>().ok()?;
          let next = edit(&current)?;
          entry.value = Some(Arc::new(next) as AnyValue);
          Some(hash.clone())
        })
        .collect()
    };

    debug!(?pattern, count = hashes.len(), "updated in place");
    for hash in &hashes {
      let _ = self.events.send(CacheEvent::Updated { hash: hash.clone() });
    }
    Ok(hashes.len())
  }

  /// Current in-memory value, fresh or not, without fetching.
  pub fn peek<K: QueryKey, T: Cacheable>(&self, key: &K) -> Option<Arc<T>> {
    let hash = key.cache_hash();
    let entries = self.lock().ok()?;
    let value = entries.get(&hash)?.value.clone()?;
    value.downcast::<T>().ok()
  }

  /// Whether a fetch is currently running for the key.
  pub fn is_fetching<K: QueryKey>(&self, key: &K) -> bool {
    let hash = key.cache_hash();
    self
      .lock()
      .map(|entries| {
        entries
          .get(&hash)
          .map(|e| e.in_flight.is_some())
          .unwrap_or(false)
      })
      .unwrap_or(false)
  }
}

fn downcast<T: Cacheable>(value: AnyValue, hash: &str) -> DeskResult<Arc<T>> {
  value
    .downcast::<T>()
    .map_err(|_| DeskError::Cache(format!("type mismatch for cached query {}", hash)))
}

/// Run `fetcher`, retrying retryable failures a fixed number of times.
async fn retry_fixed<T, F, Fut>(policy: &CachePolicy, what: &str, fetcher: &F) -> DeskResult<T>
where
  F: Fn() -> Fut,
  Fut: Future<Output = DeskResult<T>>,
{
  let mut attempt = 0;
  loop {
    match fetcher().await {
      Ok(value) => return Ok(value),
      Err(err) if err.is_retryable() && attempt < policy.retries => {
        attempt += 1;
        warn!(query = %what, attempt, error = %err, "fetch failed, retrying");
        tokio::time::sleep(policy.retry_delay).await;
      }
      Err(err) => return Err(err),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{NoopStorage, SqliteStorage};
  use crate::cache::CacheSource;
  use std::sync::atomic::{AtomicU32, Ordering};

  struct TestKey(&'static str, Option<&'static str>);

  impl QueryKey for TestKey {
    fn resource(&self) -> &'static str {
      "things"
    }
    fn item_id(&self) -> Option<String> {
      self.1.map(String::from)
    }
    fn cache_hash(&self) -> String {
      format!("{}:{:?}", self.0, self.1)
    }
    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  fn counting(
    counter: &Arc<AtomicU32>,
    value: Vec<u32>,
  ) -> impl Fn() -> BoxFuture<'static, DeskResult<Vec<u32>>> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move || {
      let counter = Arc::clone(&counter);
      let value = value.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(value)
      }
      .boxed()
    }
  }

  fn quick_policy() -> CachePolicy {
    CachePolicy {
      stale_time: Duration::from_secs(30),
      retries: 2,
      retry_delay: Duration::from_millis(100),
    }
  }

  #[tokio::test]
  async fn test_fresh_hit_returns_same_arc() {
    let cache = CacheLayer::new(NoopStorage).with_policy(quick_policy());
    let calls = Arc::new(AtomicU32::new(0));
    let key = TestKey("list", None);

    let first = cache.fetch(&key, counting(&calls, vec![1])).await.unwrap();
    let second = cache.fetch(&key, counting(&calls, vec![2])).await.unwrap();

    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert!(Arc::ptr_eq(&first.data, &second.data));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_distinct_keys_do_not_share_data() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = Arc::new(AtomicU32::new(0));

    let a = cache
      .fetch(&TestKey("a", None), counting(&calls, vec![1]))
      .await
      .unwrap();
    let b = cache
      .fetch(&TestKey("b", None), counting(&calls, vec![2]))
      .await
      .unwrap();

    assert_eq!(*a.data, vec![1]);
    assert_eq!(*b.data, vec![2]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_update_values_rewrites_matching_entries_only() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = Arc::new(AtomicU32::new(0));
    let list = TestKey("list", None);
    let item = TestKey("item", Some("1"));
    cache.fetch(&list, counting(&calls, vec![1, 2])).await.unwrap();
    cache.fetch(&item, counting(&calls, vec![1])).await.unwrap();

    let changed = cache
      .update_values::<Vec<u32>, _>(&KeyPattern::Lists("things"), |v| {
        v.contains(&1)
          .then(|| v.iter().copied().filter(|n| *n != 1).collect())
      })
      .unwrap();
    assert_eq!(changed, 1);

    let read = cache.fetch(&list, counting(&calls, vec![9])).await.unwrap();
    assert_eq!(*read.data, vec![2]);
    assert_eq!(read.source, CacheSource::CacheFresh);
    let untouched = cache.peek::<_, Vec<u32>>(&item).unwrap();
    assert_eq!(*untouched, vec![1]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_fetches_are_coalesced() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = Arc::new(AtomicU32::new(0));
    let key = TestKey("slow", None);

    let slow = {
      let calls = Arc::clone(&calls);
      move || {
        let calls = Arc::clone(&calls);
        async move {
          calls.fetch_add(1, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(50)).await;
          Ok::<_, DeskError>(vec![7u32])
        }
      }
    };

    let (a, b, c) = tokio::join!(
      cache.fetch(&key, slow.clone()),
      cache.fetch(&key, slow.clone()),
      cache.fetch(&key, slow),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(Arc::ptr_eq(&a.data, &b.data));
    assert!(Arc::ptr_eq(&b.data, &c.data));
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_value_served_while_revalidating() {
    let cache = CacheLayer::new(NoopStorage).with_policy(quick_policy());
    let calls = Arc::new(AtomicU32::new(0));
    let key = TestKey("list", None);

    cache.fetch(&key, counting(&calls, vec![1])).await.unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;

    let stale = cache.fetch(&key, counting(&calls, vec![2])).await.unwrap();
    assert_eq!(stale.source, CacheSource::CacheStale);
    assert_eq!(*stale.data, vec![1]);

    // Let the background refresh land
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let fresh = cache.fetch(&key, counting(&calls, vec![3])).await.unwrap();
    assert_eq!(fresh.source, CacheSource::CacheFresh);
    assert_eq!(*fresh.data, vec![2]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_retries_then_surfaces_typed_error() {
    let cache = CacheLayer::new(NoopStorage).with_policy(quick_policy());
    let calls = Arc::new(AtomicU32::new(0));
    let key = TestKey("broken", None);

    let failing = {
      let calls = Arc::clone(&calls);
      move || {
        let calls = Arc::clone(&calls);
        async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Err::<Vec<u32>, _>(DeskError::Transport("connection refused".into()))
        }
      }
    };

    let result = cache.fetch(&key, failing).await;
    assert_eq!(
      result.unwrap_err(),
      DeskError::Transport("connection refused".into())
    );
    // First attempt + 2 retries
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!cache.is_fetching(&key));
  }

  #[tokio::test]
  async fn test_non_retryable_errors_fail_fast() {
    let cache = CacheLayer::new(NoopStorage).with_policy(quick_policy());
    let calls = Arc::new(AtomicU32::new(0));

    let failing = {
      let calls = Arc::clone(&calls);
      move || {
        let calls = Arc::clone(&calls);
        async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Err::<Vec<u32>, _>(DeskError::Decode("bad".into()))
        }
      }
    };

    assert!(cache.fetch(&TestKey("x", None), failing).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_retry_recovers() {
    let cache = CacheLayer::new(NoopStorage).with_policy(quick_policy());
    let calls = Arc::new(AtomicU32::new(0));

    let flaky = {
      let calls = Arc::clone(&calls);
      move || {
        let calls = Arc::clone(&calls);
        async move {
          if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(DeskError::Api {
              status: 502,
              message: "bad gateway".into(),
            })
          } else {
            Ok(vec![5u32])
          }
        }
      }
    };

    let result = cache.fetch(&TestKey("flaky", None), flaky).await.unwrap();
    assert_eq!(*result.data, vec![5]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch_and_notifies() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = Arc::new(AtomicU32::new(0));
    let list = TestKey("list", None);
    let item = TestKey("item", Some("4"));
    let mut events = cache.subscribe();

    cache.fetch(&list, counting(&calls, vec![1])).await.unwrap();
    cache.fetch(&item, counting(&calls, vec![4])).await.unwrap();
    while events.try_recv().is_ok() {}

    assert_eq!(cache.invalidate(&KeyPattern::Lists("things")).unwrap(), 1);
    assert_eq!(
      events.try_recv().unwrap(),
      CacheEvent::Invalidated {
        hash: list.cache_hash()
      }
    );

    // Stale list is still served while the refresh runs
    let stale = cache.fetch(&list, counting(&calls, vec![2])).await.unwrap();
    assert_eq!(stale.source, CacheSource::CacheStale);

    // Item untouched
    let item_again = cache.fetch(&item, counting(&calls, vec![9])).await.unwrap();
    assert_eq!(item_again.source, CacheSource::CacheFresh);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidation_during_fetch_keeps_entry_stale() {
    let cache = CacheLayer::new(NoopStorage);
    let key = TestKey("race", None);

    let slow = || async {
      tokio::time::sleep(Duration::from_millis(50)).await;
      Ok::<_, DeskError>(vec![1u32])
    };

    let fetching = cache.fetch(&key, slow);
    let invalidating = async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      cache.invalidate(&KeyPattern::Lists("things")).unwrap();
    };
    let (result, _) = tokio::join!(fetching, invalidating);
    assert_eq!(*result.unwrap().data, vec![1]);

    let next = cache
      .fetch(&key, || async { Ok::<_, DeskError>(vec![2u32]) })
      .await
      .unwrap();
    assert_eq!(next.source, CacheSource::CacheStale);
  }

  #[tokio::test]
  async fn test_remove_drops_entry() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = Arc::new(AtomicU32::new(0));
    let item = TestKey("item", Some("4"));

    cache.fetch(&item, counting(&calls, vec![4])).await.unwrap();
    assert_eq!(cache.remove(&KeyPattern::item("things", 4)).unwrap(), 1);
    assert!(cache.peek::<_, Vec<u32>>(&item).is_none());

    let again = cache.fetch(&item, counting(&calls, vec![4])).await.unwrap();
    assert_eq!(again.source, CacheSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_set_value_seeds_entry() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = Arc::new(AtomicU32::new(0));
    let item = TestKey("item", Some("8"));

    let seeded = cache.set_value(&item, vec![8u32]).unwrap();
    let read = cache.fetch(&item, counting(&calls, vec![0])).await.unwrap();

    assert!(Arc::ptr_eq(&seeded, &read.data));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_offline_snapshot_after_failure() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let key = TestKey("list", None);

    // Previous session persisted a result
    storage
      .store(SnapshotRecord {
        hash: &key.cache_hash(),
        resource: "things",
        item: None,
        description: "list",
        data: b"[3,4]",
      })
      .unwrap();

    let cache = CacheLayer::new(storage).with_policy(CachePolicy {
      retries: 0,
      ..quick_policy()
    });
    let result = cache
      .fetch(&key, || async {
        Err::<Vec<u32>, _>(DeskError::Transport("offline".into()))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(*result.data, vec![3, 4]);
  }

  #[tokio::test]
  async fn test_dropped_waiter_does_not_cancel_fetch() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = Arc::new(AtomicU32::new(0));
    let key = TestKey("bg", None);

    let (release, gate) = tokio::sync::oneshot::channel::<()>();
    let gate = Arc::new(tokio::sync::Mutex::new(Some(gate)));
    let fetcher = {
      let calls = Arc::clone(&calls);
      move || {
        let calls = Arc::clone(&calls);
        let gate = Arc::clone(&gate);
        async move {
          if let Some(gate) = gate.lock().await.take() {
            let _ = gate.await;
          }
          calls.fetch_add(1, Ordering::SeqCst);
          Ok::<_, DeskError>(vec![1u32])
        }
      }
    };

    // Start and abandon the read
    let waiter = cache.fetch(&key, fetcher);
    tokio::select! {
      _ = waiter => panic!("fetch should still be blocked"),
      _ = tokio::task::yield_now() => {}
    }
    assert!(cache.is_fetching(&key));

    release.send(()).unwrap();
    for _ in 0..10 {
      tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*cache.peek::<_, Vec<u32>>(&key).unwrap(), vec![1]);
  }
}
