//! View-side handle on an async fetch.
//!
//! A `Query<T>` owns a fetcher closure and a channel receiver. Views call
//! `fetch()`/`refetch()` and `poll()` it on every tick; the work itself runs
//! on a spawned task. Staleness lives in the cache layer, so a query only
//! tracks what its view should draw.
//!
//! ```ignore
//! let service = service.clone();
//! let mut query = Query::new(move || {
//!   let service = service.clone();
//!   async move { service.order(42).await }
//! });
//! query.fetch();
//!
//! // on tick
//! if query.poll() { /* redraw */ }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cache::CacheResult;
use crate::error::{DeskError, DeskResult};

#[derive(Debug, Clone)]
pub enum QueryState<T> {
  Idle,
  Loading,
  Success(T),
  Error(DeskError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&DeskError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = DeskResult<T>> + Send>>;
type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Query over a cache read: data plus where it came from.
pub type CachedQuery<T> = Query<CacheResult<Arc<T>>>;

pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<DeskResult<T>>>,
}

impl<T: Send + 'static> Query<T> {
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DeskResult<T>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      receiver: None,
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn error(&self) -> Option<&DeskError> {
    self.state.error()
  }

  /// True while a fetch is outstanding, including background refetches
  /// that keep the previous data on screen.
  pub fn is_loading(&self) -> bool {
    self.receiver.is_some()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  /// Start fetching unless a fetch is already in flight.
  pub fn fetch(&mut self) {
    if self.receiver.is_some() {
      return;
    }
    self.start_fetch();
  }

  /// Start a new fetch, discarding the result of any pending one.
  ///
  /// Data already on screen stays there until the new result arrives.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch();
  }

  /// Apply a finished fetch, if any. Returns true when the state changed.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = QueryState::Error(DeskError::Cache("query task ended without a result".into()));
        self.receiver = None;
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    if !self.state.is_success() {
      self.state = QueryState::Loading;
    }

    let future = (self.fetcher)();
    tokio::spawn(async move {
      let _ = tx.send(future.await);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("pending", &self.receiver.is_some())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  #[tokio::test]
  async fn test_query_success() {
    let mut query = Query::new(|| async { Ok(vec![1, 2, 3]) });
    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.is_loading());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.is_success());
    assert!(!query.is_loading());
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_query_error_is_typed() {
    let mut query: Query<i32> = Query::new(|| async {
      Err(DeskError::Api {
        status: 404,
        message: "Not found".into(),
      })
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.is_error());
    assert_eq!(query.error().map(|e| e.status_code()), Some(404));
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut query = Query::new(move || {
      let counter = counter.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(42)
      }
    });

    query.fetch();
    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_refetch_discards_pending() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let mut query = Query::new(move || {
      let counter = counter_clone.clone();
      async move {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(n)
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.refetch();
    tokio::time::sleep(Duration::from_millis(100)).await;

    query.poll();
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_refetch_keeps_previous_data() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let mut query = Query::new(move || {
      let counter = counter_clone.clone();
      async move {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(n)
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(40)).await;
    query.poll();
    assert_eq!(query.data(), Some(&0));

    query.refetch();
    assert!(query.is_loading());
    assert_eq!(query.data(), Some(&0));

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(query.poll());
    assert_eq!(query.data(), Some(&1));
  }
}
