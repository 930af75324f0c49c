//! Cached reads. Views go through here instead of calling the API directly,
//! so identical queries share one request and one result.

use std::sync::Arc;

use super::cache::DeskQueryKey;
use super::types::{Building, Group, Order, OrderId, Page, Sector, Tag, User, UserId};
use super::DeskApi;
use crate::cache::{CacheLayer, CacheResult};
use crate::error::DeskResult;
use crate::filter::FilterSnapshot;
use tracing::warn;

/// Upper bound when walking every order page for the dashboard
const MAX_PAGES: u32 = 50;

pub type Cached<T> = DeskResult<CacheResult<Arc<T>>>;

/// Collects unfiltered order pages until the backend reports no more or
/// `max_pages` is reached. Hitting the cap leaves the result partial.
async fn walk_orders<A: DeskApi>(api: &A, max_pages: u32) -> DeskResult<Vec<Order>> {
  let filters = FilterSnapshot::default();
  let mut orders = Vec::new();
  let mut page = 1;
  loop {
    let batch = api.list_orders(page, &filters).await?;
    orders.extend(batch.items);
    if !batch.has_next {
      break;
    }
    if page >= max_pages {
      warn!(
        pages = page,
        loaded = orders.len(),
        total = batch.total,
        "order walk stopped at page cap, statistics are partial"
      );
      break;
    }
    page += 1;
  }
  Ok(orders)
}

#[derive(Clone)]
pub struct DeskService<A: DeskApi> {
  api: A,
  cache: CacheLayer,
}

impl<A: DeskApi> DeskService<A> {
  pub fn new(api: A, cache: CacheLayer) -> Self {
    Self { api, cache }
  }

  pub fn api(&self) -> &A {
    &self.api
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  /// One page of orders under a debounced filter snapshot.
  pub async fn orders(&self, page: u32, filters: &FilterSnapshot) -> Cached<Page<Order>> {
    let key = DeskQueryKey::Orders {
      page,
      filters: filters.clone(),
    };
    let api = self.api.clone();
    let filters = filters.clone();
    self
      .cache
      .fetch(&key, move || {
        let api = api.clone();
        let filters = filters.clone();
        async move { api.list_orders(page, &filters).await }
      })
      .await
  }

  /// Every order, unfiltered, for dashboard statistics.
  pub async fn all_orders(&self) -> Cached<Vec<Order>> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&DeskQueryKey::AllOrders, move || {
        let api = api.clone();
        async move { walk_orders(&api, MAX_PAGES).await }
      })
      .await
  }

  /// Single order including its chat history.
  pub async fn order(&self, id: OrderId) -> Cached<Order> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&DeskQueryKey::Order { id }, move || {
        let api = api.clone();
        async move { api.get_order(id).await }
      })
      .await
  }

  pub async fn users(&self, page: u32, search: &str) -> Cached<Page<User>> {
    let search = search.trim().to_string();
    let key = DeskQueryKey::Users {
      page,
      search: search.clone(),
    };
    let api = self.api.clone();
    self
      .cache
      .fetch(&key, move || {
        let api = api.clone();
        let search = search.clone();
        async move { api.list_users(page, &search).await }
      })
      .await
  }

  pub async fn user(&self, id: UserId) -> Cached<User> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&DeskQueryKey::User { id }, move || {
        let api = api.clone();
        async move { api.get_user(id).await }
      })
      .await
  }

  pub async fn current_user(&self) -> Cached<User> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&DeskQueryKey::CurrentUser, move || {
        let api = api.clone();
        async move { api.current_user().await }
      })
      .await
  }

  pub async fn tags(&self) -> Cached<Vec<Tag>> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&DeskQueryKey::Tags, move || {
        let api = api.clone();
        async move { api.list_tags().await }
      })
      .await
  }

  pub async fn buildings(&self) -> Cached<Vec<Building>> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&DeskQueryKey::Buildings, move || {
        let api = api.clone();
        async move { api.list_buildings().await }
      })
      .await
  }

  pub async fn sectors(&self) -> Cached<Vec<Sector>> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&DeskQueryKey::Sectors, move || {
        let api = api.clone();
        async move { api.list_sectors().await }
      })
      .await
  }

  pub async fn groups(&self) -> Cached<Vec<Group>> {
    let api = self.api.clone();
    self
      .cache
      .fetch(&DeskQueryKey::Groups, move || {
        let api = api.clone();
        async move { api.list_groups().await }
      })
      .await
  }
}
