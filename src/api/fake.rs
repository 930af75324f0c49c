//! In-memory backend used by tests.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::types::{
  Building, Group, Location, Message, Order, OrderDraft, OrderId, OrderPatch, OrderStatus, Page,
  Priority, Sector, Tag, TagId, TagRef, User, UserDraft, UserId, UserRef,
};
use super::DeskApi;
use crate::error::{DeskError, DeskResult};
use crate::filter::FilterSnapshot;

pub const PAGE_SIZE: usize = 10;

#[derive(Default)]
struct FakeState {
  orders: BTreeMap<OrderId, Order>,
  users: BTreeMap<UserId, User>,
  tags: BTreeMap<TagId, Tag>,
  me: Option<UserId>,
  next_id: u64,
  calls: HashMap<&'static str, u32>,
  /// Queued failures, consumed one per call
  failures: Vec<DeskError>,
}

#[derive(Clone, Default)]
pub struct FakeApi {
  state: Arc<Mutex<FakeState>>,
  delay: Option<Duration>,
}

pub fn at(offset: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap()
}

pub fn user(id: UserId, username: &str, groups: &[&str]) -> User {
  User {
    id,
    username: username.to_string(),
    email: format!("{}@example.com", username),
    first_name: String::new(),
    last_name: String::new(),
    groups: groups.iter().map(|g| g.to_string()).collect(),
    external_id: None,
  }
}

pub fn order(id: OrderId, title: &str, status: OrderStatus) -> Order {
  Order {
    id,
    title: title.to_string(),
    detail: format!("detail of {}", title),
    status,
    priority: Priority::Medium,
    client: user(100, "client", &[]).as_ref(),
    agents: Vec::new(),
    tags: Vec::new(),
    location: Location::default(),
    created: at(id as i64),
    updated: at(id as i64),
    messages: Vec::new(),
  }
}

pub fn message(id: u64, text: &str, author: UserRef) -> Message {
  Message {
    id,
    text: text.to_string(),
    author,
    attachments: Vec::new(),
    created: at(1000 + id as i64),
  }
}

impl FakeApi {
  pub fn new() -> Self {
    let api = Self::default();
    {
      let mut state = api.state();
      state.next_id = 1000;
      let me = user(1, "agent", &["admin"]);
      state.me = Some(me.id);
      state.users.insert(me.id, me);
      state.users.insert(100, user(100, "client", &[]));
    }
    api
  }

  /// Every call sleeps this long first
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  fn state(&self) -> MutexGuard<'_, FakeState> {
    self.state.lock().unwrap()
  }

  pub fn insert_order(&self, order: Order) {
    self.state().orders.insert(order.id, order);
  }

  pub fn insert_user(&self, user: User) {
    self.state().users.insert(user.id, user);
  }

  pub fn insert_tag(&self, id: TagId, name: &str) {
    self.state().tags.insert(
      id,
      Tag {
        id,
        name: name.to_string(),
      },
    );
  }

  pub fn set_current_user(&self, id: UserId) {
    self.state().me = Some(id);
  }

  pub fn order(&self, id: OrderId) -> Option<Order> {
    self.state().orders.get(&id).cloned()
  }

  pub fn user(&self, id: UserId) -> Option<User> {
    self.state().users.get(&id).cloned()
  }

  pub fn fail_next(&self, err: DeskError) {
    self.state().failures.push(err);
  }

  /// How many times `method` was called
  pub fn calls(&self, method: &str) -> u32 {
    self.state().calls.get(method).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> u32 {
    self.state().calls.values().sum()
  }

  /// Count the call and pop a queued failure, after the configured delay.
  async fn enter(&self, method: &'static str) -> DeskResult<()> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    let mut state = self.state();
    *state.calls.entry(method).or_insert(0) += 1;
    if state.failures.is_empty() {
      Ok(())
    } else {
      Err(state.failures.remove(0))
    }
  }

  fn next_id(state: &mut FakeState) -> u64 {
    state.next_id += 1;
    state.next_id
  }

  fn user_ref(state: &FakeState, id: UserId) -> DeskResult<UserRef> {
    state
      .users
      .get(&id)
      .map(User::as_ref)
      .ok_or_else(|| not_found("user", id))
  }
}

fn not_found(what: &str, id: u64) -> DeskError {
  DeskError::Api {
    status: 404,
    message: format!("{} {} not found", what, id),
  }
}

fn matches(order: &Order, filters: &FilterSnapshot) -> bool {
  if filters.status.is_some_and(|s| s != order.status) {
    return false;
  }
  if filters.priority.is_some_and(|p| p != order.priority) {
    return false;
  }
  if filters.client.is_some_and(|c| c != order.client.id) {
    return false;
  }
  if filters.assigned_to.is_some_and(|a| !order.is_assigned_to(a)) {
    return false;
  }
  if !filters
    .tags
    .iter()
    .all(|t| order.tags.iter().any(|tag| tag.id == *t))
  {
    return false;
  }
  if !filters.search.is_empty() {
    let needle = filters.search.to_lowercase();
    return order.title.to_lowercase().contains(&needle)
      || order.detail.to_lowercase().contains(&needle);
  }
  true
}

fn paginate<T: Clone>(items: Vec<T>, page: u32) -> Page<T> {
  let total = items.len();
  let start = (page.max(1) as usize - 1) * PAGE_SIZE;
  let slice: Vec<T> = items.into_iter().skip(start).take(PAGE_SIZE).collect();
  Page {
    items: slice,
    total: total as u64,
    page,
    has_next: start + PAGE_SIZE < total,
  }
}

impl DeskApi for FakeApi {
  async fn list_orders(&self, page: u32, filters: &FilterSnapshot) -> DeskResult<Page<Order>> {
    self.enter("list_orders").await?;
    let state = self.state();
    let mut orders: Vec<Order> = state
      .orders
      .values()
      .filter(|o| matches(o, filters))
      .map(|o| Order {
        messages: Vec::new(),
        ..o.clone()
      })
      .collect();
    orders.sort_by(|a, b| b.updated.cmp(&a.updated));
    Ok(paginate(orders, page))
  }

  async fn get_order(&self, id: OrderId) -> DeskResult<Order> {
    self.enter("get_order").await?;
    self
      .state()
      .orders
      .get(&id)
      .cloned()
      .ok_or_else(|| not_found("order", id))
  }

  async fn create_order(&self, draft: &OrderDraft) -> DeskResult<Order> {
    self.enter("create_order").await?;
    let mut state = self.state();
    let id = Self::next_id(&mut state);
    let client = Self::user_ref(&state, draft.client)?;
    let agents = draft
      .agents
      .iter()
      .map(|a| Self::user_ref(&state, *a))
      .collect::<DeskResult<Vec<_>>>()?;
    let tags = draft
      .tags
      .iter()
      .filter_map(|t| state.tags.get(t))
      .map(|t| TagRef {
        id: t.id,
        name: t.name.clone(),
      })
      .collect();
    let order = Order {
      id,
      title: draft.title.trim().to_string(),
      detail: draft.detail.clone(),
      status: OrderStatus::Open,
      priority: draft.priority,
      client,
      agents,
      tags,
      location: draft.location.clone(),
      created: at(id as i64),
      updated: at(id as i64),
      messages: Vec::new(),
    };
    state.orders.insert(id, order.clone());
    Ok(order)
  }

  async fn update_order(&self, id: OrderId, patch: &OrderPatch) -> DeskResult<Order> {
    self.enter("update_order").await?;
    let mut state = self.state();
    let agents = match &patch.agents {
      Some(ids) => Some(
        ids
          .iter()
          .map(|a| Self::user_ref(&state, *a))
          .collect::<DeskResult<Vec<_>>>()?,
      ),
      None => None,
    };
    let order = state
      .orders
      .get_mut(&id)
      .ok_or_else(|| not_found("order", id))?;
    if let Some(title) = &patch.title {
      order.title = title.trim().to_string();
    }
    if let Some(detail) = &patch.detail {
      order.detail = detail.clone();
    }
    if let Some(status) = patch.status {
      order.status = status;
    }
    if let Some(priority) = patch.priority {
      order.priority = priority;
    }
    if let Some(agents) = agents {
      order.agents = agents;
    }
    if let Some(location) = &patch.location {
      order.location = location.clone();
    }
    order.updated = at(5000);
    Ok(order.clone())
  }

  async fn delete_order(&self, id: OrderId) -> DeskResult<()> {
    self.enter("delete_order").await?;
    self
      .state()
      .orders
      .remove(&id)
      .map(|_| ())
      .ok_or_else(|| not_found("order", id))
  }

  async fn post_message(&self, order: OrderId, text: &str) -> DeskResult<Message> {
    self.enter("post_message").await?;
    let mut state = self.state();
    let me = state.me.ok_or_else(|| DeskError::Forbidden("anonymous".into()))?;
    let author = Self::user_ref(&state, me)?;
    let id = Self::next_id(&mut state);
    let msg = message(id, text, author);
    state
      .orders
      .get_mut(&order)
      .ok_or_else(|| not_found("order", order))?
      .messages
      .push(msg.clone());
    Ok(msg)
  }

  async fn list_users(&self, page: u32, search: &str) -> DeskResult<Page<User>> {
    self.enter("list_users").await?;
    let needle = search.to_lowercase();
    let users: Vec<User> = self
      .state()
      .users
      .values()
      .filter(|u| needle.is_empty() || u.username.to_lowercase().contains(&needle))
      .cloned()
      .collect();
    Ok(paginate(users, page))
  }

  async fn get_user(&self, id: UserId) -> DeskResult<User> {
    self.enter("get_user").await?;
    self
      .state()
      .users
      .get(&id)
      .cloned()
      .ok_or_else(|| not_found("user", id))
  }

  async fn current_user(&self) -> DeskResult<User> {
    self.enter("current_user").await?;
    let state = self.state();
    state
      .me
      .and_then(|id| state.users.get(&id).cloned())
      .ok_or_else(|| DeskError::Api {
        status: 401,
        message: "not authenticated".into(),
      })
  }

  async fn find_user_by_external_id(&self, external_id: &str) -> DeskResult<Option<User>> {
    self.enter("find_user_by_external_id").await?;
    Ok(
      self
        .state()
        .users
        .values()
        .find(|u| u.external_id.as_deref() == Some(external_id))
        .cloned(),
    )
  }

  async fn create_user(&self, draft: &UserDraft) -> DeskResult<User> {
    self.enter("create_user").await?;
    let mut state = self.state();
    let id = Self::next_id(&mut state);
    let user = User {
      id,
      username: draft.username.clone(),
      email: draft.email.clone(),
      first_name: draft.first_name.clone(),
      last_name: draft.last_name.clone(),
      groups: Vec::new(),
      external_id: draft.external_id.clone(),
    };
    state.users.insert(id, user.clone());
    Ok(user)
  }

  async fn update_user(&self, id: UserId, draft: &UserDraft) -> DeskResult<User> {
    self.enter("update_user").await?;
    let mut state = self.state();
    let user = state
      .users
      .get_mut(&id)
      .ok_or_else(|| not_found("user", id))?;
    user.username = draft.username.clone();
    user.email = draft.email.clone();
    user.first_name = draft.first_name.clone();
    user.last_name = draft.last_name.clone();
    if draft.external_id.is_some() {
      user.external_id = draft.external_id.clone();
    }
    Ok(user.clone())
  }

  async fn delete_user(&self, id: UserId) -> DeskResult<()> {
    self.enter("delete_user").await?;
    self
      .state()
      .users
      .remove(&id)
      .map(|_| ())
      .ok_or_else(|| not_found("user", id))
  }

  async fn list_tags(&self) -> DeskResult<Vec<Tag>> {
    self.enter("list_tags").await?;
    Ok(self.state().tags.values().cloned().collect())
  }

  async fn create_tag(&self, name: &str) -> DeskResult<Tag> {
    self.enter("create_tag").await?;
    let mut state = self.state();
    let id = Self::next_id(&mut state);
    let tag = Tag {
      id,
      name: name.to_string(),
    };
    state.tags.insert(id, tag.clone());
    Ok(tag)
  }

  async fn delete_tag(&self, id: TagId) -> DeskResult<()> {
    self.enter("delete_tag").await?;
    self
      .state()
      .tags
      .remove(&id)
      .map(|_| ())
      .ok_or_else(|| not_found("tag", id))
  }

  async fn list_buildings(&self) -> DeskResult<Vec<Building>> {
    self.enter("list_buildings").await?;
    Ok(vec![Building {
      id: 1,
      name: "Central".to_string(),
      floors: vec!["PB".to_string(), "1".to_string()],
    }])
  }

  async fn list_sectors(&self) -> DeskResult<Vec<Sector>> {
    self.enter("list_sectors").await?;
    Ok(vec![Sector {
      id: 1,
      name: "Sistemas".to_string(),
    }])
  }

  async fn list_groups(&self) -> DeskResult<Vec<Group>> {
    self.enter("list_groups").await?;
    Ok(vec![
      Group {
        id: 1,
        name: "admin".to_string(),
      },
      Group {
        id: 2,
        name: "superadmin".to_string(),
      },
    ])
  }
}
