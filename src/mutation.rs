//! Writes against the helpdesk API.
//!
//! Every operation validates locally first, calls the API exactly once (no
//! retry), and on success brings the query cache up to date: list keys of the
//! touched resource are invalidated, item keys are seeded with the returned
//! object or dropped after a delete.

use tracing::info;

use crate::api::cache::{forget_order, DeskQueryKey, ORDERS, TAGS, USERS};
use crate::api::types::{
  Message, Order, OrderDraft, OrderId, OrderPatch, OrderStatus, Tag, TagId, User, UserDraft,
  UserId,
};
use crate::api::DeskApi;
use crate::cache::{CacheLayer, KeyPattern};
use crate::error::{DeskError, DeskResult};

#[derive(Clone)]
pub struct MutationCoordinator<A: DeskApi> {
  api: A,
  cache: CacheLayer,
}

impl<A: DeskApi> MutationCoordinator<A> {
  pub fn new(api: A, cache: CacheLayer) -> Self {
    Self { api, cache }
  }

  pub async fn create_order(&self, draft: &OrderDraft) -> DeskResult<Order> {
    draft.validate()?;
    let order = self.api.create_order(draft).await?;
    info!(order = order.id, title = %order.title, "order created");
    self.order_changed(order)
  }

  pub async fn update_order(&self, id: OrderId, patch: &OrderPatch) -> DeskResult<Order> {
    patch.validate()?;
    let order = self.api.update_order(id, patch).await?;
    info!(order = id, "order updated");
    self.order_changed(order)
  }

  /// Move `order` to `to` if the transition table allows it.
  pub async fn change_status(&self, order: &Order, to: OrderStatus) -> DeskResult<Order> {
    let to = order.status.transition(to)?;
    let patch = OrderPatch {
      status: Some(to),
      ..Default::default()
    };
    let updated = self.api.update_order(order.id, &patch).await?;
    info!(order = order.id, from = %order.status, to = %to, "order status changed");
    self.order_changed(updated)
  }

  /// Replace the agent list of an order.
  pub async fn assign_agents(&self, id: OrderId, agents: Vec<UserId>) -> DeskResult<Order> {
    let patch = OrderPatch {
      agents: Some(agents),
      ..Default::default()
    };
    let order = self.api.update_order(id, &patch).await?;
    info!(order = id, agents = %order.agent_names(), "order assigned");
    self.order_changed(order)
  }

  pub async fn delete_order(&self, id: OrderId) -> DeskResult<()> {
    self.api.delete_order(id).await?;
    info!(order = id, "order deleted");
    forget_order(&self.cache, id)
  }

  /// Post a chat message. The cached order, if any, gets the message
  /// appended instead of being refetched.
  pub async fn send_message(&self, order_id: OrderId, text: &str) -> DeskResult<Message> {
    let text = text.trim();
    if text.is_empty() {
      return Err(DeskError::Validation("message is empty".to_string()));
    }
    let message = self.api.post_message(order_id, text).await?;
    info!(order = order_id, message = message.id, "message sent");

    let key = DeskQueryKey::Order { id: order_id };
    if let Some(cached) = self.cache.peek::<_, Order>(&key) {
      if !cached.messages.iter().any(|m| m.id == message.id) {
        let mut order = (*cached).clone();
        order.messages.push(message.clone());
        self.cache.set_value(&key, order)?;
      }
    }
    self.cache.invalidate(&KeyPattern::Lists(ORDERS))?;
    Ok(message)
  }

  pub async fn create_user(&self, draft: &UserDraft) -> DeskResult<User> {
    draft.validate()?;
    let user = self.api.create_user(draft).await?;
    info!(user = user.id, username = %user.username, "user created");
    self.user_changed(user)
  }

  pub async fn update_user(&self, id: UserId, draft: &UserDraft) -> DeskResult<User> {
    draft.validate()?;
    let user = self.api.update_user(id, draft).await?;
    info!(user = id, username = %user.username, "user updated");
    self.user_changed(user)
  }

  pub async fn delete_user(&self, id: UserId) -> DeskResult<()> {
    self.api.delete_user(id).await?;
    info!(user = id, "user deleted");
    self.cache.remove(&KeyPattern::item(USERS, id))?;
    self.cache.invalidate(&KeyPattern::item(USERS, "me"))?;
    self.cache.invalidate(&KeyPattern::Lists(USERS))?;
    Ok(())
  }

  pub async fn create_tag(&self, name: &str) -> DeskResult<Tag> {
    let name = name.trim();
    if name.is_empty() {
      return Err(DeskError::Validation("tag name is required".to_string()));
    }
    let tag = self.api.create_tag(name).await?;
    info!(tag = tag.id, name = %tag.name, "tag created");
    self.cache.invalidate(&KeyPattern::Lists(TAGS))?;
    Ok(tag)
  }

  pub async fn delete_tag(&self, id: TagId) -> DeskResult<()> {
    self.api.delete_tag(id).await?;
    info!(tag = id, "tag deleted");
    self.cache.invalidate(&KeyPattern::Lists(TAGS))?;
    // Orders embed their tags
    self.cache.invalidate(&KeyPattern::Resource(ORDERS))?;
    Ok(())
  }

  fn order_changed(&self, order: Order) -> DeskResult<Order> {
    self.cache.invalidate(&KeyPattern::Lists(ORDERS))?;
    let key = DeskQueryKey::Order { id: order.id };
    let seeded = self.cache.set_value(&key, order)?;
    Ok((*seeded).clone())
  }

  fn user_changed(&self, user: User) -> DeskResult<User> {
    self.cache.invalidate(&KeyPattern::Lists(USERS))?;
    self.cache.invalidate(&KeyPattern::item(USERS, "me"))?;
    let key = DeskQueryKey::User { id: user.id };
    let seeded = self.cache.set_value(&key, user)?;
    Ok((*seeded).clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fake::{self, FakeApi};
  use crate::api::types::{Location, Priority};
  use crate::api::DeskService;
  use crate::cache::{CacheEvent, CacheSource, NoopStorage, QueryKey};
  use crate::filter::FilterSnapshot;

  fn setup() -> (FakeApi, DeskService<FakeApi>, MutationCoordinator<FakeApi>) {
    let api = FakeApi::new();
    let cache = CacheLayer::new(NoopStorage);
    let service = DeskService::new(api.clone(), cache.clone());
    let mutations = MutationCoordinator::new(api.clone(), cache);
    (api, service, mutations)
  }

  fn draft(title: &str) -> OrderDraft {
    OrderDraft {
      title: title.to_string(),
      detail: "Screen stays black".to_string(),
      priority: Priority::High,
      client: 100,
      agents: Vec::new(),
      tags: Vec::new(),
      location: Location::default(),
    }
  }

  #[tokio::test]
  async fn test_delete_then_list_no_longer_contains_order() {
    let (api, service, mutations) = setup();
    api.insert_order(fake::order(1, "Printer jam", OrderStatus::Open));
    api.insert_order(fake::order(2, "VPN down", OrderStatus::Open));
    let filters = FilterSnapshot::default();

    let before = service.orders(1, &filters).await.unwrap();
    assert_eq!(before.data.items.len(), 2);
    let all_before = service.all_orders().await.unwrap();
    assert_eq!(all_before.data.len(), 2);
    let list_hash = DeskQueryKey::Orders {
      page: 1,
      filters: filters.clone(),
    }
    .cache_hash();

    let mut events = service.cache().subscribe();
    mutations.delete_order(1).await.unwrap();

    // The very next read already lacks the order, even before any refetch
    let first = service.orders(1, &filters).await.unwrap();
    assert_eq!(first.source, CacheSource::CacheStale);
    assert!(first.data.items.iter().all(|o| o.id != 1));
    assert_eq!(first.data.total, 1);
    let all_first = service.all_orders().await.unwrap();
    assert!(all_first.data.iter().all(|o| o.id != 1));

    // Mounted lists are told to refetch
    let mut invalidated = false;
    while let Ok(event) = events.try_recv() {
      if event == (CacheEvent::Invalidated { hash: list_hash.clone() }) {
        invalidated = true;
      }
    }
    assert!(invalidated);
  }

  #[tokio::test]
  async fn test_delete_removes_item_entry() {
    let (api, service, mutations) = setup();
    api.insert_order(fake::order(1, "Printer jam", OrderStatus::Open));
    service.order(1).await.unwrap();

    mutations.delete_order(1).await.unwrap();
    assert!(service
      .cache()
      .peek::<_, Order>(&DeskQueryKey::Order { id: 1 })
      .is_none());
  }

  #[tokio::test]
  async fn test_resolved_to_cancelled_is_rejected_before_network() {
    let (api, _service, mutations) = setup();
    let order = fake::order(1, "Printer jam", OrderStatus::Resolved);
    api.insert_order(order.clone());

    let err = mutations
      .change_status(&order, OrderStatus::Cancelled)
      .await
      .unwrap_err();
    assert_eq!(
      err,
      DeskError::InvalidTransition {
        from: OrderStatus::Resolved,
        to: OrderStatus::Cancelled,
      }
    );
    assert_eq!(api.total_calls(), 0);
  }

  #[tokio::test]
  async fn test_update_order_cannot_bypass_transition_table() {
    let (api, _service, mutations) = setup();
    api.insert_order(fake::order(1, "Printer jam", OrderStatus::Resolved));

    let patch = OrderPatch {
      status: Some(OrderStatus::Cancelled),
      ..Default::default()
    };
    let err = mutations.update_order(1, &patch).await.unwrap_err();
    assert!(matches!(err, DeskError::Validation(_)));
    assert_eq!(api.total_calls(), 0);
    assert_eq!(api.order(1).unwrap().status, OrderStatus::Resolved);
  }

  #[tokio::test]
  async fn test_reopen_then_cancel() {
    let (api, service, mutations) = setup();
    let order = fake::order(1, "Printer jam", OrderStatus::Resolved);
    api.insert_order(order.clone());

    let reopened = mutations
      .change_status(&order, OrderStatus::Open)
      .await
      .unwrap();
    assert_eq!(reopened.status, OrderStatus::Open);
    let cancelled = mutations
      .change_status(&reopened, OrderStatus::Cancelled)
      .await
      .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Item entry seeded with the returned object
    let cached = service.order(1).await.unwrap();
    assert_eq!(cached.source, CacheSource::CacheFresh);
    assert_eq!(cached.data.status, OrderStatus::Cancelled);
    assert_eq!(api.calls("get_order"), 0);
  }

  #[tokio::test]
  async fn test_invalid_draft_never_reaches_network() {
    let (api, _service, mutations) = setup();
    let err = mutations.create_order(&draft("   ")).await.unwrap_err();
    assert!(matches!(err, DeskError::Validation(_)));

    let long = "x".repeat(201);
    assert!(mutations.create_order(&draft(&long)).await.is_err());
    assert!(mutations
      .update_order(1, &OrderPatch::default())
      .await
      .is_err());
    assert!(mutations.send_message(1, "  ").await.is_err());
    assert_eq!(api.total_calls(), 0);
  }

  #[tokio::test]
  async fn test_create_order_invalidates_lists() {
    let (api, service, mutations) = setup();
    let filters = FilterSnapshot::default();
    service.orders(1, &filters).await.unwrap();

    let created = mutations.create_order(&draft("Monitor")).await.unwrap();
    assert_eq!(created.status, OrderStatus::Open);
    assert_eq!(api.calls("create_order"), 1);

    let list = service.orders(1, &filters).await.unwrap();
    assert_eq!(list.source, CacheSource::CacheStale);
  }

  #[tokio::test]
  async fn test_mutation_failures_are_not_retried() {
    let (api, _service, mutations) = setup();
    api.insert_order(fake::order(1, "Printer jam", OrderStatus::Open));
    api.fail_next(DeskError::Transport("connection reset".into()));

    let err = mutations.delete_order(1).await.unwrap_err();
    assert_eq!(err, DeskError::Transport("connection reset".into()));
    assert_eq!(api.calls("delete_order"), 1);
    assert!(api.order(1).is_some());
  }

  #[tokio::test]
  async fn test_send_message_appends_to_cached_order() {
    let (api, service, mutations) = setup();
    api.insert_order(fake::order(1, "Printer jam", OrderStatus::Open));
    service.order(1).await.unwrap();

    let sent = mutations.send_message(1, " on my way ").await.unwrap();
    assert_eq!(sent.text, "on my way");

    let cached = service.order(1).await.unwrap();
    assert_eq!(cached.data.messages.len(), 1);
    assert_eq!(cached.data.messages[0].id, sent.id);
    assert_eq!(api.calls("get_order"), 1);
  }

  #[tokio::test]
  async fn test_assign_agents() {
    let (api, _service, mutations) = setup();
    api.insert_order(fake::order(1, "Printer jam", OrderStatus::Open));

    let order = mutations.assign_agents(1, vec![1]).await.unwrap();
    assert!(order.is_assigned_to(1));
  }

  #[tokio::test]
  async fn test_tags_round_trip() {
    let (api, service, mutations) = setup();
    assert!(service.tags().await.unwrap().data.is_empty());

    let tag = mutations.create_tag("hardware").await.unwrap();
    assert!(mutations.create_tag(" ").await.is_err());
    mutations.delete_tag(tag.id).await.unwrap();
    assert_eq!(api.calls("create_tag"), 1);
    assert_eq!(api.calls("delete_tag"), 1);
  }
}
