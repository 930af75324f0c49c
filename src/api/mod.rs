//! Helpdesk REST API: wire types, domain types, HTTP client, and the cached
//! service the views read through.

pub mod api_types;
pub mod cache;
pub mod client;
pub mod service;
pub mod types;

#[cfg(test)]
pub mod fake;

use std::future::Future;

use crate::error::DeskResult;
use crate::filter::FilterSnapshot;
use types::{
  Building, Group, Message, Order, OrderDraft, OrderId, OrderPatch, Page, Sector, Tag, TagId,
  User, UserDraft, UserId,
};

pub use client::HttpApi;
pub use service::DeskService;

/// Operations the helpdesk backend offers.
///
/// [`HttpApi`] talks to the real server; tests use an in-memory fake.
pub trait DeskApi: Clone + Send + Sync + 'static {
  fn list_orders(
    &self,
    page: u32,
    filters: &FilterSnapshot,
  ) -> impl Future<Output = DeskResult<Page<Order>>> + Send;

  fn get_order(&self, id: OrderId) -> impl Future<Output = DeskResult<Order>> + Send;

  fn create_order(&self, draft: &OrderDraft) -> impl Future<Output = DeskResult<Order>> + Send;

  fn update_order(
    &self,
    id: OrderId,
    patch: &OrderPatch,
  ) -> impl Future<Output = DeskResult<Order>> + Send;

  fn delete_order(&self, id: OrderId) -> impl Future<Output = DeskResult<()>> + Send;

  fn post_message(
    &self,
    order: OrderId,
    text: &str,
  ) -> impl Future<Output = DeskResult<Message>> + Send;

  fn list_users(
    &self,
    page: u32,
    search: &str,
  ) -> impl Future<Output = DeskResult<Page<User>>> + Send;

  fn get_user(&self, id: UserId) -> impl Future<Output = DeskResult<User>> + Send;

  fn current_user(&self) -> impl Future<Output = DeskResult<User>> + Send;

  fn find_user_by_external_id(
    &self,
    external_id: &str,
  ) -> impl Future<Output = DeskResult<Option<User>>> + Send;

  fn create_user(&self, draft: &UserDraft) -> impl Future<Output = DeskResult<User>> + Send;

  fn update_user(
    &self,
    id: UserId,
    draft: &UserDraft,
  ) -> impl Future<Output = DeskResult<User>> + Send;

  fn delete_user(&self, id: UserId) -> impl Future<Output = DeskResult<()>> + Send;

  fn list_tags(&self) -> impl Future<Output = DeskResult<Vec<Tag>>> + Send;

  fn create_tag(&self, name: &str) -> impl Future<Output = DeskResult<Tag>> + Send;

  fn delete_tag(&self, id: TagId) -> impl Future<Output = DeskResult<()>> + Send;

  fn list_buildings(&self) -> impl Future<Output = DeskResult<Vec<Building>>> + Send;

  fn list_sectors(&self) -> impl Future<Output = DeskResult<Vec<Sector>>> + Send;

  fn list_groups(&self) -> impl Future<Output = DeskResult<Vec<Group>>> + Send;
}
