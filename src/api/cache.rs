//! Cache keys for helpdesk queries.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::cache::{CacheLayer, KeyPattern, QueryKey};
use crate::error::DeskResult;
use crate::filter::FilterSnapshot;

use super::types::{Order, OrderId, Page, UserId};

pub const ORDERS: &str = "orders";
pub const USERS: &str = "users";
pub const TAGS: &str = "tags";
pub const BUILDINGS: &str = "buildings";
pub const SECTORS: &str = "sectors";
pub const GROUPS: &str = "groups";

/// Query key types for helpdesk API calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum DeskQueryKey {
  /// One page of the order list under a filter snapshot
  Orders { page: u32, filters: FilterSnapshot },
  /// Every order, walked page by page (dashboard analytics)
  AllOrders,
  /// Single order with its messages
  Order { id: OrderId },
  /// One page of the user list
  Users { page: u32, search: String },
  User { id: UserId },
  /// The signed-in user
  CurrentUser,
  Tags,
  Buildings,
  Sectors,
  Groups,
}

impl QueryKey for DeskQueryKey {
  fn resource(&self) -> &'static str {
    match self {
      Self::Orders { .. } | Self::AllOrders | Self::Order { .. } => ORDERS,
      Self::Users { .. } | Self::User { .. } | Self::CurrentUser => USERS,
      Self::Tags => TAGS,
      Self::Buildings => BUILDINGS,
      Self::Sectors => SECTORS,
      Self::Groups => GROUPS,
    }
  }

  fn item_id(&self) -> Option<String> {
    match self {
      Self::Order { id } | Self::User { id } => Some(id.to_string()),
      Self::CurrentUser => Some("me".to_string()),
      _ => None,
    }
  }

  fn cache_hash(&self) -> String {
    // The JSON form is unambiguous: equal keys serialize identically and
    // distinct filter snapshots never collide before hashing.
    let input = serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self));

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
  }

  fn description(&self) -> String {
    match self {
      Self::Orders { page, filters } => format!("orders p{} ({})", page, filters.describe()),
      Self::AllOrders => "all orders".to_string(),
      Self::Order { id } => format!("order #{}", id),
      Self::Users { page, search } => {
        if search.is_empty() {
          format!("users p{}", page)
        } else {
          format!("users p{} \"{}\"", page, search)
        }
      }
      Self::User { id } => format!("user #{}", id),
      Self::CurrentUser => "current user".to_string(),
      Self::Tags => "tags".to_string(),
      Self::Buildings => "buildings".to_string(),
      Self::Sectors => "sectors".to_string(),
      Self::Groups => "groups".to_string(),
    }
  }
}

/// Drop a deleted order from every cached read.
///
/// Cached pages and the full list lose the order right away, then get
/// invalidated so the server's numbering and totals follow.
pub fn forget_order(cache: &CacheLayer, id: OrderId) -> DeskResult<()> {
  cache.remove(&KeyPattern::item(ORDERS, id))?;
  let lists = KeyPattern::Lists(ORDERS);
  cache.update_values::<Page<Order>, _>(&lists, |page| {
    let before = page.items.len();
    let items: Vec<Order> = page.items.iter().filter(|o| o.id != id).cloned().collect();
    let dropped = (before - items.len()) as u64;
    (dropped > 0).then(|| Page {
      items,
      total: page.total.saturating_sub(dropped),
      page: page.page,
      has_next: page.has_next,
    })
  })?;
  cache.update_values::<Vec<Order>, _>(&lists, |orders| {
    orders
      .iter()
      .any(|o| o.id == id)
      .then(|| orders.iter().filter(|o| o.id != id).cloned().collect())
  })?;
  cache.invalidate(&lists)?;
  Ok(())
}
