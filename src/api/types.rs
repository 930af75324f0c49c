//! Domain types shared by the cache, views, and mutation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DeskError, DeskResult};

pub type OrderId = u64;
pub type UserId = u64;
pub type TagId = u64;
pub type MessageId = u64;

/// Lifecycle state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Open,
  Resolved,
  Cancelled,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 3] = [
    OrderStatus::Open,
    OrderStatus::Resolved,
    OrderStatus::Cancelled,
  ];

  /// Statuses reachable from this one.
  ///
  /// Closed orders only go back to open through an explicit reopen.
  pub fn transitions(self) -> &'static [OrderStatus] {
    match self {
      OrderStatus::Open => &[OrderStatus::Resolved, OrderStatus::Cancelled],
      OrderStatus::Resolved | OrderStatus::Cancelled => &[OrderStatus::Open],
    }
  }

  pub fn can_transition_to(self, to: OrderStatus) -> bool {
    self.transitions().contains(&to)
  }

  /// Validate a transition, returning the target on success.
  pub fn transition(self, to: OrderStatus) -> DeskResult<OrderStatus> {
    if self.can_transition_to(to) {
      Ok(to)
    } else {
      Err(DeskError::InvalidTransition { from: self, to })
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      OrderStatus::Open => "Open",
      OrderStatus::Resolved => "Resolved",
      OrderStatus::Cancelled => "Cancelled",
    }
  }

  /// Label for the action that moves an order into this status
  pub fn action_label(self) -> &'static str {
    match self {
      OrderStatus::Open => "Reopen",
      OrderStatus::Resolved => "Resolve",
      OrderStatus::Cancelled => "Cancel",
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  Medium,
  High,
  Critical,
}

impl Priority {
  pub const ALL: [Priority; 4] = [
    Priority::Low,
    Priority::Medium,
    Priority::High,
    Priority::Critical,
  ];

  pub fn label(self) -> &'static str {
    match self {
      Priority::Low => "Low",
      Priority::Medium => "Medium",
      Priority::High => "High",
      Priority::Critical => "Critical",
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Lightweight reference to a user embedded in orders and messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
  pub id: UserId,
  pub username: String,
  pub first_name: String,
  pub last_name: String,
}

impl UserRef {
  pub fn display_name(&self) -> String {
    let full = format!("{} {}", self.first_name, self.last_name);
    let full = full.trim();
    if full.is_empty() {
      self.username.clone()
    } else {
      full.to_string()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
  pub id: TagId,
  pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub building: Option<String>,
  pub floor: Option<String>,
  pub office: Option<String>,
}

impl Location {
  pub fn describe(&self) -> String {
    let parts: Vec<&str> = [&self.building, &self.floor, &self.office]
      .into_iter()
      .filter_map(|p| p.as_deref())
      .filter(|p| !p.is_empty())
      .collect();
    if parts.is_empty() {
      "-".to_string()
    } else {
      parts.join(" / ")
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
  pub name: String,
  pub url: String,
}

/// Chat message inside an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub id: MessageId,
  pub text: String,
  pub author: UserRef,
  pub attachments: Vec<Attachment>,
  pub created: DateTime<Utc>,
}

/// A support / work order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
  pub id: OrderId,
  pub title: String,
  pub detail: String,
  pub status: OrderStatus,
  pub priority: Priority,
  pub client: UserRef,
  pub agents: Vec<UserRef>,
  pub tags: Vec<TagRef>,
  pub location: Location,
  pub created: DateTime<Utc>,
  pub updated: DateTime<Utc>,
  /// Empty in list responses; populated by the detail endpoint
  pub messages: Vec<Message>,
}

impl Order {
  pub fn is_assigned_to(&self, user: UserId) -> bool {
    self.agents.iter().any(|a| a.id == user)
  }

  pub fn agent_names(&self) -> String {
    if self.agents.is_empty() {
      "Unassigned".to_string()
    } else {
      self
        .agents
        .iter()
        .map(UserRef::display_name)
        .collect::<Vec<_>>()
        .join(", ")
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: UserId,
  pub username: String,
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub groups: Vec<String>,
  /// Identity provider user id
  pub external_id: Option<String>,
}

impl User {
  pub fn as_ref(&self) -> UserRef {
    UserRef {
      id: self.id,
      username: self.username.clone(),
      first_name: self.first_name.clone(),
      last_name: self.last_name.clone(),
    }
  }

  pub fn display_name(&self) -> String {
    self.as_ref().display_name()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  pub id: TagId,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
  pub id: u64,
  pub name: String,
  pub floors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
  pub id: u64,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub id: u64,
  pub name: String,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: u64,
  pub page: u32,
  pub has_next: bool,
}

impl<T> Page<T> {
  pub fn empty(page: u32) -> Self {
    Self {
      items: Vec::new(),
      total: 0,
      page,
      has_next: false,
    }
  }

  pub fn has_prev(&self) -> bool {
    self.page > 1
  }
}

const MAX_TITLE_LEN: usize = 200;

/// Payload for creating an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
  pub title: String,
  pub detail: String,
  pub priority: Priority,
  pub client: UserId,
  pub agents: Vec<UserId>,
  pub tags: Vec<TagId>,
  pub location: Location,
}

impl OrderDraft {
  pub fn validate(&self) -> DeskResult<()> {
    validate_title(&self.title)?;
    if self.detail.trim().is_empty() {
      return Err(DeskError::Validation("detail is required".to_string()));
    }
    Ok(())
  }
}

/// Partial update for an order; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
  pub title: Option<String>,
  pub detail: Option<String>,
  pub status: Option<OrderStatus>,
  pub priority: Option<Priority>,
  pub agents: Option<Vec<UserId>>,
  pub tags: Option<Vec<TagId>>,
  pub location: Option<Location>,
}

impl OrderPatch {
  pub fn is_empty(&self) -> bool {
    *self == OrderPatch::default()
  }

  pub fn validate(&self) -> DeskResult<()> {
    if self.is_empty() {
      return Err(DeskError::Validation("nothing to update".to_string()));
    }
    // Status only moves through the transition table
    if self.status.is_some() {
      return Err(DeskError::Validation(
        "status cannot be changed by a general update".to_string(),
      ));
    }
    if let Some(title) = &self.title {
      validate_title(title)?;
    }
    if let Some(detail) = &self.detail {
      if detail.trim().is_empty() {
        return Err(DeskError::Validation("detail is required".to_string()));
      }
    }
    Ok(())
  }
}

fn validate_title(title: &str) -> DeskResult<()> {
  let title = title.trim();
  if title.is_empty() {
    return Err(DeskError::Validation("title is required".to_string()));
  }
  if title.chars().count() > MAX_TITLE_LEN {
    return Err(DeskError::Validation(format!(
      "title must be at most {} characters",
      MAX_TITLE_LEN
    )));
  }
  Ok(())
}

/// Payload for creating or replacing a user record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDraft {
  pub username: String,
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub external_id: Option<String>,
}

impl UserDraft {
  pub fn validate(&self) -> DeskResult<()> {
    if self.username.trim().is_empty() {
      return Err(DeskError::Validation("username is required".to_string()));
    }
    if !self.email.contains('@') {
      return Err(DeskError::Validation(format!(
        "invalid email address: {}",
        self.email
      )));
    }
    Ok(())
  }
}
