//! Signed-in user and the actions their groups unlock.
//!
//! This only decides what the UI offers; the backend enforces permissions.

use crate::api::types::{Order, User, UserId};

const ADMIN_GROUPS: [&str; 2] = ["admin", "superadmin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
  DeleteOrder,
  AssignOrder,
  ManageUsers,
  ManageTags,
  /// Status changes on orders the user is not assigned to
  ChangeAnyStatus,
}

#[derive(Debug, Clone)]
pub struct Session {
  user: User,
}

impl Session {
  pub fn new(user: User) -> Self {
    Self { user }
  }

  pub fn user(&self) -> &User {
    &self.user
  }

  pub fn user_id(&self) -> UserId {
    self.user.id
  }

  pub fn is_admin(&self) -> bool {
    self
      .user
      .groups
      .iter()
      .any(|g| ADMIN_GROUPS.contains(&g.to_lowercase().as_str()))
  }

  pub fn can(&self, capability: Capability) -> bool {
    match capability {
      Capability::DeleteOrder
      | Capability::AssignOrder
      | Capability::ManageUsers
      | Capability::ManageTags
      | Capability::ChangeAnyStatus => self.is_admin(),
    }
  }

  /// Agents may work the orders assigned to them; admins any order.
  pub fn can_change_status(&self, order: &Order) -> bool {
    self.can(Capability::ChangeAnyStatus) || order.is_assigned_to(self.user.id)
  }
}
