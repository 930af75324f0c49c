//! Identity provider user events mirrored onto backend users.

use serde::Deserialize;
use tracing::info;

use crate::api::types::{UserDraft, UserId};
use crate::api::DeskApi;
use crate::error::{DeskError, DeskResult};
use crate::mutation::MutationCoordinator;

#[derive(Debug, Deserialize)]
struct RawEvent {
  #[serde(rename = "type")]
  kind: String,
  data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailAddress {
  pub id: Option<String>,
  pub email_address: String,
}

/// User object as the identity provider sends it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityUser {
  pub id: String,
  pub username: Option<String>,
  #[serde(default)]
  pub email_addresses: Vec<EmailAddress>,
  pub primary_email_address_id: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeletedUser {
  pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
  UserCreated(IdentityUser),
  UserUpdated(IdentityUser),
  UserDeleted(DeletedUser),
  /// Event types this receiver does not act on
  Other(String),
}

impl IdentityEvent {
  pub fn parse(body: &[u8]) -> DeskResult<Self> {
    let raw: RawEvent = serde_json::from_slice(body)?;
    Ok(match raw.kind.as_str() {
      "user.created" => IdentityEvent::UserCreated(serde_json::from_value(raw.data)?),
      "user.updated" => IdentityEvent::UserUpdated(serde_json::from_value(raw.data)?),
      "user.deleted" => IdentityEvent::UserDeleted(serde_json::from_value(raw.data)?),
      _ => IdentityEvent::Other(raw.kind),
    })
  }
}

impl IdentityUser {
  pub fn primary_email(&self) -> Option<&str> {
    let primary = self.primary_email_address_id.as_deref();
    self
      .email_addresses
      .iter()
      .find(|e| primary.is_some() && e.id.as_deref() == primary)
      .or_else(|| self.email_addresses.first())
      .map(|e| e.email_address.as_str())
  }

  pub fn to_draft(&self) -> DeskResult<UserDraft> {
    let email = self
      .primary_email()
      .ok_or_else(|| DeskError::Validation(format!("user {} has no email address", self.id)))?;
    let username = self
      .username
      .clone()
      .filter(|u| !u.trim().is_empty())
      .or_else(|| email.split('@').next().map(String::from))
      .unwrap_or_else(|| self.id.clone());
    Ok(UserDraft {
      username,
      email: email.to_string(),
      first_name: self.first_name.clone().unwrap_or_default(),
      last_name: self.last_name.clone().unwrap_or_default(),
      external_id: Some(self.id.clone()),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  Created(UserId),
  Updated(UserId),
  Deleted(UserId),
  Ignored,
}

#[derive(Clone)]
pub struct UserSync<A: DeskApi> {
  api: A,
  mutations: MutationCoordinator<A>,
}

impl<A: DeskApi> UserSync<A> {
  pub fn new(api: A, mutations: MutationCoordinator<A>) -> Self {
    Self { api, mutations }
  }

  pub async fn apply(&self, event: IdentityEvent) -> DeskResult<SyncOutcome> {
    match event {
      IdentityEvent::UserCreated(user) | IdentityEvent::UserUpdated(user) => self.upsert(&user).await,
      IdentityEvent::UserDeleted(deleted) => {
        match self.api.find_user_by_external_id(&deleted.id).await? {
          Some(existing) => {
            self.mutations.delete_user(existing.id).await?;
            Ok(SyncOutcome::Deleted(existing.id))
          }
          None => {
            info!(external_id = %deleted.id, "delete for unknown user ignored");
            Ok(SyncOutcome::Ignored)
          }
        }
      }
      IdentityEvent::Other(kind) => {
        info!(event = %kind, "webhook event ignored");
        Ok(SyncOutcome::Ignored)
      }
    }
  }

  /// Created and updated events both converge on "backend user matches".
  async fn upsert(&self, user: &IdentityUser) -> DeskResult<SyncOutcome> {
    let draft = user.to_draft()?;
    match self.api.find_user_by_external_id(&user.id).await? {
      Some(existing) => {
        let updated = self.mutations.update_user(existing.id, &draft).await?;
        Ok(SyncOutcome::Updated(updated.id))
      }
      None => {
        let created = self.mutations.create_user(&draft).await?;
        Ok(SyncOutcome::Created(created.id))
      }
    }
  }
}
