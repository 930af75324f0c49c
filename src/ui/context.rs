use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::api::client::HttpApi;
use crate::api::service::DeskService;
use crate::api::types::UserId;
use crate::auth::{Capability, Session};
use crate::mutation::MutationCoordinator;

/// Services every view can reach. Cheap to clone.
#[derive(Clone)]
pub struct DeskContext {
  pub service: DeskService<HttpApi>,
  pub mutations: MutationCoordinator<HttpApi>,
  pub session: Option<Arc<Session>>,
  pub ws_base: Option<Url>,
  pub export_dir: PathBuf,
  pub debounce: std::time::Duration,
}

impl DeskContext {
  pub fn can(&self, capability: Capability) -> bool {
    self.session.as_ref().is_some_and(|s| s.can(capability))
  }

  pub fn user_id(&self) -> Option<UserId> {
    self.session.as_ref().map(|s| s.user_id())
  }

  pub fn token(&self) -> &str {
    self.service.api().token()
  }
}
