//! Typed errors for the API, cache, and mutation layers.
//!
//! The binary and TUI glue use `color_eyre::Result`; everything below them
//! returns [`DeskResult`] so callers can match on the failure kind.

use crate::api::types::OrderStatus;

pub type DeskResult<T> = std::result::Result<T, DeskError>;

/// Failure modes surfaced to views and commands.
///
/// `Clone` because a single coalesced fetch hands its result to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeskError {
  /// Connection refused, timeout, TLS failure, ...
  #[error("network error: {0}")]
  Transport(String),

  /// Non-2xx response from the API
  #[error("API error {status}: {message}")]
  Api { status: u16, message: String },

  /// Payload rejected locally before reaching the network
  #[error("invalid input: {0}")]
  Validation(String),

  #[error("cannot move order from {from} to {to}")]
  InvalidTransition { from: OrderStatus, to: OrderStatus },

  /// Current user lacks the role for the action
  #[error("not allowed: {0}")]
  Forbidden(String),

  /// Response body or frame did not match the expected shape
  #[error("unexpected response: {0}")]
  Decode(String),

  #[error("cache error: {0}")]
  Cache(String),

  #[error("live channel error: {0}")]
  Live(String),

  #[error("webhook rejected: {0}")]
  Webhook(String),

  /// Local file could not be written (exports)
  #[error("file error: {0}")]
  Io(String),
}

impl DeskError {
  /// Whether a read should be attempted again after this failure.
  pub fn is_retryable(&self) -> bool {
    matches!(self, DeskError::Transport(_) | DeskError::Api { .. })
  }

  /// HTTP status to answer a webhook caller with.
  pub fn status_code(&self) -> u16 {
    match self {
      DeskError::Webhook(_) => 401,
      DeskError::Validation(_) | DeskError::Decode(_) => 400,
      DeskError::Forbidden(_) => 403,
      DeskError::Api { status, .. } if *status == 404 => 404,
      _ => 502,
    }
  }
}

impl From<reqwest::Error> for DeskError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      DeskError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
      DeskError::Api {
        status: status.as_u16(),
        message: err.to_string(),
      }
    } else {
      DeskError::Transport(err.to_string())
    }
  }
}

impl From<serde_json::Error> for DeskError {
  fn from(err: serde_json::Error) -> Self {
    DeskError::Decode(err.to_string())
  }
}

impl From<std::io::Error> for DeskError {
  fn from(err: std::io::Error) -> Self {
    DeskError::Io(err.to_string())
  }
}

impl From<rusqlite::Error> for DeskError {
  fn from(err: rusqlite::Error) -> Self {
    DeskError::Cache(err.to_string())
  }
}
