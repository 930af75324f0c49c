//! Receiver for identity provider webhooks.
//!
//! `POST /webhooks/identity` verifies the Svix signature headers and keeps
//! backend users in step with the identity store.

pub mod signature;
pub mod sync;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::DeskApi;
use crate::error::DeskError;

pub use signature::{WebhookHeaders, WebhookVerifier};
pub use sync::{IdentityEvent, SyncOutcome, UserSync};

pub const WEBHOOK_PATH: &str = "/webhooks/identity";

struct WebhookState<A: DeskApi> {
  verifier: WebhookVerifier,
  sync: UserSync<A>,
}

pub fn router<A: DeskApi>(verifier: WebhookVerifier, sync: UserSync<A>) -> Router {
  let state = Arc::new(WebhookState { verifier, sync });
  Router::new()
    .route(WEBHOOK_PATH, post(receive::<A>))
    .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, DeskError> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| DeskError::Webhook(format!("missing {} header", name)))
}

fn signed_headers(headers: &HeaderMap) -> Result<WebhookHeaders<'_>, DeskError> {
  Ok(WebhookHeaders {
    id: header(headers, "svix-id")?,
    timestamp: header(headers, "svix-timestamp")?,
    signature: header(headers, "svix-signature")?,
  })
}

fn reject(err: DeskError) -> (StatusCode, Json<Value>) {
  let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
  warn!(status = status.as_u16(), error = %err, "webhook rejected");
  (status, Json(json!({ "error": err.to_string() })))
}

async fn receive<A: DeskApi>(
  State(state): State<Arc<WebhookState<A>>>,
  headers: HeaderMap,
  body: Bytes,
) -> (StatusCode, Json<Value>) {
  let signed = match signed_headers(&headers) {
    Ok(signed) => signed,
    Err(err) => return reject(err),
  };
  if let Err(err) = state.verifier.verify(&signed, &body, Utc::now()) {
    return reject(err);
  }

  let event = match IdentityEvent::parse(&body) {
    Ok(event) => event,
    Err(err) => return reject(err),
  };
  match state.sync.apply(event).await {
    Ok(outcome) => {
      info!(delivery = signed.id, ?outcome, "webhook processed");
      (StatusCode::OK, Json(json!({ "ok": true })))
    }
    Err(err) => reject(err),
  }
}

/// Bind and serve until the process is stopped.
pub async fn serve(listen: &str, app: Router) -> Result<()> {
  let listener = tokio::net::TcpListener::bind(listen)
    .await
    .map_err(|e| eyre!("Failed to bind webhook listener on {}: {}", listen, e))?;
  info!(addr = %listen, path = WEBHOOK_PATH, "webhook receiver listening");
  axum::serve(listener, app)
    .await
    .map_err(|e| eyre!("Webhook server error: {}", e))
}
