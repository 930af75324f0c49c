//! Push updates for an open order: WebSocket frames decoded into events the
//! chat view polls from a channel.

pub mod chat;
pub mod socket;

use serde::{Deserialize, Serialize};

use crate::api::api_types::{ApiMensaje, ApiOrden};
use crate::api::cache::{forget_order, DeskQueryKey, ORDERS};
use crate::api::types::{Message, Order, OrderId};
use crate::cache::{CacheLayer, KeyPattern};
use crate::error::{DeskError, DeskResult};

pub use chat::ChatLog;
pub use socket::LiveChannel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiOrdenRef {
  pub id: OrderId,
}

/// Frame exchanged over the order socket: `{"type": "...", "data": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveEnvelope {
  MensajeNew(ApiMensaje),
  OrdenCreate(ApiOrden),
  OrdenUpdate(ApiOrden),
  OrdenDelete(ApiOrdenRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
  MessageNew { order_id: OrderId, message: Message },
  OrderCreated(Order),
  OrderUpdated(Order),
  OrderDeleted(OrderId),
  /// Socket closed or failed; no more events will arrive
  Disconnected(Option<String>),
}

impl LiveEnvelope {
  pub fn decode(text: &str) -> DeskResult<Self> {
    serde_json::from_str(text).map_err(|e| DeskError::Decode(format!("live frame: {}", e)))
  }

  pub fn encode(&self) -> DeskResult<String> {
    Ok(serde_json::to_string(self)?)
  }

  /// Frame telling the server about a message posted from this client.
  pub fn announce(order_id: OrderId, message: &Message) -> Self {
    LiveEnvelope::MensajeNew(ApiMensaje::announce(order_id, message))
  }

  /// Convert to a domain event. Messages without an order field belong to the
  /// order the socket is subscribed to.
  pub fn into_event(self, channel_order: OrderId) -> DeskResult<LiveEvent> {
    Ok(match self {
      LiveEnvelope::MensajeNew(m) => LiveEvent::MessageNew {
        order_id: m.orden.unwrap_or(channel_order),
        message: m.into(),
      },
      LiveEnvelope::OrdenCreate(o) => LiveEvent::OrderCreated(Order::try_from(o)?),
      LiveEnvelope::OrdenUpdate(o) => LiveEvent::OrderUpdated(Order::try_from(o)?),
      LiveEnvelope::OrdenDelete(r) => LiveEvent::OrderDeleted(r.id),
    })
  }
}

impl LiveEvent {
  /// Bring the query cache in line with a pushed change.
  pub fn apply_to_cache(&self, cache: &CacheLayer) -> DeskResult<()> {
    match self {
      LiveEvent::MessageNew { order_id, message } => {
        let key = DeskQueryKey::Order { id: *order_id };
        if let Some(cached) = cache.peek::<_, Order>(&key) {
          if !cached.messages.iter().any(|m| m.id == message.id) {
            let mut order = (*cached).clone();
            order.messages.push(message.clone());
            cache.set_value(&key, order)?;
          }
        }
      }
      LiveEvent::OrderCreated(_) => {
        cache.invalidate(&KeyPattern::Lists(ORDERS))?;
      }
      LiveEvent::OrderUpdated(order) => {
        let key = DeskQueryKey::Order { id: order.id };
        let mut order = order.clone();
        // Update frames carry no chat history
        if order.messages.is_empty() {
          if let Some(cached) = cache.peek::<_, Order>(&key) {
            order.messages = cached.messages.clone();
          }
        }
        cache.set_value(&key, order)?;
        cache.invalidate(&KeyPattern::Lists(ORDERS))?;
      }
      LiveEvent::OrderDeleted(id) => forget_order(cache, *id)?,
      LiveEvent::Disconnected(_) => {}
    }
    Ok(())
  }
}
