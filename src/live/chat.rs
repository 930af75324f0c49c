use crate::api::types::{Message, Order, OrderId};

use super::LiveEvent;

/// In-memory chat history of the order shown in the detail view.
#[derive(Debug, Clone)]
pub struct ChatLog {
  order_id: OrderId,
  messages: Vec<Message>,
}

impl ChatLog {
  pub fn new(order: &Order) -> Self {
    Self {
      order_id: order.id,
      messages: order.messages.clone(),
    }
  }

  pub fn order_id(&self) -> OrderId {
    self.order_id
  }

  pub fn messages(&self) -> &[Message] {
    &self.messages
  }

  pub fn len(&self) -> usize {
    self.messages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.messages.is_empty()
  }

  /// Append a message unless it is already present. Returns true if added.
  pub fn push(&mut self, message: Message) -> bool {
    if self.messages.iter().any(|m| m.id == message.id) {
      return false;
    }
    self.messages.push(message);
    true
  }

  /// Take a refetched order's history, keeping anything pushed live that
  /// the server copy does not include yet.
  pub fn sync(&mut self, order: &Order) {
    if order.id != self.order_id {
      return;
    }
    let mut merged = order.messages.clone();
    for m in &self.messages {
      if !merged.iter().any(|o| o.id == m.id) {
        merged.push(m.clone());
      }
    }
    merged.sort_by_key(|m| (m.created, m.id));
    self.messages = merged;
  }

  /// Fold a live event in. Returns true if the log changed.
  pub fn apply(&mut self, event: &LiveEvent) -> bool {
    match event {
      LiveEvent::MessageNew { order_id, message } if *order_id == self.order_id => {
        self.push(message.clone())
      }
      _ => false,
    }
  }
}
