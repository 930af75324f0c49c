//! One WebSocket per open order. No reconnect: when the socket goes away a
//! `Disconnected` event is sent and the channel stays quiet.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, Request};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use url::Url;

use super::{LiveEnvelope, LiveEvent};
use crate::api::types::{Message, OrderId};
use crate::error::{DeskError, DeskResult};

pub struct LiveChannel {
  order_id: OrderId,
  events: mpsc::UnboundedReceiver<LiveEvent>,
  outgoing: mpsc::UnboundedSender<LiveEnvelope>,
  task: JoinHandle<()>,
}

impl LiveChannel {
  /// Open `{base}ordenes/{id}/`. The handshake runs in the background;
  /// failures arrive as `LiveEvent::Disconnected`.
  pub fn connect(base: &Url, token: Option<&str>, order_id: OrderId) -> DeskResult<Self> {
    let url = base
      .join(&format!("ordenes/{}/", order_id))
      .map_err(|e| DeskError::Live(format!("bad socket url: {}", e)))?;
    let mut request = url
      .as_str()
      .into_client_request()
      .map_err(|e| DeskError::Live(e.to_string()))?;
    if let Some(token) = token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| DeskError::Live(format!("bad token: {}", e)))?;
      request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (event_tx, events) = mpsc::unbounded_channel();
    let (outgoing, out_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(request, order_id, event_tx, out_rx));

    Ok(Self {
      order_id,
      events,
      outgoing,
      task,
    })
  }

  pub fn order_id(&self) -> OrderId {
    self.order_id
  }

  /// Next pending event, if any. Called once per tick.
  pub fn try_recv(&mut self) -> Option<LiveEvent> {
    self.events.try_recv().ok()
  }

  pub async fn recv(&mut self) -> Option<LiveEvent> {
    self.events.recv().await
  }

  /// Tell the server about a message this client just posted.
  pub fn announce(&self, message: &Message) -> DeskResult<()> {
    self
      .outgoing
      .send(LiveEnvelope::announce(self.order_id, message))
      .map_err(|_| DeskError::Live("socket closed".to_string()))
  }
}

impl Drop for LiveChannel {
  fn drop(&mut self) {
    self.task.abort();
  }
}

async fn run(
  request: Request<()>,
  order_id: OrderId,
  events: mpsc::UnboundedSender<LiveEvent>,
  mut outgoing: mpsc::UnboundedReceiver<LiveEnvelope>,
) {
  let socket = match tokio_tungstenite::connect_async(request).await {
    Ok((socket, _)) => socket,
    Err(e) => {
      warn!(order = order_id, error = %e, "live connection failed");
      let _ = events.send(LiveEvent::Disconnected(Some(e.to_string())));
      return;
    }
  };
  debug!(order = order_id, "live connection open");
  let (mut sink, mut stream) = socket.split();

  loop {
    tokio::select! {
      frame = stream.next() => match frame {
        Some(Ok(WsMessage::Text(text))) => {
          match LiveEnvelope::decode(&text).and_then(|env| env.into_event(order_id)) {
            Ok(event) => {
              // Receiver gone means the view was closed
              if events.send(event).is_err() {
                break;
              }
            }
            Err(e) => warn!(order = order_id, error = %e, "ignoring live frame"),
          }
        }
        Some(Ok(WsMessage::Close(_))) | None => {
          debug!(order = order_id, "live connection closed by server");
          let _ = events.send(LiveEvent::Disconnected(None));
          break;
        }
        Some(Ok(_)) => {}
        Some(Err(e)) => {
          warn!(order = order_id, error = %e, "live connection dropped");
          let _ = events.send(LiveEvent::Disconnected(Some(e.to_string())));
          break;
        }
      },
      envelope = outgoing.recv() => {
        let Some(envelope) = envelope else { break };
        let text = match envelope.encode() {
          Ok(text) => text,
          Err(e) => {
            warn!(error = %e, "cannot encode live frame");
            continue;
          }
        };
        if let Err(e) = sink.send(WsMessage::Text(text)).await {
          warn!(order = order_id, error = %e, "live send failed");
          let _ = events.send(LiveEvent::Disconnected(Some(e.to_string())));
          break;
        }
      }
    }
  }
  let _ = sink.close().await;
}
