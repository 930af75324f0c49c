use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal was resized; the next draw picks up the new size
  Resize,
  /// Periodic tick for query polling, debounce and live frames
  Tick,
}

/// Merges terminal input and a tick timer into one channel.
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
  task: JoinHandle<()>,
}

impl EventHandler {
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
      let mut input = EventStream::new();
      let mut ticks = tokio::time::interval(tick_rate);
      ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

      loop {
        let event = tokio::select! {
          _ = ticks.tick() => Event::Tick,
          next = input.next() => match next {
            // Windows reports releases too
            Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => Event::Key(key),
            Some(Ok(CrosstermEvent::Resize(_, _))) => Event::Resize,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
              warn!(error = %e, "terminal input error");
              continue;
            }
            None => break,
          },
        };
        if tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { rx, task }
  }

  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

impl Drop for EventHandler {
  fn drop(&mut self) {
    self.task.abort();
  }
}
