use super::input::{InputResult, TextInput};
use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Events emitted by search input that parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
  /// Raw text after a keystroke; the parent debounces it
  Changed(String),
  /// Enter pressed: apply this term now
  Submitted(String),
  /// Escape pressed: search cleared
  Cancelled,
}

/// `/` search overlay.
#[derive(Debug, Clone, Default)]
pub struct SearchInput {
  input: TextInput,
  active: bool,
}

impl SearchInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn query(&self) -> &str {
    self.input.value()
  }

  /// Open the overlay prefilled with the term currently applied.
  pub fn activate(&mut self, current: &str) {
    self.active = true;
    self.input.set_value(current);
  }

  /// Call this regardless of active state - it handles activation too
  pub fn handle_key(&mut self, key: KeyEvent, current: &str) -> KeyResult<SearchEvent> {
    if !self.active {
      if key.code == KeyCode::Char('/') {
        self.activate(current);
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match self.input.handle_key(key) {
      InputResult::Submitted(value) => {
        self.active = false;
        KeyResult::Event(SearchEvent::Submitted(value))
      }
      InputResult::Cancelled => {
        self.active = false;
        self.input.clear();
        KeyResult::Event(SearchEvent::Cancelled)
      }
      InputResult::Consumed => KeyResult::Event(SearchEvent::Changed(self.input.value().to_string())),
      // Swallow everything else while the overlay is open
      InputResult::NotHandled => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let width = (area.width * 60 / 100).clamp(30, 60).min(area.width);
    let overlay_area = Rect::new(area.x + 1, area.y + 1, width, 3);
    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Search orders ");
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);
    if inner.height == 0 {
      return;
    }

    let (before, after) = self.input.split_at_cursor();
    let line = Line::from(vec![
      Span::styled("/", Style::default().fg(Color::Yellow)),
      Span::raw(before),
      Span::styled("_", Style::default().fg(Color::Yellow)),
      Span::raw(after),
    ]);
    frame.render_widget(Paragraph::new(line), inner);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_activation_prefills_current_term() {
    let mut search = SearchInput::new();
    assert_eq!(search.handle_key(key(KeyCode::Char('x')), ""), KeyResult::NotHandled);
    assert_eq!(search.handle_key(key(KeyCode::Char('/')), "red"), KeyResult::Handled);
    assert!(search.is_active());
    assert_eq!(search.query(), "red");
  }

  #[test]
  fn test_keystrokes_then_submit() {
    let mut search = SearchInput::new();
    search.handle_key(key(KeyCode::Char('/')), "");
    assert_eq!(
      search.handle_key(key(KeyCode::Char('w')), ""),
      KeyResult::Event(SearchEvent::Changed("w".into()))
    );
    assert_eq!(
      search.handle_key(key(KeyCode::Enter), ""),
      KeyResult::Event(SearchEvent::Submitted("w".into()))
    );
    assert!(!search.is_active());
  }

  #[test]
  fn test_escape_cancels() {
    let mut search = SearchInput::new();
    search.handle_key(key(KeyCode::Char('/')), "red");
    assert_eq!(
      search.handle_key(key(KeyCode::Esc), ""),
      KeyResult::Event(SearchEvent::Cancelled)
    );
    assert_eq!(search.query(), "");
  }
}
