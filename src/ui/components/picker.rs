use super::KeyResult;
use crate::ui::renderfns::cells;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerEvent<T> {
  Selected(T),
  Cancelled,
}

#[derive(Debug, Clone)]
pub struct PickerItem<T> {
  pub label: String,
  pub value: T,
  /// Shown with a check mark (current filter value, chosen tags)
  pub marked: bool,
}

impl<T> PickerItem<T> {
  pub fn new(label: impl Into<String>, value: T) -> Self {
    Self {
      label: label.into(),
      value,
      marked: false,
    }
  }

  pub fn marked(mut self, marked: bool) -> Self {
    self.marked = marked;
    self
  }
}

/// Centered single-choice overlay (status, priority, tag, transition).
#[derive(Debug, Clone)]
pub struct Picker<T> {
  active: bool,
  items: Vec<PickerItem<T>>,
  selected: usize,
  title: String,
}

impl<T> Default for Picker<T> {
  fn default() -> Self {
    Self {
      active: false,
      items: Vec::new(),
      selected: 0,
      title: String::new(),
    }
  }
}

impl<T: Clone> Picker<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Open with the given choices; the first marked one starts highlighted.
  pub fn show(&mut self, title: impl Into<String>, items: Vec<PickerItem<T>>) {
    self.selected = items.iter().position(|i| i.marked).unwrap_or(0);
    self.active = !items.is_empty();
    self.items = items;
    self.title = title.into();
  }

  pub fn hide(&mut self) {
    self.active = false;
    self.items.clear();
    self.selected = 0;
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<PickerEvent<T>> {
    if !self.active {
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Esc | KeyCode::Char('q') => {
        self.hide();
        KeyResult::Event(PickerEvent::Cancelled)
      }
      KeyCode::Enter => {
        let event = match self.items.get(self.selected) {
          Some(item) => PickerEvent::Selected(item.value.clone()),
          None => PickerEvent::Cancelled,
        };
        self.hide();
        KeyResult::Event(event)
      }
      KeyCode::Char('j') | KeyCode::Down => {
        if !self.items.is_empty() {
          self.selected = (self.selected + 1) % self.items.len();
        }
        KeyResult::Handled
      }
      KeyCode::Char('k') | KeyCode::Up => {
        if !self.items.is_empty() {
          self.selected = (self.selected + self.items.len() - 1) % self.items.len();
        }
        KeyResult::Handled
      }
      _ => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let longest = self
      .items
      .iter()
      .map(|i| i.label.chars().count())
      .chain(std::iter::once(self.title.chars().count()))
      .max()
      .unwrap_or(10);
    let width = cells(longest)
      .saturating_add(8)
      .clamp(20, area.width.saturating_sub(4).max(20));
    let height = cells(self.items.len())
      .saturating_add(2)
      .clamp(3, area.height.saturating_sub(2).max(3));
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let overlay_area = Rect::new(x, y, width.min(area.width), height.min(area.height));
    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));

    let items: Vec<ListItem> = self
      .items
      .iter()
      .map(|item| {
        let mark = if item.marked { "✓ " } else { "  " };
        ListItem::new(Line::from(vec![
          Span::styled(mark, Style::default().fg(Color::Green)),
          Span::styled(item.label.clone(), Style::default().fg(Color::Cyan)),
        ]))
      })
      .collect();
    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));
    let mut state = ListState::default();
    state.select(Some(self.selected));
    frame.render_stateful_widget(list, overlay_area, &mut state);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn picker() -> Picker<Option<u8>> {
    let mut picker = Picker::new();
    picker.show(
      "Pick",
      vec![
        PickerItem::new("Any", None),
        PickerItem::new("One", Some(1)),
        PickerItem::new("Two", Some(2)).marked(true),
      ],
    );
    picker
  }

  #[test]
  fn test_starts_on_marked_item() {
    let mut picker = picker();
    assert_eq!(
      picker.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(PickerEvent::Selected(Some(2)))
    );
    assert!(!picker.is_active());
  }

  #[test]
  fn test_navigation_wraps() {
    let mut picker = picker();
    picker.handle_key(key(KeyCode::Down));
    assert_eq!(
      picker.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(PickerEvent::Selected(None))
    );
  }

  #[test]
  fn test_cancel_and_inactive() {
    let mut picker = picker();
    assert_eq!(
      picker.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(PickerEvent::Cancelled)
    );
    assert_eq!(picker.handle_key(key(KeyCode::Enter)), KeyResult::NotHandled);
  }

  #[test]
  fn test_empty_list_stays_closed() {
    let mut picker: Picker<u8> = Picker::new();
    picker.show("Nothing", Vec::new());
    assert!(!picker.is_active());
  }

  #[test]
  fn test_oversized_label_fits_small_terminal() {
    let mut picker = Picker::new();
    picker.show("Pick", vec![PickerItem::new("x".repeat(65_530), 1u8)]);
    let mut terminal = Terminal::new(ratatui::backend::TestBackend::new(40, 10)).unwrap();
    terminal
      .draw(|frame| picker.render_overlay(frame, frame.area()))
      .unwrap();
    assert!(picker.is_active());
  }
}
