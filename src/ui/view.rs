use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use crate::ui::renderfns::Notice;

/// When a shortcut should be shown in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortcutVisibility {
  #[default]
  Always,
  /// Only offered to users allowed to use it
  Hidden,
}

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub visibility: ShortcutVisibility,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      visibility: ShortcutVisibility::Always,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }

  /// Show only when `allowed`, e.g. admin-only actions
  pub const fn allowed(mut self, allowed: bool) -> Self {
    if !allowed {
      self.visibility = ShortcutVisibility::Hidden;
    }
    self
  }
}

/// Actions that a view can request from the App
pub enum ViewAction {
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
  /// Show a message in the footer
  Notify(Notice),
}

/// A screen on the view stack.
///
/// Views own their queries and cache subscriptions, so popping a view
/// stops everything it started. Async work is polled from `tick()`.
pub trait View {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  fn render(&mut self, frame: &mut Frame, area: Rect);

  fn breadcrumb_label(&self) -> String;

  /// Poll queries, live channels and timers
  fn tick(&mut self) -> ViewAction {
    ViewAction::None
  }

  /// True while a text field or overlay owns the keyboard, so global
  /// keys (`:`, `q`) go to the view instead
  fn captures_input(&self) -> bool {
    false
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
