use chrono::{DateTime, Local, Utc};
use ratatui::prelude::Color;
use ratatui::widgets::ListState;

use crate::api::types::{OrderStatus, Priority};
use crate::cache::{CacheResult, CacheSource};

/// Truncate to `max_len` characters, ending in "..." when cut
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

pub fn status_color(status: OrderStatus) -> Color {
  match status {
    OrderStatus::Open => Color::Yellow,
    OrderStatus::Resolved => Color::Green,
    OrderStatus::Cancelled => Color::DarkGray,
  }
}

pub fn priority_color(priority: Priority) -> Color {
  match priority {
    Priority::Low => Color::DarkGray,
    Priority::Medium => Color::White,
    Priority::High => Color::LightRed,
    Priority::Critical => Color::Red,
  }
}

/// Keep a list selection inside `len` items
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

/// Row or column count as a terminal dimension, pinned at `u16::MAX`
pub fn cells(n: usize) -> u16 {
  u16::try_from(n).unwrap_or(u16::MAX)
}

pub fn local_time(ts: DateTime<Utc>) -> String {
  ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Suffix for a view title saying where its data came from.
pub fn source_badge<T>(result: &CacheResult<T>) -> String {
  match (result.source, result.cached_at) {
    (CacheSource::Offline, Some(at)) => format!(" [offline, saved {}]", local_time(at)),
    (CacheSource::Offline, None) => " [offline]".to_string(),
    (CacheSource::CacheStale, _) => " [refreshing]".to_string(),
    _ => String::new(),
  }
}
