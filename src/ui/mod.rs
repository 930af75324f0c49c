pub mod components;
pub mod context;
pub mod renderfns;
pub mod view;
pub mod views;

use ratatui::prelude::*;

/// Header, content and footer rows of the main screen.
pub fn screen_layout(area: Rect) -> [Rect; 3] {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Active view
      Constraint::Length(1), // Breadcrumbs / notices
    ])
    .split(area);
  [chunks[0], chunks[1], chunks[2]]
}
