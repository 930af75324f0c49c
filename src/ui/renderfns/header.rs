use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::ui::view::{ShortcutInfo, ShortcutVisibility};

/// Who is signed in, as shown in the header
pub struct HeaderContext<'a> {
  pub title: &'a str,
  pub api_url: &'a str,
  pub user: Option<&'a str>,
  pub is_admin: bool,
  pub offline: bool,
}

/// Header bar: app name, desk, user, then the active view's shortcuts.
pub fn draw_header(frame: &mut Frame, area: Rect, ctx: &HeaderContext, shortcuts: &[ShortcutInfo]) {
  let sep = || Span::styled("│", Style::default().fg(Color::DarkGray));
  let mut spans = vec![
    Span::styled(" deskboard ", Style::default().fg(Color::Cyan).bold()),
    sep(),
    Span::styled(format!(" {} ", ctx.title), Style::default().fg(Color::White)),
  ];
  let domain = extract_domain(ctx.api_url);
  if domain != ctx.title {
    spans.push(Span::styled(
      format!("({}) ", domain),
      Style::default().fg(Color::DarkGray),
    ));
  }
  spans.push(sep());
  match ctx.user {
    Some(user) => {
      spans.push(Span::styled(
        format!(" {} ", user),
        Style::default().fg(Color::Yellow).bold(),
      ));
      if ctx.is_admin {
        spans.push(Span::styled("[admin] ", Style::default().fg(Color::Magenta)));
      }
    }
    None => spans.push(Span::styled(" signed out ", Style::default().fg(Color::DarkGray))),
  }
  if ctx.offline {
    spans.push(Span::styled(
      "[offline] ",
      Style::default().fg(Color::Black).bg(Color::Yellow),
    ));
  }
  spans.push(Span::raw(" "));

  let mut visible: Vec<&ShortcutInfo> = shortcuts
    .iter()
    .filter(|s| s.visibility == ShortcutVisibility::Always)
    .collect();
  visible.sort_by_key(|s| s.priority);
  for s in visible {
    spans.push(Span::styled(format!("<{}>", s.key), Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(
      format!(" {}  ", s.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host (and port) of an API URL
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_extract_domain() {
    assert_eq!(extract_domain("https://desk.example.com"), "desk.example.com");
    assert_eq!(
      extract_domain("https://desk.example.com/api/"),
      "desk.example.com"
    );
    assert_eq!(extract_domain("http://localhost:8000/api"), "localhost:8000");
  }
}
