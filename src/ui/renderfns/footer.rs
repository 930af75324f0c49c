use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Transient message shown at the right of the footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
  Info(String),
  Error(String),
}

/// Footer bar: view breadcrumb on the left, last notice on the right.
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &[String], notice: Option<&Notice>) {
  let mut spans = vec![Span::raw(" ")];
  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }
    let style = if i + 1 == breadcrumb.len() {
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };
    spans.push(Span::styled(part.clone(), style));
  }

  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
    .split(area);
  let bar = Style::default().bg(Color::Black);
  frame.render_widget(Paragraph::new(Line::from(spans)).style(bar), chunks[0]);

  let notice = match notice {
    Some(Notice::Info(msg)) => Span::styled(format!("{} ", msg), Style::default().fg(Color::Green)),
    Some(Notice::Error(msg)) => Span::styled(format!("{} ", msg), Style::default().fg(Color::Red)),
    None => Span::raw(""),
  };
  frame.render_widget(
    Paragraph::new(Line::from(notice))
      .alignment(Alignment::Right)
      .style(bar),
    chunks[1],
  );
}
