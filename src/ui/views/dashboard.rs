use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Paragraph};

use crate::api::cache::DeskQueryKey;
use crate::api::types::{Order, OrderStatus, Priority};
use crate::cache::CacheWatch;
use crate::query::{CachedQuery, Query, QueryState};
use crate::stats::DashboardStats;
use crate::ui::context::DeskContext;
use crate::ui::renderfns::{priority_color, source_badge, status_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

const TOP_AGENTS: usize = 10;

/// Workload figures over every order.
pub struct DashboardView {
  query: CachedQuery<Vec<Order>>,
  watch: CacheWatch,
  stats: Option<DashboardStats>,
}

impl DashboardView {
  pub fn new(ctx: DeskContext) -> Self {
    let service = ctx.service.clone();
    let mut query = Query::new(move || {
      let service = service.clone();
      async move { service.all_orders().await }
    });
    query.fetch();
    let watch = CacheWatch::new(ctx.service.cache(), &DeskQueryKey::AllOrders);
    Self {
      query,
      watch,
      stats: None,
    }
  }

  fn render_status(&self, frame: &mut Frame, area: Rect, stats: &DashboardStats) {
    let bars: Vec<Bar> = OrderStatus::ALL
      .iter()
      .map(|s| {
        Bar::default()
          .label(s.label().into())
          .value(stats.count(*s) as u64)
          .style(Style::default().fg(status_color(*s)))
      })
      .collect();
    let chart = BarChart::default()
      .block(Block::default().title(" By status ").borders(Borders::ALL))
      .data(BarGroup::default().bars(&bars))
      .bar_width(10)
      .bar_gap(2);
    frame.render_widget(chart, area);
  }

  fn render_priority(&self, frame: &mut Frame, area: Rect, stats: &DashboardStats) {
    let bars: Vec<Bar> = Priority::ALL
      .iter()
      .map(|p| {
        Bar::default()
          .label(p.label().into())
          .value(stats.by_priority.get(p).copied().unwrap_or(0) as u64)
          .style(Style::default().fg(priority_color(*p)))
      })
      .collect();
    let chart = BarChart::default()
      .block(Block::default().title(" By priority ").borders(Borders::ALL))
      .data(BarGroup::default().bars(&bars))
      .bar_width(8)
      .bar_gap(2);
    frame.render_widget(chart, area);
  }

  fn render_agents(&self, frame: &mut Frame, area: Rect, stats: &DashboardStats) {
    let busiest = stats.busiest_agents();
    let max = busiest.first().map(|(_, n)| *n).unwrap_or(0).max(1);
    let bar_space = area.width.saturating_sub(34) as usize;
    let lines: Vec<Line> = busiest
      .iter()
      .take(TOP_AGENTS)
      .map(|(name, count)| {
        let filled = count * bar_space / max;
        Line::from(vec![
          Span::raw(format!(" {:<24}", truncate(name, 22))),
          Span::styled(format!("{:>4} ", count), Style::default().fg(Color::Yellow)),
          Span::styled("█".repeat(filled), Style::default().fg(Color::Cyan)),
        ])
      })
      .collect();
    let paragraph = Paragraph::new(lines).block(
      Block::default()
        .title(" Open orders per agent ")
        .borders(Borders::ALL),
    );
    frame.render_widget(paragraph, area);
  }
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let badge = self.query.data().map(source_badge).unwrap_or_default();
    let summary = match (&self.stats, self.query.state()) {
      (Some(stats), _) => Line::from(vec![
        Span::styled(" Total ", Style::default().fg(Color::DarkGray)),
        Span::styled(stats.total.to_string(), Style::default().bold()),
        Span::styled("   Open critical ", Style::default().fg(Color::DarkGray)),
        Span::styled(
          stats.open_critical.to_string(),
          Style::default().fg(Color::Red).bold(),
        ),
        Span::styled("   New this week ", Style::default().fg(Color::DarkGray)),
        Span::styled(stats.created_last_week.to_string(), Style::default().bold()),
        Span::styled(badge, Style::default().fg(Color::DarkGray)),
      ]),
      (None, QueryState::Error(e)) => Line::styled(
        format!(" Failed to load orders: {}. Press 'r' to retry.", e),
        Style::default().fg(Color::Red),
      ),
      (None, _) => Line::styled(" Loading every order...", Style::default().fg(Color::DarkGray)),
    };

    let outer = Block::default()
      .title(" Dashboard ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1),
        Constraint::Length(10),
        Constraint::Min(3),
      ])
      .split(inner);
    frame.render_widget(Paragraph::new(summary), rows[0]);

    let Some(stats) = self.stats.as_ref() else {
      return;
    };
    let charts = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
      .split(rows[1]);
    self.render_status(frame, charts[0], stats);
    self.render_priority(frame, charts[1], stats);
    self.render_agents(frame, rows[2], stats);
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    if self.query.poll() {
      if let Some(orders) = self.query.data() {
        self.stats = Some(DashboardStats::compute(&orders.data, Utc::now()));
      }
    }
    if self.watch.poll() {
      self.query.refetch();
    }
    ViewAction::None
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(20),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
