use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tracing::warn;

use crate::api::cache::DeskQueryKey;
use crate::api::types::{Message, Order, OrderId, OrderStatus};
use crate::auth::Capability;
use crate::cache::CacheWatch;
use crate::export::{self, ExportPaths};
use crate::live::chat::ChatLog;
use crate::live::socket::LiveChannel;
use crate::live::LiveEvent;
use crate::query::{CachedQuery, Query, QueryState};
use crate::ui::components::{
  InputResult, KeyResult, Picker, PickerEvent, PickerItem, TextInput,
};
use crate::ui::context::DeskContext;
use crate::ui::renderfns::{
  cells, local_time, priority_color, source_badge, status_color, Notice,
};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// What a finished background action produced
enum Outcome {
  Sent(Message),
  Changed(Order),
  Deleted,
}

enum LiveState {
  Off,
  Connected,
  Lost(String),
}

/// One order: header, detail, chat log with live updates.
pub struct OrderDetailView {
  ctx: DeskContext,
  id: OrderId,
  query: CachedQuery<Order>,
  watch: CacheWatch,
  chat: Option<ChatLog>,
  live: Option<LiveChannel>,
  live_state: LiveState,
  compose: TextInput,
  composing: bool,
  status_picker: Picker<OrderStatus>,
  confirm_delete: bool,
  pending: Option<Query<Outcome>>,
  scroll: u16,
}

impl OrderDetailView {
  pub fn new(ctx: DeskContext, id: OrderId) -> Self {
    let service = ctx.service.clone();
    let mut query = Query::new(move || {
      let service = service.clone();
      async move { service.order(id).await }
    });
    query.fetch();
    let watch = CacheWatch::new(ctx.service.cache(), &DeskQueryKey::Order { id });

    let (live, live_state) = match &ctx.ws_base {
      Some(base) => match LiveChannel::connect(base, Some(ctx.token()), id) {
        Ok(channel) => (Some(channel), LiveState::Connected),
        Err(err) => {
          warn!(order = id, error = %err, "live channel unavailable");
          (None, LiveState::Lost(err.to_string()))
        }
      },
      None => (None, LiveState::Off),
    };

    Self {
      ctx,
      id,
      query,
      watch,
      chat: None,
      live,
      live_state,
      compose: TextInput::new(),
      composing: false,
      status_picker: Picker::new(),
      confirm_delete: false,
      pending: None,
      scroll: 0,
    }
  }

  fn order(&self) -> Option<&Order> {
    self.query.data().map(|r| r.data.as_ref())
  }

  fn busy(&self) -> bool {
    self.pending.as_ref().is_some_and(|p| p.is_loading())
  }

  fn run<F, Fut>(&mut self, action: F)
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = crate::error::DeskResult<Outcome>> + Send + 'static,
  {
    let mut query = Query::new(action);
    query.fetch();
    self.pending = Some(query);
  }

  fn send_message(&mut self, text: String) {
    let mutations = self.ctx.mutations.clone();
    let id = self.id;
    self.run(move || {
      let mutations = mutations.clone();
      let text = text.clone();
      async move { mutations.send_message(id, &text).await.map(Outcome::Sent) }
    });
  }

  fn change_status(&mut self, to: OrderStatus) {
    let Some(order) = self.order().cloned() else {
      return;
    };
    let mutations = self.ctx.mutations.clone();
    self.run(move || {
      let mutations = mutations.clone();
      let order = order.clone();
      async move { mutations.change_status(&order, to).await.map(Outcome::Changed) }
    });
  }

  fn assign_self(&mut self) -> ViewAction {
    let (Some(order), Some(me)) = (self.order(), self.ctx.user_id()) else {
      return ViewAction::None;
    };
    if order.is_assigned_to(me) {
      return ViewAction::Notify(Notice::Info("Already assigned to you".to_string()));
    }
    let mut agents: Vec<_> = order.agents.iter().map(|a| a.id).collect();
    agents.push(me);
    let mutations = self.ctx.mutations.clone();
    let id = self.id;
    self.run(move || {
      let mutations = mutations.clone();
      let agents = agents.clone();
      async move { mutations.assign_agents(id, agents).await.map(Outcome::Changed) }
    });
    ViewAction::None
  }

  fn delete(&mut self) {
    let mutations = self.ctx.mutations.clone();
    let id = self.id;
    self.run(move || {
      let mutations = mutations.clone();
      async move { mutations.delete_order(id).await.map(|_| Outcome::Deleted) }
    });
  }

  fn export(&self) -> ViewAction {
    let Some(order) = self.order() else {
      return ViewAction::None;
    };
    match export::export_order(order, &self.ctx.export_dir) {
      Ok(ExportPaths { receipt, .. }) => ViewAction::Notify(Notice::Info(format!(
        "Exported to {}",
        receipt.parent().unwrap_or(receipt.as_path()).display()
      ))),
      Err(err) => ViewAction::Notify(Notice::Error(err.to_string())),
    }
  }

  fn open_status_picker(&mut self) -> ViewAction {
    let Some(order) = self.order() else {
      return ViewAction::None;
    };
    let allowed = self
      .ctx
      .session
      .as_ref()
      .is_some_and(|s| s.can_change_status(order));
    if !allowed {
      return ViewAction::Notify(Notice::Error(
        "Only assigned agents or admins can change the status".to_string(),
      ));
    }
    let items = order
      .status
      .transitions()
      .iter()
      .map(|s| PickerItem::new(format!("{} ({})", s.action_label(), s.label()), *s))
      .collect();
    self.status_picker.show(format!("Order #{}", self.id), items);
    ViewAction::None
  }

  /// Drain the socket: keep the cache and the chat log in step.
  fn poll_live(&mut self) -> ViewAction {
    let Some(live) = self.live.as_mut() else {
      return ViewAction::None;
    };
    let mut action = ViewAction::None;
    while let Some(event) = live.try_recv() {
      if let Err(err) = event.apply_to_cache(self.ctx.service.cache()) {
        warn!(error = %err, "live event not applied to cache");
      }
      if let Some(chat) = self.chat.as_mut() {
        chat.apply(&event);
      }
      match event {
        LiveEvent::Disconnected(reason) => {
          self.live_state = LiveState::Lost(reason.unwrap_or_else(|| "closed".to_string()));
        }
        LiveEvent::OrderDeleted(id) if id == self.id => {
          action = ViewAction::Pop;
        }
        _ => {}
      }
    }
    if matches!(self.live_state, LiveState::Lost(_)) {
      self.live = None;
    }
    action
  }

  fn finish_pending(&mut self) -> ViewAction {
    let Some(pending) = self.pending.as_mut() else {
      return ViewAction::None;
    };
    if !pending.poll() {
      return ViewAction::None;
    }
    let Some(done) = self.pending.take() else {
      return ViewAction::None;
    };
    match done.state() {
      QueryState::Success(Outcome::Sent(message)) => {
        if let Some(chat) = self.chat.as_mut() {
          chat.push(message.clone());
        }
        if let Some(live) = &self.live {
          if let Err(err) = live.announce(message) {
            warn!(error = %err, "message not announced on live channel");
          }
        }
        ViewAction::None
      }
      QueryState::Success(Outcome::Changed(order)) => ViewAction::Notify(Notice::Info(format!(
        "Order #{} is {} ({})",
        order.id,
        order.status,
        order.agent_names()
      ))),
      QueryState::Success(Outcome::Deleted) => ViewAction::Pop,
      QueryState::Error(err) => ViewAction::Notify(Notice::Error(err.to_string())),
      QueryState::Idle | QueryState::Loading => ViewAction::None,
    }
  }

  fn render_header(&self, frame: &mut Frame, area: Rect, order: &Order) {
    let label = |s: &'static str| Span::styled(s, Style::default().fg(Color::DarkGray));
    let tags = order
      .tags
      .iter()
      .map(|t| t.name.as_str())
      .collect::<Vec<_>>()
      .join(", ");
    let lines = vec![
      Line::from(vec![
        label("Status:   "),
        Span::styled(
          order.status.label(),
          Style::default().fg(status_color(order.status)).bold(),
        ),
        label("   Priority: "),
        Span::styled(
          order.priority.label(),
          Style::default().fg(priority_color(order.priority)),
        ),
      ]),
      Line::from(vec![
        label("Client:   "),
        Span::raw(order.client.display_name()),
        label("   Agents: "),
        Span::raw(order.agent_names()),
      ]),
      Line::from(vec![
        label("Location: "),
        Span::raw(order.location.describe()),
        label("   Tags: "),
        Span::raw(if tags.is_empty() { "-".to_string() } else { tags }),
      ]),
      Line::from(vec![
        label("Opened:   "),
        Span::raw(local_time(order.created)),
        label("   Updated: "),
        Span::raw(local_time(order.updated)),
      ]),
      Line::raw(""),
      Line::raw(order.detail.clone()),
    ];
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
  }

  fn render_chat(&self, frame: &mut Frame, area: Rect) {
    let live = match &self.live_state {
      LiveState::Off => String::new(),
      LiveState::Connected => " ● live".to_string(),
      LiveState::Lost(reason) => format!(" ○ offline: {}", reason),
    };
    let messages = self.chat.as_ref().map(|c| c.messages()).unwrap_or(&[]);
    let block = Block::default()
      .title(format!(" Messages ({}){} ", messages.len(), live))
      .borders(Borders::TOP)
      .border_style(Style::default().fg(Color::DarkGray));

    let me = self.ctx.user_id();
    let lines: Vec<Line> = messages
      .iter()
      .map(|m| {
        let color = if Some(m.author.id) == me {
          Color::Green
        } else {
          Color::Cyan
        };
        let mut spans = vec![
          Span::styled(
            format!("{} ", local_time(m.created)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::styled(
            format!("{}: ", m.author.display_name()),
            Style::default().fg(color).bold(),
          ),
          Span::raw(m.text.clone()),
        ];
        if !m.attachments.is_empty() {
          spans.push(Span::styled(
            format!("  [{} attachment(s)]", m.attachments.len()),
            Style::default().fg(Color::DarkGray),
          ));
        }
        Line::from(spans)
      })
      .collect();

    // Newest at the bottom; `scroll` counts lines up from the end
    let inner_height = area.height.saturating_sub(1);
    let offset = cells(lines.len())
      .saturating_sub(inner_height)
      .saturating_sub(self.scroll);
    let paragraph = Paragraph::new(lines)
      .block(block)
      .wrap(Wrap { trim: false })
      .scroll((offset, 0));
    frame.render_widget(paragraph, area);
  }

  fn render_compose(&self, frame: &mut Frame, area: Rect) {
    let (before, after) = self.compose.split_at_cursor();
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Message (Enter send, Esc cancel) ");
    let line = Line::from(vec![
      Span::raw(before),
      Span::styled("_", Style::default().fg(Color::Yellow)),
      Span::raw(after),
    ]);
    frame.render_widget(Paragraph::new(line).block(block), area);
  }
}

impl View for OrderDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.composing {
      match self.compose.handle_key(key) {
        InputResult::Submitted(text) => {
          if text.trim().is_empty() {
            return ViewAction::None;
          }
          self.composing = false;
          self.compose.clear();
          self.scroll = 0;
          self.send_message(text);
        }
        InputResult::Cancelled => self.composing = false,
        InputResult::Consumed | InputResult::NotHandled => {}
      }
      return ViewAction::None;
    }

    match self.status_picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(to)) => {
        self.change_status(to);
        return ViewAction::None;
      }
      KeyResult::Event(PickerEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    if self.confirm_delete {
      self.confirm_delete = false;
      if key.code == KeyCode::Char('y') {
        self.delete();
      }
      return ViewAction::None;
    }

    if self.busy() && !matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
      return ViewAction::Notify(Notice::Info("Working...".to_string()));
    }

    match key.code {
      KeyCode::Char('i') if self.order().is_some() => self.composing = true,
      KeyCode::Char('S') => return self.open_status_picker(),
      KeyCode::Char('D') => {
        if !self.ctx.can(Capability::DeleteOrder) {
          return ViewAction::Notify(Notice::Error("Only admins can delete orders".to_string()));
        }
        self.confirm_delete = true;
        return ViewAction::Notify(Notice::Info(format!(
          "Delete order #{}? (y to confirm)",
          self.id
        )));
      }
      KeyCode::Char('a') => {
        if !self.ctx.can(Capability::AssignOrder) {
          return ViewAction::Notify(Notice::Error("Only admins can assign orders".to_string()));
        }
        return self.assign_self();
      }
      KeyCode::Char('x') => return self.export(),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = match (self.query.state(), self.order()) {
      (QueryState::Error(e), _) => format!(" Order #{} (error: {}) ", self.id, e),
      (_, Some(order)) => {
        let badge = self.query.data().map(source_badge).unwrap_or_default();
        format!(" #{} {}{} ", order.id, order.title, badge)
      }
      _ => format!(" Order #{} (loading...) ", self.id),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(order) = self.order().cloned() else {
      let content = match self.query.error() {
        Some(err) => format!("Error: {}\n\nPress 'r' to retry.", err),
        None => "Loading order...".to_string(),
      };
      frame.render_widget(
        Paragraph::new(content).style(Style::default().fg(Color::DarkGray)),
        inner,
      );
      return;
    };

    let detail_lines = cells(order.detail.lines().count().max(1));
    let compose_height = if self.composing { 3 } else { 0 };
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(detail_lines.saturating_add(5).min(inner.height / 2)),
        Constraint::Min(3),
        Constraint::Length(compose_height),
      ])
      .split(inner);

    self.render_header(frame, chunks[0], &order);
    self.render_chat(frame, chunks[1]);
    if self.composing {
      self.render_compose(frame, chunks[2]);
    }
    self.status_picker.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("#{}", self.id)
  }

  fn tick(&mut self) -> ViewAction {
    if self.query.poll() {
      if let Some(order) = self.query.data().map(|r| r.data.clone()) {
        match self.chat.as_mut() {
          Some(chat) => chat.sync(&order),
          None => self.chat = Some(ChatLog::new(&order)),
        }
      }
    }
    if self.watch.poll() {
      self.query.refetch();
    }
    if let ViewAction::Pop = self.poll_live() {
      return ViewAction::Pop;
    }
    self.finish_pending()
  }

  fn captures_input(&self) -> bool {
    self.composing || self.status_picker.is_active() || self.confirm_delete
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let admin = self.ctx.can(Capability::DeleteOrder);
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("i", "message").with_priority(20),
      ShortcutInfo::new("S", "status").with_priority(30),
      ShortcutInfo::new("a", "assign me")
        .with_priority(40)
        .allowed(admin),
      ShortcutInfo::new("D", "delete").with_priority(50).allowed(admin),
      ShortcutInfo::new("x", "export").with_priority(60),
      ShortcutInfo::new("r", "refresh").with_priority(70),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
