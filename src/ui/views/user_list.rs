use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::api::types::{Page, User, UserId};
use crate::auth::Capability;
use crate::query::{CachedQuery, Query, QueryState};
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::context::DeskContext;
use crate::ui::renderfns::{ensure_valid_selection, source_badge, truncate, Notice};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Paged user directory with a submitted (not debounced) search.
pub struct UserListView {
  ctx: DeskContext,
  page: u32,
  term: String,
  query: CachedQuery<Page<User>>,
  list_state: ListState,
  search: SearchInput,
  confirm_delete: Option<UserId>,
  pending: Option<Query<()>>,
}

fn users_query(ctx: &DeskContext, page: u32, term: &str) -> CachedQuery<Page<User>> {
  let service = ctx.service.clone();
  let term = term.to_string();
  let mut query = Query::new(move || {
    let service = service.clone();
    let term = term.clone();
    async move { service.users(page, &term).await }
  });
  query.fetch();
  query
}

impl UserListView {
  pub fn new(ctx: DeskContext) -> Self {
    let query = users_query(&ctx, 1, "");
    Self {
      ctx,
      page: 1,
      term: String::new(),
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      confirm_delete: None,
      pending: None,
    }
  }

  fn load(&mut self, page: u32, term: String) {
    self.page = page.max(1);
    self.term = term.trim().to_string();
    self.query = users_query(&self.ctx, self.page, &self.term);
    self.list_state.select(Some(0));
  }

  fn selected_user(&self) -> Option<&User> {
    self.list_state.selected().and_then(|i| self.users().get(i))
  }

  fn delete(&mut self, id: UserId) {
    let mutations = self.ctx.mutations.clone();
    let mut query = Query::new(move || {
      let mutations = mutations.clone();
      async move { mutations.delete_user(id).await }
    });
    query.fetch();
    self.pending = Some(query);
  }

  fn users(&self) -> &[User] {
    self
      .query
      .data()
      .map(|r| r.data.items.as_slice())
      .unwrap_or(&[])
  }
}

impl View for UserListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key, &self.term) {
      KeyResult::Event(SearchEvent::Submitted(term)) => {
        self.load(1, term);
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Cancelled) => {
        if !self.term.is_empty() {
          self.load(1, String::new());
        }
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Changed(_)) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    if let Some(id) = self.confirm_delete.take() {
      if key.code == KeyCode::Char('y') {
        self.delete(id);
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('D') => {
        if !self.ctx.can(Capability::ManageUsers) {
          return ViewAction::Notify(Notice::Error("Only admins can delete users".to_string()));
        }
        if let Some(user) = self.selected_user() {
          let prompt = format!("Delete user {}? (y to confirm)", user.username);
          self.confirm_delete = Some(user.id);
          return ViewAction::Notify(Notice::Info(prompt));
        }
      }
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char(']') => {
        if self.query.data().is_some_and(|r| r.data.has_next) {
          self.load(self.page + 1, self.term.clone());
        }
      }
      KeyCode::Char('[') => {
        if self.page > 1 {
          self.load(self.page - 1, self.term.clone());
        }
      }
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.users().len();
    ensure_valid_selection(&mut self.list_state, len);

    let search = if self.term.is_empty() {
      String::new()
    } else {
      format!(" \"{}\"", self.term)
    };
    let title = match (self.query.state(), self.query.data()) {
      (QueryState::Error(e), _) => format!(" Users (error: {}) ", e),
      (_, Some(result)) => format!(
        " Users{} ({} total) page {}{} ",
        search,
        result.data.total,
        result.data.page,
        source_badge(result)
      ),
      _ => " Users (loading...) ".to_string(),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = if self.query.is_error() {
        "Failed to load users. Press 'r' to retry."
      } else if self.query.is_loading() {
        "Loading..."
      } else {
        "No users found."
      };
      frame.render_widget(
        Paragraph::new(content)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      self.search.render_overlay(frame, area);
      return;
    }

    let items: Vec<ListItem> = self
      .users()
      .iter()
      .map(|user| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("#{:<6}", user.id), Style::default().fg(Color::Cyan)),
          Span::raw(format!("{:<20}", truncate(&user.username, 18))),
          Span::raw(format!("{:<28}", truncate(&user.display_name(), 26))),
          Span::styled(
            format!("{:<32}", truncate(&user.email, 30)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::styled(user.groups.join(", "), Style::default().fg(Color::Magenta)),
        ]))
      })
      .collect();
    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Users".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();
    let Some(pending) = self.pending.as_mut() else {
      return ViewAction::None;
    };
    if !pending.poll() {
      return ViewAction::None;
    }
    let action = match pending.error() {
      Some(err) => ViewAction::Notify(Notice::Error(err.to_string())),
      None => {
        self.query.refetch();
        ViewAction::Notify(Notice::Info("User deleted".to_string()))
      }
    };
    self.pending = None;
    action
  }

  fn captures_input(&self) -> bool {
    self.search.is_active() || self.confirm_delete.is_some()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("[ ]", "page").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ];
    shortcuts.push(
      ShortcutInfo::new("D", "delete")
        .with_priority(50)
        .allowed(self.ctx.can(Capability::ManageUsers)),
    );
    shortcuts
  }
}
