use std::future::Future;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs};

use crate::api::cache::DeskQueryKey;
use crate::api::service::Cached;
use crate::api::types::{Building, Group, Sector, Tag, TagId};
use crate::auth::Capability;
use crate::cache::CacheWatch;
use crate::query::{CachedQuery, Query};
use crate::ui::components::{InputResult, TextInput};
use crate::ui::context::DeskContext;
use crate::ui::renderfns::{ensure_valid_selection, source_badge, Notice};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
  Tags,
  Buildings,
  Sectors,
  Groups,
}

const TABS: [Tab; 4] = [Tab::Tags, Tab::Buildings, Tab::Sectors, Tab::Groups];

impl Tab {
  fn title(self) -> &'static str {
    match self {
      Tab::Tags => "Tags",
      Tab::Buildings => "Buildings",
      Tab::Sectors => "Sectors",
      Tab::Groups => "Groups",
    }
  }
}

fn catalog_query<T, F, Fut>(fetch: F) -> CachedQuery<T>
where
  T: Send + Sync + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Cached<T>> + Send + 'static,
{
  let mut query = Query::new(fetch);
  query.fetch();
  query
}

enum TagOutcome {
  Created(Tag),
  Deleted,
}

/// Reference data: tags, buildings, sectors and groups. Admins manage tags here.
pub struct CatalogView {
  ctx: DeskContext,
  tab: usize,
  tags: CachedQuery<Vec<Tag>>,
  buildings: CachedQuery<Vec<Building>>,
  sectors: CachedQuery<Vec<Sector>>,
  groups: CachedQuery<Vec<Group>>,
  watch: CacheWatch,
  list_state: ListState,
  new_tag: Option<TextInput>,
  confirm_delete: Option<TagId>,
  pending: Option<Query<TagOutcome>>,
}

impl CatalogView {
  pub fn new(ctx: DeskContext) -> Self {
    let service = ctx.service.clone();
    let tags = catalog_query(move || {
      let service = service.clone();
      async move { service.tags().await }
    });
    let service = ctx.service.clone();
    let buildings = catalog_query(move || {
      let service = service.clone();
      async move { service.buildings().await }
    });
    let service = ctx.service.clone();
    let sectors = catalog_query(move || {
      let service = service.clone();
      async move { service.sectors().await }
    });
    let service = ctx.service.clone();
    let groups = catalog_query(move || {
      let service = service.clone();
      async move { service.groups().await }
    });
    let watch = CacheWatch::new(ctx.service.cache(), &DeskQueryKey::Tags);
    Self {
      ctx,
      tab: 0,
      tags,
      buildings,
      sectors,
      groups,
      watch,
      list_state: ListState::default(),
      new_tag: None,
      confirm_delete: None,
      pending: None,
    }
  }

  fn current(&self) -> Tab {
    TABS[self.tab]
  }

  fn switch(&mut self, forward: bool) {
    self.tab = if forward {
      (self.tab + 1) % TABS.len()
    } else {
      (self.tab + TABS.len() - 1) % TABS.len()
    };
    self.list_state.select(Some(0));
  }

  fn refetch_current(&mut self) {
    match self.current() {
      Tab::Tags => self.tags.refetch(),
      Tab::Buildings => self.buildings.refetch(),
      Tab::Sectors => self.sectors.refetch(),
      Tab::Groups => self.groups.refetch(),
    }
  }

  /// Rows for the active tab plus the title suffix (badge or state).
  fn rows(&self) -> (Vec<String>, String) {
    fn collect<T: Send + Sync + 'static>(
      query: &CachedQuery<T>,
      row: impl Fn(&T) -> Vec<String>,
    ) -> (Vec<String>, String) {
      match query.data() {
        Some(result) => (row(&result.data), source_badge(result)),
        None if query.is_error() => (
          Vec::new(),
          query
            .error()
            .map(|e| format!(" (error: {})", e))
            .unwrap_or_default(),
        ),
        None => (Vec::new(), " (loading...)".to_string()),
      }
    }
    match self.current() {
      Tab::Tags => collect(&self.tags, |tags| {
        tags.iter().map(|t| format!("#{:<6}{}", t.id, t.name)).collect()
      }),
      Tab::Buildings => collect(&self.buildings, |buildings| {
        buildings
          .iter()
          .map(|b| {
            if b.floors.is_empty() {
              b.name.clone()
            } else {
              format!("{}  (floors: {})", b.name, b.floors.join(", "))
            }
          })
          .collect()
      }),
      Tab::Sectors => collect(&self.sectors, |sectors| {
        sectors.iter().map(|s| s.name.clone()).collect()
      }),
      Tab::Groups => collect(&self.groups, |groups| {
        groups.iter().map(|g| g.name.clone()).collect()
      }),
    }
  }

  fn selected_tag(&self) -> Option<&Tag> {
    let tags = self.tags.data()?;
    self.list_state.selected().and_then(|i| tags.data.get(i))
  }

  fn run(&mut self, mut query: Query<TagOutcome>) {
    query.fetch();
    self.pending = Some(query);
  }

  fn create_tag(&mut self, name: String) {
    let name = name.trim().to_string();
    if name.is_empty() {
      return;
    }
    let mutations = self.ctx.mutations.clone();
    self.run(Query::new(move || {
      let mutations = mutations.clone();
      let name = name.clone();
      async move { mutations.create_tag(&name).await.map(TagOutcome::Created) }
    }));
  }

  fn delete_tag(&mut self, id: TagId) {
    let mutations = self.ctx.mutations.clone();
    self.run(Query::new(move || {
      let mutations = mutations.clone();
      async move { mutations.delete_tag(id).await.map(|_| TagOutcome::Deleted) }
    }));
  }

  fn finish_pending(&mut self) -> ViewAction {
    let Some(pending) = self.pending.as_mut() else {
      return ViewAction::None;
    };
    if !pending.poll() {
      return ViewAction::None;
    }
    let action = match (pending.data(), pending.error()) {
      (Some(TagOutcome::Created(tag)), _) => {
        ViewAction::Notify(Notice::Info(format!("Tag \"{}\" created", tag.name)))
      }
      (Some(TagOutcome::Deleted), _) => ViewAction::Notify(Notice::Info("Tag deleted".to_string())),
      (None, Some(err)) => ViewAction::Notify(Notice::Error(err.to_string())),
      (None, None) => ViewAction::None,
    };
    self.pending = None;
    action
  }
}

impl View for CatalogView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(input) = self.new_tag.as_mut() {
      match input.handle_key(key) {
        InputResult::Submitted(name) => {
          self.new_tag = None;
          self.create_tag(name);
        }
        InputResult::Cancelled => self.new_tag = None,
        _ => {}
      }
      return ViewAction::None;
    }

    if let Some(id) = self.confirm_delete.take() {
      if key.code == KeyCode::Char('y') {
        self.delete_tag(id);
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => self.switch(true),
      KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => self.switch(false),
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.refetch_current(),
      KeyCode::Char('n') if self.current() == Tab::Tags => {
        if !self.ctx.can(Capability::ManageTags) {
          return ViewAction::Notify(Notice::Error("Only admins can manage tags".to_string()));
        }
        self.new_tag = Some(TextInput::new());
      }
      KeyCode::Char('d') if self.current() == Tab::Tags => {
        if !self.ctx.can(Capability::ManageTags) {
          return ViewAction::Notify(Notice::Error("Only admins can manage tags".to_string()));
        }
        if let Some(tag) = self.selected_tag() {
          let prompt = format!("Delete tag \"{}\"? (y to confirm)", tag.name);
          self.confirm_delete = Some(tag.id);
          return ViewAction::Notify(Notice::Info(prompt));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let (rows, suffix) = self.rows();
    ensure_valid_selection(&mut self.list_state, rows.len());

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(3),
        Constraint::Min(3),
        Constraint::Length(if self.new_tag.is_some() { 3 } else { 0 }),
      ])
      .split(area);

    let tabs = Tabs::new(TABS.iter().map(|t| t.title()))
      .select(self.tab)
      .block(Block::default().borders(Borders::ALL).title(" Catalog "))
      .highlight_style(Style::default().fg(Color::Yellow).bold());
    frame.render_widget(tabs, chunks[0]);

    let block = Block::default()
      .title(format!(" {} ({}){} ", self.current().title(), rows.len(), suffix))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if rows.is_empty() {
      frame.render_widget(
        Paragraph::new("Nothing here.")
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        chunks[1],
      );
    } else {
      let items: Vec<ListItem> = rows.into_iter().map(ListItem::new).collect();
      let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
      frame.render_stateful_widget(list, chunks[1], &mut self.list_state);
    }

    if let Some(input) = &self.new_tag {
      let (before, after) = input.split_at_cursor();
      let line = Line::from(vec![
        Span::raw(before.to_string()),
        Span::styled("_", Style::default().fg(Color::Yellow)),
        Span::raw(after.to_string()),
      ]);
      frame.render_widget(
        Paragraph::new(line).block(
          Block::default()
            .title(" New tag (Enter to create, Esc to cancel) ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
        ),
        chunks[2],
      );
    }
  }

  fn breadcrumb_label(&self) -> String {
    format!("Catalog: {}", self.current().title())
  }

  fn tick(&mut self) -> ViewAction {
    self.tags.poll();
    self.buildings.poll();
    self.sectors.poll();
    self.groups.poll();
    if self.watch.poll() {
      self.tags.refetch();
    }
    self.finish_pending()
  }

  fn captures_input(&self) -> bool {
    self.new_tag.is_some() || self.confirm_delete.is_some()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let admin = self.ctx.can(Capability::ManageTags);
    let on_tags = self.current() == Tab::Tags;
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("h/l", "tab").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(30),
      ShortcutInfo::new("n", "new tag")
        .with_priority(40)
        .allowed(admin && on_tags),
      ShortcutInfo::new("d", "delete tag")
        .with_priority(50)
        .allowed(admin && on_tags),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
