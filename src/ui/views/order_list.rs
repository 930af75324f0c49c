use std::collections::BTreeSet;
use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::api::cache::DeskQueryKey;
use crate::api::types::{Order, OrderStatus, Page, Priority, Tag, TagId};
use crate::cache::CacheWatch;
use crate::filter::{FilterPatch, FilterState};
use crate::query::{CachedQuery, Query, QueryState};
use crate::ui::components::{KeyResult, Picker, PickerEvent, PickerItem, SearchEvent, SearchInput};
use crate::ui::context::DeskContext;
use crate::ui::renderfns::{
  ensure_valid_selection, local_time, priority_color, source_badge, status_color, truncate, Notice,
};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{NewOrderView, OrderDetailView};

/// Paged, filterable order list. The root view.
pub struct OrderListView {
  ctx: DeskContext,
  filters: FilterState,
  query: CachedQuery<Page<Order>>,
  watch: CacheWatch,
  tags: CachedQuery<Vec<Tag>>,
  list_state: ListState,
  search: SearchInput,
  status_picker: Picker<Option<OrderStatus>>,
  priority_picker: Picker<Option<Priority>>,
  tag_picker: Picker<Option<TagId>>,
}

fn orders_query(ctx: &DeskContext, filters: &FilterState) -> CachedQuery<Page<Order>> {
  let service = ctx.service.clone();
  let page = filters.page();
  let snapshot = filters.snapshot().clone();
  let mut query = Query::new(move || {
    let service = service.clone();
    let snapshot = snapshot.clone();
    async move { service.orders(page, &snapshot).await }
  });
  query.fetch();
  query
}

fn list_key(filters: &FilterState) -> DeskQueryKey {
  DeskQueryKey::Orders {
    page: filters.page(),
    filters: filters.snapshot().clone(),
  }
}

impl OrderListView {
  pub fn new(ctx: DeskContext) -> Self {
    let filters = FilterState::new(ctx.debounce);
    let query = orders_query(&ctx, &filters);
    let watch = CacheWatch::new(ctx.service.cache(), &list_key(&filters));

    let service = ctx.service.clone();
    let mut tags = Query::new(move || {
      let service = service.clone();
      async move { service.tags().await }
    });
    tags.fetch();

    Self {
      ctx,
      filters,
      query,
      watch,
      tags,
      list_state: ListState::default(),
      search: SearchInput::new(),
      status_picker: Picker::new(),
      priority_picker: Picker::new(),
      tag_picker: Picker::new(),
    }
  }

  /// Point the query and the cache watch at the current page and filters.
  fn reload(&mut self) {
    self.query = orders_query(&self.ctx, &self.filters);
    self.watch.track(&list_key(&self.filters));
    self.list_state.select(Some(0));
  }

  fn page(&self) -> Option<&Page<Order>> {
    self.query.data().map(|r| r.data.as_ref())
  }

  fn orders(&self) -> &[Order] {
    self.page().map(|p| p.items.as_slice()).unwrap_or(&[])
  }

  fn selected_order(&self) -> Option<&Order> {
    self.list_state.selected().and_then(|i| self.orders().get(i))
  }

  fn apply(&mut self, patch: FilterPatch) {
    if self.filters.set_filters(patch) {
      self.reload();
    }
  }

  fn open_status_picker(&mut self) {
    let current = self.filters.snapshot().status;
    let mut items = vec![PickerItem::new("Any status", None).marked(current.is_none())];
    items.extend(
      OrderStatus::ALL
        .iter()
        .map(|s| PickerItem::new(s.label(), Some(*s)).marked(current == Some(*s))),
    );
    self.status_picker.show("Status", items);
  }

  fn open_priority_picker(&mut self) {
    let current = self.filters.snapshot().priority;
    let mut items = vec![PickerItem::new("Any priority", None).marked(current.is_none())];
    items.extend(
      Priority::ALL
        .iter()
        .map(|p| PickerItem::new(p.label(), Some(*p)).marked(current == Some(*p))),
    );
    self.priority_picker.show("Priority", items);
  }

  fn open_tag_picker(&mut self) {
    let chosen = &self.filters.snapshot().tags;
    let mut items = vec![PickerItem::new("Any tag", None).marked(chosen.is_empty())];
    if let Some(tags) = self.tags.data() {
      items.extend(
        tags
          .data
          .iter()
          .map(|t| PickerItem::new(t.name.clone(), Some(t.id)).marked(chosen.contains(&t.id))),
      );
    }
    self.tag_picker.show("Tags (toggle)", items);
  }

  /// Route a key to whichever overlay is open.
  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match self.search.handle_key(key, self.filters.search_input()) {
      KeyResult::Event(SearchEvent::Changed(raw)) => {
        self.filters.type_search(&raw, Instant::now());
        return Some(ViewAction::None);
      }
      KeyResult::Event(SearchEvent::Submitted(term)) => {
        self.apply(FilterPatch {
          search: Some(term),
          ..Default::default()
        });
        return Some(ViewAction::None);
      }
      KeyResult::Event(SearchEvent::Cancelled) => {
        self.apply(FilterPatch {
          search: Some(String::new()),
          ..Default::default()
        });
        return Some(ViewAction::None);
      }
      KeyResult::Handled => return Some(ViewAction::None),
      KeyResult::NotHandled => {}
    }

    match self.status_picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(status)) => {
        self.apply(FilterPatch::status(status));
        return Some(ViewAction::None);
      }
      KeyResult::Event(PickerEvent::Cancelled) | KeyResult::Handled => {
        return Some(ViewAction::None)
      }
      KeyResult::NotHandled => {}
    }

    match self.priority_picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(priority)) => {
        self.apply(FilterPatch::priority(priority));
        return Some(ViewAction::None);
      }
      KeyResult::Event(PickerEvent::Cancelled) | KeyResult::Handled => {
        return Some(ViewAction::None)
      }
      KeyResult::NotHandled => {}
    }

    match self.tag_picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(tag)) => {
        let tags = match tag {
          None => BTreeSet::new(),
          Some(id) => {
            let mut tags = self.filters.snapshot().tags.clone();
            if !tags.remove(&id) {
              tags.insert(id);
            }
            tags
          }
        };
        self.apply(FilterPatch::tags(tags));
        Some(ViewAction::None)
      }
      KeyResult::Event(PickerEvent::Cancelled) | KeyResult::Handled => Some(ViewAction::None),
      KeyResult::NotHandled => None,
    }
  }

  fn render_filter_line(&self, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
      Span::styled(" Filters: ", Style::default().fg(Color::DarkGray)),
      Span::styled(
        self.filters.snapshot().describe(),
        Style::default().fg(Color::Yellow),
      ),
    ];
    if self.filters.has_pending_search() {
      spans.push(Span::styled(
        format!("  typing \"{}\"...", self.filters.search_input()),
        Style::default().fg(Color::DarkGray).italic(),
      ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.orders().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = match (self.query.state(), self.page()) {
      (QueryState::Error(e), _) => format!(" Orders (error: {}) ", e),
      (_, Some(page)) => {
        let badge = self.query.data().map(source_badge).unwrap_or_default();
        let prev = if page.has_prev() { "< " } else { "" };
        let next = if page.has_next { " >" } else { "" };
        format!(
          " Orders ({} total) {}page {}{}{} ",
          page.total, prev, page.page, next, badge
        )
      }
      _ => " Orders (loading...) ".to_string(),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = if self.query.is_error() {
        "Failed to load orders. Press 'r' to retry."
      } else if self.query.is_loading() {
        "Loading..."
      } else if !self.filters.snapshot().is_empty() {
        "No orders match these filters. Press 'c' to clear them."
      } else {
        "No orders yet. Press 'n' to open one."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let me = self.ctx.user_id();
    let items: Vec<ListItem> = self
      .orders()
      .iter()
      .map(|order| {
        let mine = me.is_some_and(|id| order.is_assigned_to(id));
        ListItem::new(Line::from(vec![
          Span::styled(format!("#{:<6}", order.id), Style::default().fg(Color::Cyan)),
          Span::styled(
            format!("{:<10}", order.status.label()),
            Style::default().fg(status_color(order.status)),
          ),
          Span::styled(
            format!("{:<9}", order.priority.label()),
            Style::default().fg(priority_color(order.priority)),
          ),
          Span::styled(if mine { "* " } else { "  " }, Style::default().fg(Color::Green)),
          Span::raw(format!("{:<50}", truncate(&order.title, 48))),
          Span::styled(
            format!("{:<24}", truncate(&order.agent_names(), 22)),
            Style::default().fg(Color::White),
          ),
          Span::styled(local_time(order.updated), Style::default().fg(Color::DarkGray)),
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
  }
}

impl View for OrderListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(action) = self.handle_overlays(key) {
      return action;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.list_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.list_state.select_last(),
      KeyCode::Char(']') => {
        let has_next = self.page().is_some_and(|p| p.has_next);
        if self.filters.next_page(has_next) {
          self.reload();
        }
      }
      KeyCode::Char('[') => {
        if self.filters.prev_page() {
          self.reload();
        }
      }
      KeyCode::Char('s') => self.open_status_picker(),
      KeyCode::Char('p') => self.open_priority_picker(),
      KeyCode::Char('t') => {
        if self.tags.data().is_none() {
          self.tags.fetch();
        }
        self.open_tag_picker();
      }
      KeyCode::Char('m') => match self.ctx.user_id() {
        Some(me) => {
          let mine = self.filters.snapshot().assigned_to == Some(me);
          self.apply(FilterPatch::assigned_to(if mine { None } else { Some(me) }));
        }
        None => {
          return ViewAction::Notify(Notice::Error("Not signed in".to_string()))
        }
      },
      KeyCode::Char('c') => {
        if self.filters.clear() {
          self.reload();
        }
      }
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('n') => return ViewAction::Push(Box::new(NewOrderView::new(self.ctx.clone()))),
      KeyCode::Enter => {
        if let Some(order) = self.selected_order() {
          return ViewAction::Push(Box::new(OrderDetailView::new(self.ctx.clone(), order.id)));
        }
      }
      KeyCode::Char('q') => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(1), Constraint::Min(1)])
      .split(area);
    self.render_filter_line(frame, chunks[0]);
    self.render_list(frame, chunks[1]);

    self.search.render_overlay(frame, area);
    self.status_picker.render_overlay(frame, area);
    self.priority_picker.render_overlay(frame, area);
    self.tag_picker.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    if self.filters.snapshot().is_empty() {
      "Orders".to_string()
    } else {
      format!("Orders [{}]", self.filters.snapshot().describe())
    }
  }

  fn tick(&mut self) -> ViewAction {
    if self.filters.poll_debounce(Instant::now()) {
      self.reload();
    }
    self.query.poll();
    self.tags.poll();
    if self.watch.poll() {
      self.query.refetch();
    }
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
      || self.status_picker.is_active()
      || self.priority_picker.is_active()
      || self.tag_picker.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("s/p/t", "status/priority/tags").with_priority(30),
      ShortcutInfo::new("m", "mine").with_priority(40),
      ShortcutInfo::new("c", "clear").with_priority(50),
      ShortcutInfo::new("[ ]", "page").with_priority(60),
      ShortcutInfo::new("n", "new").with_priority(70),
      ShortcutInfo::new("r", "refresh").with_priority(80),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
