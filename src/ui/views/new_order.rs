use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::api::types::{Location, Order, OrderDraft, Priority, UserId};
use crate::query::{Query, QueryState};
use crate::ui::components::{InputResult, TextInput};
use crate::ui::context::DeskContext;
use crate::ui::renderfns::{priority_color, Notice};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Title,
  Detail,
  Priority,
  Building,
  Floor,
  Office,
  Submit,
}

const FIELDS: [Field; 7] = [
  Field::Title,
  Field::Detail,
  Field::Priority,
  Field::Building,
  Field::Floor,
  Field::Office,
  Field::Submit,
];

impl Field {
  fn label(self) -> &'static str {
    match self {
      Field::Title => "Title",
      Field::Detail => "Detail",
      Field::Priority => "Priority",
      Field::Building => "Building",
      Field::Floor => "Floor",
      Field::Office => "Office",
      Field::Submit => "",
    }
  }
}

/// Form for opening a new order on behalf of the signed-in user.
pub struct NewOrderView {
  ctx: DeskContext,
  title: TextInput,
  detail: TextInput,
  priority: Priority,
  building: TextInput,
  floor: TextInput,
  office: TextInput,
  focus: usize,
  error: Option<String>,
  submit: Option<Query<Order>>,
}

fn optional(input: &TextInput) -> Option<String> {
  let value = input.value().trim();
  (!value.is_empty()).then(|| value.to_string())
}

impl NewOrderView {
  pub fn new(ctx: DeskContext) -> Self {
    Self {
      ctx,
      title: TextInput::new(),
      detail: TextInput::new(),
      priority: Priority::Medium,
      building: TextInput::new(),
      floor: TextInput::new(),
      office: TextInput::new(),
      focus: 0,
      error: None,
      submit: None,
    }
  }

  fn field(&self) -> Field {
    FIELDS[self.focus]
  }

  fn input_mut(&mut self, field: Field) -> Option<&mut TextInput> {
    match field {
      Field::Title => Some(&mut self.title),
      Field::Detail => Some(&mut self.detail),
      Field::Building => Some(&mut self.building),
      Field::Floor => Some(&mut self.floor),
      Field::Office => Some(&mut self.office),
      Field::Priority | Field::Submit => None,
    }
  }

  fn input(&self, field: Field) -> Option<&TextInput> {
    match field {
      Field::Title => Some(&self.title),
      Field::Detail => Some(&self.detail),
      Field::Building => Some(&self.building),
      Field::Floor => Some(&self.floor),
      Field::Office => Some(&self.office),
      Field::Priority | Field::Submit => None,
    }
  }

  fn draft(&self, client: UserId) -> OrderDraft {
    OrderDraft {
      title: self.title.value().trim().to_string(),
      detail: self.detail.value().trim().to_string(),
      priority: self.priority,
      client,
      agents: Vec::new(),
      tags: Vec::new(),
      location: Location {
        building: optional(&self.building),
        floor: optional(&self.floor),
        office: optional(&self.office),
      },
    }
  }

  fn cycle_priority(&mut self, forward: bool) {
    let all = Priority::ALL;
    let idx = all.iter().position(|p| *p == self.priority).unwrap_or(0);
    let next = if forward {
      (idx + 1) % all.len()
    } else {
      (idx + all.len() - 1) % all.len()
    };
    self.priority = all[next];
  }

  fn move_focus(&mut self, forward: bool) {
    self.focus = if forward {
      (self.focus + 1) % FIELDS.len()
    } else {
      (self.focus + FIELDS.len() - 1) % FIELDS.len()
    };
  }

  fn submit(&mut self) {
    let Some(client) = self.ctx.user_id() else {
      self.error = Some("Not signed in".to_string());
      return;
    };
    let draft = self.draft(client);
    // Checked here too so the message shows inline
    if let Err(err) = draft.validate() {
      self.error = Some(err.to_string());
      return;
    }
    self.error = None;
    let mutations = self.ctx.mutations.clone();
    let mut query = Query::new(move || {
      let mutations = mutations.clone();
      let draft = draft.clone();
      async move { mutations.create_order(&draft).await }
    });
    query.fetch();
    self.submit = Some(query);
  }

  fn field_line(&self, field: Field, focused: bool) -> Line<'static> {
    let marker = if focused { "> " } else { "  " };
    let label_style = if focused {
      Style::default().fg(Color::Yellow).bold()
    } else {
      Style::default().fg(Color::DarkGray)
    };
    let mut spans = vec![
      Span::styled(marker, Style::default().fg(Color::Yellow)),
      Span::styled(format!("{:<10}", field.label()), label_style),
    ];
    match field {
      Field::Priority => spans.push(Span::styled(
        format!("< {} >", self.priority.label()),
        Style::default().fg(priority_color(self.priority)),
      )),
      Field::Submit => spans.push(Span::styled(
        "[ Create order ]",
        if focused {
          Style::default().fg(Color::Black).bg(Color::Green)
        } else {
          Style::default().fg(Color::Green)
        },
      )),
      _ => {
        if let Some(input) = self.input(field) {
          let (before, after) = input.split_at_cursor();
          spans.push(Span::raw(before.to_string()));
          if focused {
            spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
          }
          spans.push(Span::raw(after.to_string()));
        }
      }
    }
    Line::from(spans)
  }
}

impl View for NewOrderView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.submit.as_ref().is_some_and(|q| q.is_loading()) {
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Esc => return ViewAction::Pop,
      KeyCode::Tab | KeyCode::Down => self.move_focus(true),
      KeyCode::BackTab | KeyCode::Up => self.move_focus(false),
      KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => self.submit(),
      _ => match self.field() {
        Field::Priority => match key.code {
          KeyCode::Left | KeyCode::Char('h') => self.cycle_priority(false),
          KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => self.cycle_priority(true),
          KeyCode::Enter => self.move_focus(true),
          _ => {}
        },
        Field::Submit => {
          if key.code == KeyCode::Enter {
            self.submit();
          }
        }
        field => {
          if let Some(input) = self.input_mut(field) {
            if let InputResult::Submitted(_) = input.handle_key(key) {
              self.move_focus(true);
            }
          }
        }
      },
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(" New order ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let mut lines: Vec<Line> = FIELDS
      .iter()
      .enumerate()
      .map(|(i, field)| self.field_line(*field, i == self.focus))
      .collect();
    lines.push(Line::raw(""));
    if self.submit.as_ref().is_some_and(|q| q.is_loading()) {
      lines.push(Line::styled("  Creating...", Style::default().fg(Color::DarkGray)));
    }
    if let Some(err) = &self.error {
      lines.push(Line::styled(format!("  {}", err), Style::default().fg(Color::Red)));
    }
    lines.push(Line::styled(
      "  Tab/Shift-Tab move, ←/→ priority, Ctrl-S create, Esc cancel",
      Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(lines).block(block), area);
  }

  fn breadcrumb_label(&self) -> String {
    "New order".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    let Some(query) = self.submit.as_mut() else {
      return ViewAction::None;
    };
    if !query.poll() {
      return ViewAction::None;
    }
    match query.state() {
      QueryState::Success(_) => {
        self.submit = None;
        ViewAction::Pop
      }
      QueryState::Error(err) => {
        self.error = Some(err.to_string());
        self.submit = None;
        ViewAction::Notify(Notice::Error("Order not created".to_string()))
      }
      _ => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("Tab", "next field").with_priority(10),
      ShortcutInfo::new("C-s", "create").with_priority(20),
      ShortcutInfo::new("Esc", "cancel").with_priority(90),
    ]
  }
}
