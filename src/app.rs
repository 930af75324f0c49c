use crate::api::client::HttpApi;
use crate::api::service::DeskService;
use crate::auth::Session;
use crate::cache::CacheSource;
use crate::commands::Route;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::mutation::MutationCoordinator;
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::context::DeskContext;
use crate::ui::renderfns::{draw_footer, draw_header, HeaderContext, Notice};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{CatalogView, DashboardView, OrderListView, UserListView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TICK_RATE: Duration = Duration::from_millis(100);
const NOTICE_TTL: Duration = Duration::from_secs(5);

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` palette, drawn over whatever view is active
  command_input: CommandInput,

  /// Last notice and when it was raised
  notice: Option<(Notice, Instant)>,

  ctx: DeskContext,
  title: String,
  api_url: String,

  /// Session came from a persisted snapshot because the backend was unreachable
  offline: bool,

  should_quit: bool,
}

impl App {
  pub async fn new(
    config: &Config,
    service: DeskService<HttpApi>,
    mutations: MutationCoordinator<HttpApi>,
  ) -> Result<Self> {
    // Without a user the app still browses; capability-gated actions stay off
    let (session, offline) = match service.current_user().await {
      Ok(result) => {
        info!(user = %result.data.username, "signed in");
        (
          Some(Arc::new(Session::new((*result.data).clone()))),
          result.source == CacheSource::Offline,
        )
      }
      Err(e) => {
        warn!(error = %e, "could not load current user");
        (None, false)
      }
    };

    let ws_base = match config.api.ws_base_url() {
      Ok(url) => Some(url),
      Err(e) => {
        warn!(error = %e, "live updates disabled");
        None
      }
    };

    let ctx = DeskContext {
      service,
      mutations,
      session,
      ws_base,
      export_dir: config.export.dir(),
      debounce: config.search.debounce(),
    };

    Ok(Self {
      view_stack: vec![Box::new(OrderListView::new(ctx.clone()))],
      command_input: CommandInput::new(),
      notice: None,
      ctx,
      title: config.display_title(),
      api_url: config.api.url.clone(),
      offline,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(TICK_RATE);
    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        Some(Event::Resize) => {}
        None => break,
      }
    }
    Ok(())
  }

  fn tick(&mut self) {
    if self
      .notice
      .as_ref()
      .is_some_and(|(_, at)| at.elapsed() >= NOTICE_TTL)
    {
      self.notice = None;
    }
    let action = match self.view_stack.last_mut() {
      Some(view) => view.tick(),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    // Typing into a view (search box, compose, form) keeps ':' as text
    let captured = self
      .view_stack
      .last()
      .is_some_and(|view| view.captures_input());
    if !captured || self.command_input.is_active() {
      match self.command_input.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(route)) => {
          self.navigate(route);
          return;
        }
        KeyResult::Event(CommandEvent::Unknown(input)) => {
          self.notify(Notice::Error(format!("Unknown command: {}", input)));
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::Notify(notice) => self.notify(notice),
    }
  }

  fn notify(&mut self, notice: Notice) {
    if let Notice::Error(msg) = &notice {
      warn!(message = %msg, "notice");
    }
    self.notice = Some((notice, Instant::now()));
  }

  /// Jump to a top-level screen. The order list stays at the root so
  /// its filters survive a trip to another screen.
  fn navigate(&mut self, route: Route) {
    self.view_stack.truncate(1);
    let view: Box<dyn View> = match route {
      Route::Orders => return,
      Route::Dashboard => Box::new(DashboardView::new(self.ctx.clone())),
      Route::Users => Box::new(UserListView::new(self.ctx.clone())),
      Route::Catalog => Box::new(CatalogView::new(self.ctx.clone())),
      Route::Quit => {
        self.should_quit = true;
        return;
      }
    };
    self.view_stack.push(view);
  }

  fn draw(&mut self, frame: &mut Frame) {
    let [header, content, footer] = ui::screen_layout(frame.area());

    let user = self.ctx.session.as_ref().map(|s| s.user().display_name());
    let header_ctx = HeaderContext {
      title: &self.title,
      api_url: &self.api_url,
      user: user.as_deref(),
      is_admin: self.ctx.session.as_ref().is_some_and(|s| s.is_admin()),
      offline: self.offline,
    };
    let shortcuts = self
      .view_stack
      .last()
      .map(|view| view.shortcuts())
      .unwrap_or_default();
    draw_header(frame, header, &header_ctx, &shortcuts);

    if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, content);
    }

    let breadcrumb: Vec<String> = self
      .view_stack
      .iter()
      .map(|view| view.breadcrumb_label())
      .collect();
    draw_footer(
      frame,
      footer,
      &breadcrumb,
      self.notice.as_ref().map(|(notice, _)| notice),
    );

    self.command_input.render_overlay(frame, content);
  }
}
