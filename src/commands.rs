//! Command palette entries and autocomplete ranking.

/// Where a palette command takes the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  Orders,
  Dashboard,
  Users,
  Catalog,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub route: Route,
}

pub const COMMANDS: &[Command] = &[
  Command {
    name: "orders",
    aliases: &["o", "order", "ordenes"],
    description: "Browse work orders",
    route: Route::Orders,
  },
  Command {
    name: "dashboard",
    aliases: &["d", "dash", "stats"],
    description: "Workload analytics",
    route: Route::Dashboard,
  },
  Command {
    name: "users",
    aliases: &["u", "user"],
    description: "Directory of users",
    route: Route::Users,
  },
  Command {
    name: "catalog",
    aliases: &["c", "tags"],
    description: "Tags, buildings, sectors and groups",
    route: Route::Catalog,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit deskboard",
    route: Route::Quit,
  },
];

/// Lower is better; `None` when the command does not match at all.
fn rank(cmd: &Command, input: &str) -> Option<u8> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Suggestions for the palette, best match first.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u8)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input).map(|r| (cmd, r)))
    .collect();
  matches.sort_by_key(|(_, r)| *r);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Route for submitted palette text: the best suggestion, if any.
pub fn resolve(input: &str) -> Option<Route> {
  if input.trim().is_empty() {
    return None;
  }
  get_suggestions(input).first().map(|cmd| cmd.route)
}
