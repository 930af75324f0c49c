//! Filter and pagination state for the order list.
//!
//! The snapshot handed to the cache is always the *debounced* one: raw
//! keystrokes live in `pending_search` until the debounce window elapses.

use serde::Serialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::api::api_types::{ApiEstado, ApiPrioridad};
use crate::api::types::{OrderStatus, Priority, TagId, UserId};

/// Immutable set of list predicates; part of every list cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FilterSnapshot {
  pub status: Option<OrderStatus>,
  pub priority: Option<Priority>,
  pub client: Option<UserId>,
  pub assigned_to: Option<UserId>,
  pub tags: BTreeSet<TagId>,
  pub search: String,
}

impl FilterSnapshot {
  pub fn is_empty(&self) -> bool {
    *self == FilterSnapshot::default()
  }

  /// REST query parameters for this snapshot (page not included).
  pub fn to_query(&self) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(status) = self.status {
      params.push(("estado", ApiEstado::from(status).as_param().to_string()));
    }
    if let Some(priority) = self.priority {
      params.push((
        "prioridad",
        ApiPrioridad::from(priority).as_param().to_string(),
      ));
    }
    if let Some(agent) = self.assigned_to {
      params.push(("agente", agent.to_string()));
    }
    if let Some(client) = self.client {
      params.push(("cliente", client.to_string()));
    }
    if !self.tags.is_empty() {
      let tags: Vec<String> = self.tags.iter().map(|t| t.to_string()).collect();
      params.push(("tags", tags.join(",")));
    }
    if !self.search.is_empty() {
      params.push(("search", self.search.clone()));
    }
    params
  }

  /// Short human-readable summary for the filter line.
  pub fn describe(&self) -> String {
    let mut parts = Vec::new();
    if let Some(status) = self.status {
      parts.push(format!("status={}", status));
    }
    if let Some(priority) = self.priority {
      parts.push(format!("priority={}", priority));
    }
    if let Some(agent) = self.assigned_to {
      parts.push(format!("agent=#{}", agent));
    }
    if let Some(client) = self.client {
      parts.push(format!("client=#{}", client));
    }
    if !self.tags.is_empty() {
      let tags: Vec<String> = self.tags.iter().map(|t| format!("#{}", t)).collect();
      parts.push(format!("tags={}", tags.join(",")));
    }
    if !self.search.is_empty() {
      parts.push(format!("\"{}\"", self.search));
    }
    if parts.is_empty() {
      "no filters".to_string()
    } else {
      parts.join("  ")
    }
  }
}

/// Partial update for [`FilterState::set_filters`].
///
/// Outer `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct FilterPatch {
  pub status: Option<Option<OrderStatus>>,
  pub priority: Option<Option<Priority>>,
  pub client: Option<Option<UserId>>,
  pub assigned_to: Option<Option<UserId>>,
  pub tags: Option<BTreeSet<TagId>>,
  pub search: Option<String>,
}

impl FilterPatch {
  pub fn status(status: Option<OrderStatus>) -> Self {
    Self {
      status: Some(status),
      ..Default::default()
    }
  }

  pub fn priority(priority: Option<Priority>) -> Self {
    Self {
      priority: Some(priority),
      ..Default::default()
    }
  }

  pub fn assigned_to(agent: Option<UserId>) -> Self {
    Self {
      assigned_to: Some(agent),
      ..Default::default()
    }
  }

  pub fn tags(tags: BTreeSet<TagId>) -> Self {
    Self {
      tags: Some(tags),
      ..Default::default()
    }
  }
}

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct PendingSearch {
  value: String,
  last_keystroke: Instant,
}

/// Current page plus the applied filter snapshot.
#[derive(Debug, Clone)]
pub struct FilterState {
  page: u32,
  applied: FilterSnapshot,
  pending_search: Option<PendingSearch>,
  debounce: Duration,
}

impl Default for FilterState {
  fn default() -> Self {
    Self::new(DEFAULT_DEBOUNCE)
  }
}

impl FilterState {
  pub fn new(debounce: Duration) -> Self {
    Self {
      page: 1,
      applied: FilterSnapshot::default(),
      pending_search: None,
      debounce,
    }
  }

  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn snapshot(&self) -> &FilterSnapshot {
    &self.applied
  }

  /// Raw search text while typing (falls back to the applied term)
  pub fn search_input(&self) -> &str {
    self
      .pending_search
      .as_ref()
      .map(|p| p.value.as_str())
      .unwrap_or(&self.applied.search)
  }

  pub fn has_pending_search(&self) -> bool {
    self.pending_search.is_some()
  }

  /// Apply a partial filter update.
  ///
  /// Returns true when the snapshot changed, in which case the page is back to 1.
  pub fn set_filters(&mut self, patch: FilterPatch) -> bool {
    let mut next = self.applied.clone();
    if let Some(status) = patch.status {
      next.status = status;
    }
    if let Some(priority) = patch.priority {
      next.priority = priority;
    }
    if let Some(client) = patch.client {
      next.client = client;
    }
    if let Some(agent) = patch.assigned_to {
      next.assigned_to = agent;
    }
    if let Some(tags) = patch.tags {
      next.tags = tags;
    }
    if let Some(search) = patch.search {
      next.search = search.trim().to_string();
      self.pending_search = None;
    }
    self.replace(next)
  }

  /// Record a keystroke-level search value. The snapshot is untouched until
  /// [`poll_debounce`](Self::poll_debounce) sees a quiet period.
  pub fn type_search(&mut self, raw: &str, now: Instant) {
    self.pending_search = Some(PendingSearch {
      value: raw.to_string(),
      last_keystroke: now,
    });
  }

  /// When the next debounce check is due, if a search is pending.
  pub fn debounce_deadline(&self) -> Option<Instant> {
    self
      .pending_search
      .as_ref()
      .map(|p| p.last_keystroke + self.debounce)
  }

  /// Fold a settled search term into the snapshot.
  ///
  /// Returns true when the snapshot changed.
  pub fn poll_debounce(&mut self, now: Instant) -> bool {
    let settled = match &self.pending_search {
      Some(p) if now.duration_since(p.last_keystroke) >= self.debounce => p.value.trim().to_string(),
      _ => return false,
    };
    self.pending_search = None;
    let next = FilterSnapshot {
      search: settled,
      ..self.applied.clone()
    };
    self.replace(next)
  }

  /// Drop every filter and go back to page 1.
  pub fn clear(&mut self) -> bool {
    self.pending_search = None;
    let changed = !self.applied.is_empty() || self.page != 1;
    self.applied = FilterSnapshot::default();
    self.page = 1;
    changed
  }

  pub fn set_page(&mut self, page: u32) -> bool {
    let page = page.max(1);
    let changed = page != self.page;
    self.page = page;
    changed
  }

  pub fn next_page(&mut self, has_next: bool) -> bool {
    if has_next {
      self.set_page(self.page + 1)
    } else {
      false
    }
  }

  pub fn prev_page(&mut self) -> bool {
    self.set_page(self.page.saturating_sub(1))
  }

  fn replace(&mut self, next: FilterSnapshot) -> bool {
    if next == self.applied {
      return false;
    }
    self.applied = next;
    self.page = 1;
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_changing_a_filter_resets_page() {
    let mut state = FilterState::default();
    state.set_page(4);

    assert!(state.set_filters(FilterPatch::status(Some(OrderStatus::Open))));
    assert_eq!(state.page(), 1);
    assert_eq!(state.snapshot().status, Some(OrderStatus::Open));
  }

  #[test]
  fn test_same_value_keeps_page() {
    let mut state = FilterState::default();
    state.set_filters(FilterPatch::priority(Some(Priority::High)));
    state.set_page(3);

    assert!(!state.set_filters(FilterPatch::priority(Some(Priority::High))));
    assert_eq!(state.page(), 3);
  }

  #[test]
  fn test_clear_restores_initial_snapshot() {
    let mut state = FilterState::default();
    state.set_filters(FilterPatch {
      status: Some(Some(OrderStatus::Resolved)),
      tags: Some(BTreeSet::from([1, 2])),
      search: Some("vpn".to_string()),
      ..Default::default()
    });
    state.set_page(2);

    assert!(state.clear());
    assert!(state.snapshot().is_empty());
    assert_eq!(state.page(), 1);
    assert!(!state.clear());
  }

  #[test]
  fn test_keystrokes_fold_once_after_debounce() {
    let start = Instant::now();
    let debounce = Duration::from_millis(500);
    let mut state = FilterState::new(debounce);
    state.set_page(2);

    let mut changes = 0;
    for (i, typed) in ["l", "lo", "log", "logi", "login"].iter().enumerate() {
      let at = start + Duration::from_millis(100 * i as u64);
      state.type_search(typed, at);
      if state.poll_debounce(at) {
        changes += 1;
      }
    }
    // Raw value visible, snapshot still empty
    assert_eq!(state.search_input(), "login");
    assert_eq!(state.snapshot().search, "");
    assert_eq!(state.page(), 2);

    let last = start + Duration::from_millis(400);
    assert!(!state.poll_debounce(last + Duration::from_millis(499)));
    if state.poll_debounce(last + debounce) {
      changes += 1;
    }
    assert!(!state.poll_debounce(last + debounce * 2));

    assert_eq!(changes, 1);
    assert_eq!(state.snapshot().search, "login");
    assert_eq!(state.page(), 1);
  }

  #[test]
  fn test_debounced_value_equal_to_applied_is_not_a_change() {
    let start = Instant::now();
    let mut state = FilterState::new(Duration::from_millis(100));
    state.set_filters(FilterPatch {
      search: Some("vpn".to_string()),
      ..Default::default()
    });
    state.set_page(3);

    state.type_search("vpn ", start);
    assert!(!state.poll_debounce(start + Duration::from_millis(100)));
    assert_eq!(state.page(), 3);
    assert!(!state.has_pending_search());
  }

  #[test]
  fn test_paging_bounds() {
    let mut state = FilterState::default();
    assert!(!state.prev_page());
    assert_eq!(state.page(), 1);
    assert!(!state.next_page(false));
    assert!(state.next_page(true));
    assert_eq!(state.page(), 2);
    assert!(state.prev_page());
    assert_eq!(state.page(), 1);
  }

  #[test]
  fn test_query_params() {
    let snapshot = FilterSnapshot {
      status: Some(OrderStatus::Open),
      priority: Some(Priority::Critical),
      client: Some(7),
      assigned_to: Some(2),
      tags: BTreeSet::from([5, 3]),
      search: "login".to_string(),
    };
    assert_eq!(
      snapshot.to_query(),
      vec![
        ("estado", "abierta".to_string()),
        ("prioridad", "critica".to_string()),
        ("agente", "2".to_string()),
        ("cliente", "7".to_string()),
        ("tags", "3,5".to_string()),
        ("search", "login".to_string()),
      ]
    );
    assert!(FilterSnapshot::default().to_query().is_empty());
  }
}
