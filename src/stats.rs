//! Dashboard figures computed from the full order list.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::api::types::{Order, OrderStatus, Priority};

const RECENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardStats {
  pub total: usize,
  pub by_status: BTreeMap<OrderStatus, usize>,
  pub by_priority: BTreeMap<Priority, usize>,
  /// Open orders per agent display name, unassigned under "Unassigned"
  pub open_by_agent: BTreeMap<String, usize>,
  pub open_critical: usize,
  pub created_last_week: usize,
}

impl DashboardStats {
  pub fn compute(orders: &[Order], now: DateTime<Utc>) -> Self {
    let since = now - Duration::days(RECENT_DAYS);
    let mut stats = DashboardStats {
      total: orders.len(),
      ..Default::default()
    };
    for status in OrderStatus::ALL {
      stats.by_status.insert(status, 0);
    }
    for priority in Priority::ALL {
      stats.by_priority.insert(priority, 0);
    }

    for order in orders {
      *stats.by_status.entry(order.status).or_insert(0) += 1;
      *stats.by_priority.entry(order.priority).or_insert(0) += 1;
      if order.created >= since {
        stats.created_last_week += 1;
      }
      if order.status != OrderStatus::Open {
        continue;
      }
      if order.priority == Priority::Critical {
        stats.open_critical += 1;
      }
      if order.agents.is_empty() {
        *stats
          .open_by_agent
          .entry("Unassigned".to_string())
          .or_insert(0) += 1;
      }
      for agent in &order.agents {
        *stats.open_by_agent.entry(agent.display_name()).or_insert(0) += 1;
      }
    }
    stats
  }

  pub fn count(&self, status: OrderStatus) -> usize {
    self.by_status.get(&status).copied().unwrap_or(0)
  }

  /// Agents sorted by open workload, busiest first
  pub fn busiest_agents(&self) -> Vec<(&str, usize)> {
    let mut agents: Vec<(&str, usize)> = self
      .open_by_agent
      .iter()
      .map(|(name, count)| (name.as_str(), *count))
      .collect();
    agents.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    agents
  }
}
