//! Work-order receipt (plain text) and worksheet (CSV) generated from the
//! in-memory order. Nothing is sent to the server.

use chrono::{DateTime, Local, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::types::Order;
use crate::error::DeskResult;

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
  pub receipt: PathBuf,
  pub worksheet: PathBuf,
}

fn local(ts: DateTime<Utc>) -> String {
  ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Printable receipt with the order header, location and signature lines.
pub fn render_receipt(order: &Order, generated: DateTime<Utc>) -> String {
  let rule = "=".repeat(RULE_WIDTH);
  let thin = "-".repeat(RULE_WIDTH);
  let mut out = String::new();

  out.push_str(&format!("{}\n", rule));
  out.push_str(&format!("WORK ORDER #{}\n", order.id));
  out.push_str(&format!("{}\n", rule));
  out.push_str(&format!("Title:     {}\n", order.title));
  out.push_str(&format!("Status:    {}\n", order.status));
  out.push_str(&format!("Priority:  {}\n", order.priority));
  out.push_str(&format!("Client:    {}\n", order.client.display_name()));
  out.push_str(&format!("Agents:    {}\n", order.agent_names()));
  out.push_str(&format!("Location:  {}\n", order.location.describe()));
  if !order.tags.is_empty() {
    let tags: Vec<&str> = order.tags.iter().map(|t| t.name.as_str()).collect();
    out.push_str(&format!("Tags:      {}\n", tags.join(", ")));
  }
  out.push_str(&format!("Opened:    {}\n", local(order.created)));
  out.push_str(&format!("Updated:   {}\n", local(order.updated)));
  out.push_str(&format!("{}\n", thin));
  out.push_str("Detail:\n");
  for line in order.detail.lines() {
    out.push_str(&format!("  {}\n", line));
  }

  if !order.messages.is_empty() {
    out.push_str(&format!("{}\n", thin));
    out.push_str(&format!("Messages ({}):\n", order.messages.len()));
    for m in &order.messages {
      out.push_str(&format!(
        "  [{}] {}: {}\n",
        local(m.created),
        m.author.display_name(),
        m.text
      ));
    }
  }

  out.push_str(&format!("{}\n\n", thin));
  out.push_str("Client signature: ______________________\n\n");
  out.push_str("Agent signature:  ______________________\n\n");
  out.push_str(&format!("Generated {}\n", local(generated)));
  out
}

/// Quote a CSV field when it contains a separator, quote, or newline.
fn csv_field(value: &str) -> String {
  if value.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_string()
  }
}

fn csv_row(fields: &[&str]) -> String {
  let mut row = fields
    .iter()
    .map(|f| csv_field(f))
    .collect::<Vec<_>>()
    .join(",");
  row.push_str("\r\n");
  row
}

/// Spreadsheet-friendly worksheet: field/value pairs, then the message log.
pub fn render_worksheet(order: &Order) -> String {
  let id = order.id.to_string();
  let created = local(order.created);
  let updated = local(order.updated);
  let status = order.status.to_string();
  let priority = order.priority.to_string();
  let client = order.client.display_name();
  let agents = order.agent_names();
  let location = order.location.describe();
  let tags = order
    .tags
    .iter()
    .map(|t| t.name.as_str())
    .collect::<Vec<_>>()
    .join("; ");

  let mut out = String::new();
  out.push_str(&csv_row(&["Field", "Value"]));
  for (field, value) in [
    ("Order", id.as_str()),
    ("Title", order.title.as_str()),
    ("Status", status.as_str()),
    ("Priority", priority.as_str()),
    ("Client", client.as_str()),
    ("Agents", agents.as_str()),
    ("Location", location.as_str()),
    ("Tags", tags.as_str()),
    ("Opened", created.as_str()),
    ("Updated", updated.as_str()),
    ("Detail", order.detail.as_str()),
  ] {
    out.push_str(&csv_row(&[field, value]));
  }

  out.push_str("\r\n");
  out.push_str(&csv_row(&["Date", "Author", "Message"]));
  for m in &order.messages {
    let date = local(m.created);
    let author = m.author.display_name();
    out.push_str(&csv_row(&[&date, &author, &m.text]));
  }
  out
}

/// Write `orden-{id}.txt` and `orden-{id}.csv` into `dir`, creating it.
pub fn export_order(order: &Order, dir: &Path) -> DeskResult<ExportPaths> {
  fs::create_dir_all(dir)?;
  let receipt = dir.join(format!("orden-{}.txt", order.id));
  let worksheet = dir.join(format!("orden-{}.csv", order.id));

  fs::write(&receipt, render_receipt(order, Utc::now()))?;
  fs::write(&worksheet, render_worksheet(order))?;

  info!(order = order.id, dir = %dir.display(), "order exported");
  Ok(ExportPaths { receipt, worksheet })
}
