//! Snapshot storage for offline mode: the last good result of every query.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::KeyPattern;
use crate::error::{DeskError, DeskResult};

/// A persisted query result.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
  /// Serialized JSON value
  pub data: Vec<u8>,
  pub cached_at: DateTime<Utc>,
}

/// What gets written for one query.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotRecord<'a> {
  pub hash: &'a str,
  pub resource: &'a str,
  pub item: Option<&'a str>,
  pub description: &'a str,
  pub data: &'a [u8],
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Get the snapshot for a query hash.
  fn load(&self, hash: &str) -> DeskResult<Option<StoredSnapshot>>;

  /// Insert or replace a snapshot.
  fn store(&self, record: SnapshotRecord<'_>) -> DeskResult<()>;

  /// Drop snapshots matching a pattern, returning how many were removed.
  fn remove(&self, pattern: &KeyPattern) -> DeskResult<usize>;
}

/// Storage implementation that doesn't persist anything.
/// Used when `cache.persist` is off - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn load(&self, _hash: &str) -> DeskResult<Option<StoredSnapshot>> {
    Ok(None) // Always miss
  }

  fn store(&self, _record: SnapshotRecord<'_>) -> DeskResult<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _pattern: &KeyPattern) -> DeskResult<usize> {
    Ok(0)
  }
}

/// SQLite-based snapshot storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the snapshot database at the default location.
  pub fn open() -> DeskResult<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the snapshot database at `path`.
  pub fn open_at(path: &Path) -> DeskResult<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| DeskError::Cache(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      DeskError::Cache(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;
    Self::with_connection(conn)
  }

  /// Throwaway storage, mostly for tests.
  pub fn open_in_memory() -> DeskResult<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> DeskResult<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> DeskResult<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| DeskError::Cache("could not determine data directory".to_string()))?;

    Ok(data_dir.join("deskboard").join("cache.db"))
  }

  fn lock(&self) -> DeskResult<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| DeskError::Cache(format!("lock poisoned: {}", e)))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> DeskResult<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| DeskError::Cache(format!("failed to run cache migrations: {}", e)))?;
    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS query_snapshot (
    query_hash TEXT PRIMARY KEY,
    resource TEXT NOT NULL,
    item TEXT,
    description TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_query_snapshot_resource
    ON query_snapshot(resource, item);
"#;

impl CacheStorage for SqliteStorage {
  fn load(&self, hash: &str) -> DeskResult<Option<StoredSnapshot>> {
    let conn = self.lock()?;
    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM query_snapshot WHERE query_hash = ?",
        params![hash],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match row {
      Some((data, cached_at)) => Ok(Some(StoredSnapshot {
        data,
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  fn store(&self, record: SnapshotRecord<'_>) -> DeskResult<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO query_snapshot (query_hash, resource, item, description, data, cached_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          record.hash,
          record.resource,
          record.item,
          record.description,
          record.data,
          Utc::now().to_rfc3339()
        ],
      )
      .map_err(|e| DeskError::Cache(format!("failed to store snapshot: {}", e)))?;
    Ok(())
  }

  fn remove(&self, pattern: &KeyPattern) -> DeskResult<usize> {
    let conn = self.lock()?;
    let removed = match pattern {
      KeyPattern::Exact(hash) => conn.execute(
        "DELETE FROM query_snapshot WHERE query_hash = ?",
        params![hash],
      ),
      KeyPattern::Lists(resource) => conn.execute(
        "DELETE FROM query_snapshot WHERE resource = ? AND item IS NULL",
        params![resource],
      ),
      KeyPattern::Item(resource, id) => conn.execute(
        "DELETE FROM query_snapshot WHERE resource = ? AND item = ?",
        params![resource, id],
      ),
      KeyPattern::Resource(resource) => conn.execute(
        "DELETE FROM query_snapshot WHERE resource = ?",
        params![resource],
      ),
    }
    .map_err(|e| DeskError::Cache(format!("failed to remove snapshots: {}", e)))?;
    Ok(removed)
  }
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> DeskResult<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| DeskError::Cache(format!("failed to parse datetime '{}': {}", s, e)))
}
