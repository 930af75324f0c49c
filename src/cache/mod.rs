//! Generic query cache.
//!
//! This module is helpdesk-agnostic:
//! - Keyed, staleness-aware reads with stale-while-revalidate
//! - Concurrent reads of one key share a single fetch
//! - Fixed-count, fixed-delay retries for failed reads
//! - Pattern invalidation with notifications for mounted consumers
//! - Last good result persisted for offline mode

mod layer;
mod storage;
mod traits;
mod watch;

pub use layer::{CacheLayer, CachePolicy};
pub use storage::{CacheStorage, NoopStorage, SnapshotRecord, SqliteStorage, StoredSnapshot};
pub use traits::{CacheEvent, CacheResult, CacheSource, Cacheable, KeyPattern, QueryKey};
pub use watch::CacheWatch;
