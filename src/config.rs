//! Runtime options for opening a road graph.
//!
//! Every field has a default suited to a single embedded database directory;
//! callers normally start from [`GraphConfig::default`] and override the few
//! settings they care about.

use std::collections::HashMap;
use std::time::Duration;

/// Options applied when a [`RoadGraph`](crate::RoadGraph) is opened.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use roadgraph::GraphConfig;
///
/// let mut cfg = GraphConfig::default();
/// cfg.busy_timeout = Duration::from_secs(1);
/// cfg.bootstrap_index_entities = false;
/// assert_eq!(cfg.journal_mode, "WAL");
/// ```
#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// How long to wait on a locked database, and on a transaction already
    /// open on the same handle, before giving up.
    ///
    /// **Default:** 5 seconds
    pub busy_timeout: Duration,

    /// Journal mode for file databases. Falls back to `DELETE` when the
    /// filesystem rejects the requested mode. Ignored for in-memory graphs.
    ///
    /// **Default:** `"WAL"`
    pub journal_mode: String,

    /// SQLite page cache size, passed verbatim to `PRAGMA cache_size`
    /// (negative values are KiB).
    ///
    /// **Default:** `Some(-64000)` (64MB)
    pub cache_size: Option<i64>,

    /// Capacity of the prepared statement cache.
    ///
    /// **Default:** 128
    pub statement_cache_capacity: usize,

    /// Extra `PRAGMA name = value` settings applied after the built-in ones.
    ///
    /// **Default:** empty
    pub pragma_settings: HashMap<String, String>,

    /// Create throwaway entities before declaring indexes and delete them
    /// afterwards. SQLite can index empty tables, so this only exercises the
    /// bootstrap phases; turning it off skips them.
    ///
    /// **Default:** `true`
    pub bootstrap_index_entities: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            journal_mode: "WAL".to_string(),
            cache_size: Some(-64000),
            statement_cache_capacity: 128,
            pragma_settings: HashMap::new(),
            bootstrap_index_entities: true,
        }
    }
}

impl GraphConfig {
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_pragma<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.pragma_settings.insert(key.into(), value.into());
        self
    }

    pub fn without_index_bootstrap(mut self) -> Self {
        self.bootstrap_index_entities = false;
        self
    }
}
