//! Owned handle over one embedded road graph database.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::{config::GraphConfig, errors::RoadGraphError, schema::ensure_schema};

use super::transaction::GraphTransaction;

/// File created inside the database directory passed to [`RoadGraph::open`].
pub const DATABASE_FILE_NAME: &str = "graph.db";

/// Embedded road graph database.
///
/// The handle owns a single SQLite connection. Transactions borrow that
/// connection exclusively, so at most one transaction is open per handle;
/// concurrent readers open their own handle on the same directory.
/// After [`close`](RoadGraph::close) every operation fails with
/// [`RoadGraphError::StoreClosed`].
pub struct RoadGraph {
    conn: Mutex<Option<Connection>>,
    closed: AtomicBool,
    config: GraphConfig,
    location: String,
}

// Helper function to check if connection is in-memory
fn is_in_memory_connection(conn: &Connection) -> bool {
    match conn.pragma_query_value(None, "database_list", |row| {
        let name: String = row.get(2)?;
        Ok(name)
    }) {
        Ok(file) => file.is_empty() || file == ":memory:",
        Err(_) => true,
    }
}

impl RoadGraph {
    /// Opens or creates the database stored in directory `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RoadGraphError> {
        Self::open_with_config(path, &GraphConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: &GraphConfig,
    ) -> Result<Self, RoadGraphError> {
        let dir = path.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| RoadGraphError::unavailable(format!("{}: {e}", dir.display())))?;
        let file = dir.join(DATABASE_FILE_NAME);
        let conn = Connection::open(&file)
            .map_err(|e| RoadGraphError::unavailable(format!("{}: {e}", file.display())))?;
        Self::from_connection(conn, config, file.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self, RoadGraphError> {
        Self::open_in_memory_with_config(&GraphConfig::default())
    }

    pub fn open_in_memory_with_config(config: &GraphConfig) -> Result<Self, RoadGraphError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RoadGraphError::unavailable(e.to_string()))?;
        Self::from_connection(conn, config, ":memory:".to_string())
    }

    fn from_connection(
        conn: Connection,
        config: &GraphConfig,
        location: String,
    ) -> Result<Self, RoadGraphError> {
        conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
        conn.busy_timeout(config.busy_timeout)
            .map_err(|e| RoadGraphError::unavailable(e.to_string()))?;

        if !is_in_memory_connection(&conn) {
            let mode = conn.pragma_update_and_check(
                None,
                "journal_mode",
                config.journal_mode.as_str(),
                |row| row.get::<_, String>(0),
            );
            match mode {
                Ok(mode) => debug!(%location, %mode, "roadgraph.store.journal_mode"),
                Err(err) => {
                    // Network filesystems reject WAL
                    warn!(%location, error = %err, "roadgraph.store.journal_mode_fallback");
                    if let Err(err) = conn.pragma_update(None, "journal_mode", "DELETE") {
                        warn!(%location, error = %err, "roadgraph.store.journal_mode_delete_failed");
                    }
                }
            }
            if let Err(err) = conn.pragma_update(None, "synchronous", "NORMAL") {
                warn!(%location, error = %err, "roadgraph.store.synchronous_failed");
            }
        }
        if let Some(cache_size) = config.cache_size {
            conn.pragma_update(None, "cache_size", cache_size)
                .map_err(|e| RoadGraphError::unavailable(e.to_string()))?;
        }
        for (key, value) in &config.pragma_settings {
            conn.pragma_update(None, key, value)
                .map_err(|e| RoadGraphError::unavailable(format!("PRAGMA {key}: {e}")))?;
        }

        ensure_schema(&conn)?;
        info!(%location, "roadgraph.store.opened");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
            config: config.clone(),
            location,
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Path of the SQLite file, or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Starts a transaction on this handle.
    ///
    /// Waits up to [`GraphConfig::busy_timeout`] for a transaction already
    /// open on this handle to finish.
    pub fn begin_transaction(&self) -> Result<GraphTransaction<'_>, RoadGraphError> {
        let guard = self
            .conn
            .try_lock_for(self.config.busy_timeout)
            .ok_or_else(|| {
                RoadGraphError::store("timed out waiting for the open transaction on this handle")
            })?;
        if guard.is_none() {
            return Err(RoadGraphError::StoreClosed);
        }
        GraphTransaction::begin(guard)
    }

    /// Releases the connection. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), RoadGraphError> {
        let mut guard = self
            .conn
            .try_lock_for(self.config.busy_timeout)
            .ok_or_else(|| RoadGraphError::store("cannot close while a transaction is open"))?;
        if let Some(conn) = guard.take() {
            if let Err((conn, err)) = conn.close() {
                *guard = Some(conn);
                return Err(RoadGraphError::sqlite(err));
            }
            self.closed.store(true, Ordering::Release);
            info!(location = %self.location, "roadgraph.store.closed");
        }
        Ok(())
    }

    /// Never waits on an open transaction.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Counts all edges in a dedicated read transaction.
    pub fn count_edges(&self) -> Result<u64, RoadGraphError> {
        let tx = self.begin_transaction()?;
        let count = tx.count_edges()?;
        tx.close()?;
        Ok(count)
    }

    /// Deletes every node together with its edges.
    pub fn truncate_nodes(&self) -> Result<(), RoadGraphError> {
        info!(location = %self.location, "roadgraph.store.truncate_nodes");
        let tx = self.begin_transaction()?;
        tx.execute_batch("DELETE FROM graph_edges; DELETE FROM graph_entities;")?;
        tx.commit()
    }

    /// Deletes every edge, leaving nodes in place.
    pub fn truncate_relationships(&self) -> Result<(), RoadGraphError> {
        info!(location = %self.location, "roadgraph.store.truncate_relationships");
        let tx = self.begin_transaction()?;
        tx.execute_batch("DELETE FROM graph_edges;")?;
        tx.commit()
    }
}
