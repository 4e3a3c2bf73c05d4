use rusqlite::{Connection, OptionalExtension};

use crate::errors::RoadGraphError;

pub const SCHEMA_VERSION: i64 = 1;

pub fn ensure_schema(conn: &Connection) -> Result<(), RoadGraphError> {
    ensure_base_schema(conn)?;
    ensure_meta(conn)
}

fn ensure_base_schema(conn: &Connection) -> Result<(), RoadGraphError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS graph_entities (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL,
            data  TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_edges (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            from_id   INTEGER NOT NULL,
            to_id     INTEGER NOT NULL,
            edge_type TEXT NOT NULL,
            data      TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_index_catalog (
            name        TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            selector    TEXT NOT NULL,
            property    TEXT NOT NULL,
            kind        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_edges_from ON graph_edges(from_id);
        CREATE INDEX IF NOT EXISTS idx_edges_to ON graph_edges(to_id);
        CREATE INDEX IF NOT EXISTS idx_edges_type ON graph_edges(edge_type);
        CREATE INDEX IF NOT EXISTS idx_entities_label ON graph_entities(label);
        CREATE TABLE IF NOT EXISTS graph_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL
        );
        "#,
    )
    .map_err(|e| RoadGraphError::unavailable(e.to_string()))
}

pub fn read_schema_version(conn: &Connection) -> Result<i64, RoadGraphError> {
    conn.query_row(
        "SELECT schema_version FROM graph_meta WHERE id=1",
        [],
        |row| row.get(0),
    )
    .map_err(RoadGraphError::sqlite)
}

fn ensure_meta(conn: &Connection) -> Result<(), RoadGraphError> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT schema_version FROM graph_meta WHERE id=1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| RoadGraphError::unavailable(e.to_string()))?;
    match version {
        Some(existing) if existing > SCHEMA_VERSION => {
            Err(RoadGraphError::unavailable(format!(
                "database schema version {existing} is newer than supported {SCHEMA_VERSION}"
            )))
        }
        Some(_) => Ok(()),
        None => {
            conn.execute(
                "INSERT INTO graph_meta(id, schema_version) VALUES(1, ?1)",
                [SCHEMA_VERSION],
            )
            .map_err(|e| RoadGraphError::unavailable(e.to_string()))?;
            Ok(())
        }
    }
}
