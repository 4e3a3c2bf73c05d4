use parking_lot::MutexGuard;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::warn;

use crate::errors::RoadGraphError;

use super::types::{
    Edge, EdgeKind, EntityRef, Node, NodeKind, Properties, Row, json_to_sql, parse_properties,
    row_to_edge, row_to_node, sql_to_json, validate_property_key,
};

/// Scoped transaction over a [`RoadGraph`](crate::RoadGraph).
///
/// Nothing is durable until [`commit`](GraphTransaction::commit). Dropping
/// or closing an uncommitted transaction rolls it back.
pub struct GraphTransaction<'g> {
    guard: MutexGuard<'g, Option<Connection>>,
    finished: bool,
}

impl<'g> GraphTransaction<'g> {
    pub(crate) fn begin(guard: MutexGuard<'g, Option<Connection>>) -> Result<Self, RoadGraphError> {
        guard
            .as_ref()
            .ok_or(RoadGraphError::StoreClosed)?
            .execute_batch("BEGIN DEFERRED")
            .map_err(RoadGraphError::sqlite)?;
        Ok(Self {
            guard,
            finished: false,
        })
    }

    pub(crate) fn connection(&self) -> Result<&Connection, RoadGraphError> {
        self.guard.as_ref().ok_or(RoadGraphError::StoreClosed)
    }

    pub fn commit(mut self) -> Result<(), RoadGraphError> {
        self.finish("COMMIT")
    }

    pub fn rollback(mut self) -> Result<(), RoadGraphError> {
        self.finish("ROLLBACK")
    }

    /// Ends the transaction without committing.
    pub fn close(self) -> Result<(), RoadGraphError> {
        self.rollback()
    }

    fn finish(&mut self, statement: &str) -> Result<(), RoadGraphError> {
        self.finished = true;
        let conn = self.connection()?;
        let result = conn.execute_batch(statement);
        if result.is_err() && !conn.is_autocommit() {
            // a failed COMMIT leaves the transaction open
            let _ = conn.execute_batch("ROLLBACK");
        }
        result.map_err(RoadGraphError::sqlite)
    }

    /// Runs one SQL statement and returns its rows keyed by column name.
    /// Statements without result columns return an empty vector.
    pub fn execute(&self, sql: &str) -> Result<Vec<Row>, RoadGraphError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql).map_err(RoadGraphError::sqlite)?;
        if stmt.column_count() == 0 {
            stmt.execute([]).map_err(RoadGraphError::sqlite)?;
            return Ok(Vec::new());
        }
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([]).map_err(RoadGraphError::sqlite)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(RoadGraphError::sqlite)? {
            let mut mapped = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = row.get_ref(i).map_err(RoadGraphError::sqlite)?;
                mapped.insert(name.clone(), sql_to_json(value));
            }
            result.push(mapped);
        }
        Ok(result)
    }

    /// Runs several `;`-separated statements, discarding any rows.
    pub fn execute_batch(&self, sql: &str) -> Result<(), RoadGraphError> {
        self.connection()?
            .execute_batch(sql)
            .map_err(RoadGraphError::sqlite)
    }

    pub fn create_node(
        &self,
        kind: NodeKind,
        properties: Properties,
    ) -> Result<Node, RoadGraphError> {
        let conn = self.connection()?;
        let data = serde_json::to_string(&properties)
            .map_err(|e| RoadGraphError::store(e.to_string()))?;
        conn.execute(
            "INSERT INTO graph_entities(label, data) VALUES(?1, ?2)",
            params![kind.as_label(), data],
        )
        .map_err(RoadGraphError::sqlite)?;
        Ok(Node {
            id: conn.last_insert_rowid(),
            kind,
            properties,
        })
    }

    pub fn create_edge(
        &self,
        from_id: i64,
        to_id: i64,
        kind: EdgeKind,
        properties: Properties,
    ) -> Result<Edge, RoadGraphError> {
        if !self.node_exists(from_id)? || !self.node_exists(to_id)? {
            return Err(RoadGraphError::store(
                "edge endpoints must reference existing nodes",
            ));
        }
        let conn = self.connection()?;
        let data = serde_json::to_string(&properties)
            .map_err(|e| RoadGraphError::store(e.to_string()))?;
        conn.execute(
            "INSERT INTO graph_edges(from_id, to_id, edge_type, data) VALUES(?1, ?2, ?3, ?4)",
            params![from_id, to_id, kind.as_type(), data],
        )
        .map_err(RoadGraphError::sqlite)?;
        Ok(Edge {
            id: conn.last_insert_rowid(),
            from_id,
            to_id,
            kind,
            properties,
        })
    }

    pub fn node(&self, id: i64) -> Result<Node, RoadGraphError> {
        self.connection()?
            .query_row(
                "SELECT id, label, data FROM graph_entities WHERE id=?1",
                params![id],
                row_to_node,
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    RoadGraphError::store(format!("node {id} not found"))
                }
                other => RoadGraphError::sqlite(other),
            })
    }

    pub fn edge(&self, id: i64) -> Result<Edge, RoadGraphError> {
        self.connection()?
            .query_row(
                "SELECT id, from_id, to_id, edge_type, data FROM graph_edges WHERE id=?1",
                params![id],
                row_to_edge,
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    RoadGraphError::store(format!("edge {id} not found"))
                }
                other => RoadGraphError::sqlite(other),
            })
    }

    /// Returns the lowest-id node of `kind` whose property `key` equals `value`.
    ///
    /// The label and key are written into the statement text so a lookup
    /// index declared on the same expression is used.
    pub fn find_node(
        &self,
        kind: NodeKind,
        key: &str,
        value: &Value,
    ) -> Result<Option<Node>, RoadGraphError> {
        validate_property_key(key)?;
        let sql = format!(
            "SELECT id, label, data FROM graph_entities \
             WHERE label = '{}' AND json_extract(data, '$.{key}') = ?1 ORDER BY id LIMIT 1",
            kind.as_label()
        );
        self.connection()?
            .query_row(&sql, params![json_to_sql(value)], row_to_node)
            .optional()
            .map_err(RoadGraphError::sqlite)
    }

    /// Returns the lowest-id edge of `kind` whose property `key` equals `value`.
    pub fn find_edge(
        &self,
        kind: EdgeKind,
        key: &str,
        value: &Value,
    ) -> Result<Option<Edge>, RoadGraphError> {
        validate_property_key(key)?;
        let sql = format!(
            "SELECT id, from_id, to_id, edge_type, data FROM graph_edges \
             WHERE edge_type = '{}' AND json_extract(data, '$.{key}') = ?1 ORDER BY id LIMIT 1",
            kind.as_type()
        );
        self.connection()?
            .query_row(&sql, params![json_to_sql(value)], row_to_edge)
            .optional()
            .map_err(RoadGraphError::sqlite)
    }

    pub fn get_property(
        &self,
        entity: impl Into<EntityRef>,
        name: &str,
    ) -> Result<Option<Value>, RoadGraphError> {
        let mut properties = self.load_properties(entity.into())?;
        Ok(properties.remove(name))
    }

    pub fn has_property(
        &self,
        entity: impl Into<EntityRef>,
        name: &str,
    ) -> Result<bool, RoadGraphError> {
        Ok(self.load_properties(entity.into())?.contains_key(name))
    }

    /// Writes one property, replacing any previous value.
    pub fn set_property(
        &self,
        entity: impl Into<EntityRef>,
        name: &str,
        value: Value,
    ) -> Result<(), RoadGraphError> {
        let entity = entity.into();
        let mut properties = self.load_properties(entity)?;
        properties.insert(name.to_string(), value);
        self.store_properties(entity, &properties)
    }

    /// Deletes a node. Fails while any edge still references it.
    pub fn delete_node(&self, id: i64) -> Result<(), RoadGraphError> {
        let conn = self.connection()?;
        let attached: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM graph_edges WHERE from_id=?1 OR to_id=?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(RoadGraphError::sqlite)?;
        if attached > 0 {
            return Err(RoadGraphError::store(format!(
                "node {id} still has {attached} relationships"
            )));
        }
        let affected = conn
            .execute("DELETE FROM graph_entities WHERE id=?1", params![id])
            .map_err(RoadGraphError::sqlite)?;
        if affected == 0 {
            return Err(RoadGraphError::store(format!("node {id} not found")));
        }
        Ok(())
    }

    pub fn delete_edge(&self, id: i64) -> Result<(), RoadGraphError> {
        let affected = self
            .connection()?
            .execute("DELETE FROM graph_edges WHERE id=?1", params![id])
            .map_err(RoadGraphError::sqlite)?;
        if affected == 0 {
            return Err(RoadGraphError::store(format!("edge {id} not found")));
        }
        Ok(())
    }

    pub fn count_edges(&self) -> Result<u64, RoadGraphError> {
        self.count("SELECT COUNT(*) FROM graph_edges")
    }

    pub fn count_nodes(&self) -> Result<u64, RoadGraphError> {
        self.count("SELECT COUNT(*) FROM graph_entities")
    }

    fn count(&self, sql: &str) -> Result<u64, RoadGraphError> {
        let total: i64 = self
            .connection()?
            .query_row(sql, [], |row| row.get(0))
            .map_err(RoadGraphError::sqlite)?;
        Ok(total.max(0) as u64)
    }

    fn node_exists(&self, id: i64) -> Result<bool, RoadGraphError> {
        let exists: Option<i64> = self
            .connection()?
            .query_row(
                "SELECT 1 FROM graph_entities WHERE id=?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(RoadGraphError::sqlite)?;
        Ok(exists.is_some())
    }

    pub(crate) fn load_properties(&self, entity: EntityRef) -> Result<Properties, RoadGraphError> {
        let sql = format!("SELECT data FROM {} WHERE id=?1", entity.table());
        let data: Option<String> = self
            .connection()?
            .query_row(&sql, params![entity.id()], |row| row.get(0))
            .optional()
            .map_err(RoadGraphError::sqlite)?;
        let data = data.ok_or_else(|| {
            RoadGraphError::store(format!("{} not found", entity.describe()))
        })?;
        parse_properties(&data).map_err(RoadGraphError::sqlite)
    }

    pub(crate) fn store_properties(
        &self,
        entity: EntityRef,
        properties: &Properties,
    ) -> Result<(), RoadGraphError> {
        let data = serde_json::to_string(properties)
            .map_err(|e| RoadGraphError::store(e.to_string()))?;
        let sql = format!("UPDATE {} SET data=?1 WHERE id=?2", entity.table());
        let affected = self
            .connection()?
            .execute(&sql, params![data, entity.id()])
            .map_err(RoadGraphError::sqlite)?;
        if affected == 0 {
            return Err(RoadGraphError::store(format!(
                "{} not found",
                entity.describe()
            )));
        }
        Ok(())
    }
}

impl Drop for GraphTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(conn) = self.guard.as_ref() {
            if let Err(err) = conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "roadgraph.transaction.rollback_failed");
            }
        }
    }
}
