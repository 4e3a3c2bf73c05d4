//! Lookup and spatial indexes over intersections and road segments.
//!
//! The catalogue is fixed: an exact-match index on intersection `osm_id`, a
//! point index on intersection `geom`, and a point index on `CONNECTS`
//! `geom`. Lookup indexes are partial expression indexes over the JSON
//! property bag. Point indexes are R*Tree tables kept current by triggers.
//!
//! Every phase of a lifecycle operation runs in its own transaction and is
//! best-effort: a failed phase is logged, recorded in the returned
//! [`IndexReport`], and the remaining phases still run.

use std::fmt;

use rusqlite::params;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    errors::RoadGraphError,
    graph::{
        EdgeKind, GraphTransaction, NodeKind, PROPERTY_GEOM, PROPERTY_OSM_ID, Point, Polyline,
        RoadGraph,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityType {
    Node,
    Relationship,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Node => "NODE",
            EntityType::Relationship => "RELATIONSHIP",
        }
    }

    fn parse(raw: &str) -> Result<Self, RoadGraphError> {
        match raw {
            "NODE" => Ok(EntityType::Node),
            "RELATIONSHIP" => Ok(EntityType::Relationship),
            other => Err(RoadGraphError::store(format!("unknown entity type {other}"))),
        }
    }

    fn table(&self) -> &'static str {
        match self {
            EntityType::Node => "graph_entities",
            EntityType::Relationship => "graph_edges",
        }
    }

    fn selector_column(&self) -> &'static str {
        match self {
            EntityType::Node => "label",
            EntityType::Relationship => "edge_type",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Exact-match lookup.
    Lookup,
    /// Spatial index over points and polyline bounding boxes.
    Point,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Lookup => "LOOKUP",
            IndexKind::Point => "POINT",
        }
    }

    fn parse(raw: &str) -> Result<Self, RoadGraphError> {
        match raw {
            "LOOKUP" => Ok(IndexKind::Lookup),
            "POINT" => Ok(IndexKind::Point),
            other => Err(RoadGraphError::store(format!("unknown index kind {other}"))),
        }
    }
}

/// Declaration of one catalogue index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: &'static str,
    pub entity: EntityType,
    pub selector: &'static str,
    pub properties: &'static [&'static str],
    pub kind: IndexKind,
}

pub const INTERSECTION_OSM_ID_INDEX: IndexDescriptor = IndexDescriptor {
    name: "intersection_osm_id_idx",
    entity: EntityType::Node,
    selector: "Intersection",
    properties: &[PROPERTY_OSM_ID],
    kind: IndexKind::Lookup,
};

pub const INTERSECTION_GEOM_POINT_INDEX: IndexDescriptor = IndexDescriptor {
    name: "intersection_geom_point_idx",
    entity: EntityType::Node,
    selector: "Intersection",
    properties: &[PROPERTY_GEOM],
    kind: IndexKind::Point,
};

pub const WAY_GEOM_POINT_INDEX: IndexDescriptor = IndexDescriptor {
    name: "way_geom_point_idx",
    entity: EntityType::Relationship,
    selector: "CONNECTS",
    properties: &[PROPERTY_GEOM],
    kind: IndexKind::Point,
};

pub const NODE_INDEXES: &[IndexDescriptor] =
    &[INTERSECTION_OSM_ID_INDEX, INTERSECTION_GEOM_POINT_INDEX];

pub const RELATIONSHIP_INDEXES: &[IndexDescriptor] = &[WAY_GEOM_POINT_INDEX];

impl IndexDescriptor {
    /// Statements declaring the index.
    pub fn create_sql(&self) -> Result<String, RoadGraphError> {
        let table = self.entity.table();
        match self.kind {
            IndexKind::Lookup => {
                let columns = self
                    .properties
                    .iter()
                    .map(|property| format!("json_extract(data, '$.{property}')"))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(format!(
                    "CREATE INDEX {name} ON {table}({columns}) WHERE {filter};",
                    name = self.name,
                    filter = self.selector_filter("")
                ))
            }
            IndexKind::Point => {
                let name = self.name;
                let lookup = |row_filter: &str| self.bounding_box_select(row_filter);
                Ok(format!(
                    "CREATE VIRTUAL TABLE {name} USING rtree(id, min_x, max_x, min_y, max_y);\n\
                     INSERT INTO {name}(id, min_x, max_x, min_y, max_y) {backfill};\n\
                     CREATE TRIGGER {name}_insert AFTER INSERT ON {table} BEGIN \
                     INSERT INTO {name}(id, min_x, max_x, min_y, max_y) {changed}; END;\n\
                     CREATE TRIGGER {name}_update AFTER UPDATE ON {table} BEGIN \
                     DELETE FROM {name} WHERE id = OLD.id; \
                     INSERT INTO {name}(id, min_x, max_x, min_y, max_y) {changed}; END;\n\
                     CREATE TRIGGER {name}_delete AFTER DELETE ON {table} BEGIN \
                     DELETE FROM {name} WHERE id = OLD.id; END;",
                    backfill = lookup("")?,
                    changed = lookup(" AND r.id = NEW.id")?,
                ))
            }
        }
    }

    /// Statements removing the index. Fails when the index does not exist.
    pub fn drop_sql(&self) -> String {
        let name = self.name;
        match self.kind {
            IndexKind::Lookup => format!("DROP INDEX {name};"),
            IndexKind::Point => format!(
                "DROP TABLE {name};\n\
                 DROP TRIGGER IF EXISTS {name}_insert;\n\
                 DROP TRIGGER IF EXISTS {name}_update;\n\
                 DROP TRIGGER IF EXISTS {name}_delete;"
            ),
        }
    }

    fn selector_filter(&self, alias: &str) -> String {
        format!(
            "{alias}{column} = '{selector}'",
            column = self.entity.selector_column(),
            selector = self.selector
        )
    }

    /// `SELECT id, min_x, max_x, min_y, max_y` over matching rows aliased
    /// `r`: a point property yields a degenerate box, an array of points
    /// yields its bounding box.
    fn bounding_box_select(&self, row_filter: &str) -> Result<String, RoadGraphError> {
        let [property] = self.properties else {
            return Err(RoadGraphError::index_operation(
                self.name,
                IndexPhase::IndexCreate.as_str(),
                "point indexes cover exactly one property",
            ));
        };
        let table = self.entity.table();
        let filter = self.selector_filter("r.");
        let numeric = |doc: &str, path: &str| {
            format!("json_type({doc}, '{path}') IN ('integer', 'real')")
        };
        let x = format!("json_extract(r.data, '$.{property}.x')");
        let y = format!("json_extract(r.data, '$.{property}.y')");
        Ok(format!(
            "SELECT r.id, {x}, {x}, {y}, {y} FROM {table} AS r \
             WHERE {filter}{row_filter} AND {px} AND {py} \
             UNION ALL \
             SELECT r.id, min(json_extract(g.value, '$.x')), max(json_extract(g.value, '$.x')), \
             min(json_extract(g.value, '$.y')), max(json_extract(g.value, '$.y')) \
             FROM {table} AS r, json_each(r.data, '$.{property}') AS g \
             WHERE {filter}{row_filter} AND json_type(r.data, '$.{property}') = 'array' \
             AND {gx} AND {gy} GROUP BY r.id",
            px = numeric("r.data", &format!("$.{property}.x")),
            py = numeric("r.data", &format!("$.{property}.y")),
            gx = numeric("g.value", "$.x"),
            gy = numeric("g.value", "$.y"),
        ))
    }
}

/// Index as recorded in the catalogue and present in the database schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub entity: EntityType,
    pub selector: String,
    pub properties: Vec<String>,
    pub kind: IndexKind,
}

impl IndexInfo {
    pub fn covers(&self, entity: EntityType, selector: &str, property: &str, kind: IndexKind) -> bool {
        self.entity == entity
            && self.kind == kind
            && self.selector == selector
            && self.properties.iter().any(|p| p == property)
    }
}

/// Lists catalogue indexes that physically exist, ordered by name.
pub fn list_indexes(tx: &GraphTransaction<'_>) -> Result<Vec<IndexInfo>, RoadGraphError> {
    let conn = tx.connection()?;
    let mut stmt = conn
        .prepare(
            "SELECT c.name, c.entity_type, c.selector, c.property, c.kind \
             FROM graph_index_catalog AS c \
             WHERE EXISTS (SELECT 1 FROM sqlite_master AS m WHERE m.name = c.name) \
             ORDER BY c.name",
        )
        .map_err(RoadGraphError::sqlite)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .map_err(RoadGraphError::sqlite)?;
    let mut indexes = Vec::new();
    for row in rows {
        let (name, entity, selector, properties, kind) = row.map_err(RoadGraphError::sqlite)?;
        indexes.push(IndexInfo {
            name,
            entity: EntityType::parse(&entity)?,
            selector,
            properties: properties.split(',').map(str::to_string).collect(),
            kind: IndexKind::parse(&kind)?,
        });
    }
    Ok(indexes)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexPhase {
    BootstrapCreate,
    IndexCreate,
    BootstrapDelete,
    IndexDrop,
}

impl IndexPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexPhase::BootstrapCreate => "bootstrap-create",
            IndexPhase::IndexCreate => "index-create",
            IndexPhase::BootstrapDelete => "bootstrap-delete",
            IndexPhase::IndexDrop => "index-drop",
        }
    }
}

impl fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct PhaseOutcome {
    pub phase: IndexPhase,
    /// Index name, or the bootstrap selector for bootstrap phases.
    pub target: String,
    /// `IndexOperationFailed` when the phase was rolled back.
    pub error: Option<RoadGraphError>,
}

/// Per-phase result of one lifecycle operation.
#[derive(Debug, Default)]
pub struct IndexReport {
    outcomes: Vec<PhaseOutcome>,
}

impl IndexReport {
    pub fn outcomes(&self) -> &[PhaseOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &RoadGraphError> {
        self.outcomes.iter().filter_map(|o| o.error.as_ref())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.error.is_none())
    }
}

/// Throwaway property values identifying bootstrap entities. The random
/// token keeps them apart from imported data and from other runs.
struct BootstrapSentinel {
    token: String,
}

impl BootstrapSentinel {
    fn new() -> Self {
        Self {
            token: format!("__roadgraph_index_bootstrap_{:016x}", rand::random::<u64>()),
        }
    }

    fn tagged(&self, role: &str) -> Value {
        Value::String(format!("{}_{role}", self.token))
    }
}

/// Creates and drops the catalogue indexes on one graph.
pub struct IndexManager<'g> {
    graph: &'g RoadGraph,
}

impl<'g> IndexManager<'g> {
    pub fn new(graph: &'g RoadGraph) -> Self {
        Self { graph }
    }

    /// Declares the intersection `osm_id` lookup and `geom` point indexes.
    pub fn create_node_indexes(&self) -> IndexReport {
        info!("roadgraph.index.create_node_indexes");
        let mut report = IndexReport::default();
        let bootstrap = self.graph.config().bootstrap_index_entities;
        let sentinel = BootstrapSentinel::new();
        let target = NodeKind::Intersection.as_label();

        if bootstrap {
            self.run_phase(&mut report, IndexPhase::BootstrapCreate, target, |tx| {
                let mut properties = Map::new();
                properties.insert(PROPERTY_OSM_ID.to_string(), sentinel.tagged("node"));
                properties.insert(PROPERTY_GEOM.to_string(), Point::wgs84(50.0, 50.0).to_value());
                tx.create_node(NodeKind::Intersection, properties)?;
                Ok(())
            });
        }
        for descriptor in NODE_INDEXES {
            self.create_index(&mut report, descriptor);
        }
        if bootstrap {
            self.run_phase(&mut report, IndexPhase::BootstrapDelete, target, |tx| {
                let node = find_bootstrap_node(tx, &sentinel, "node")?;
                tx.delete_node(node)
            });
        }
        report
    }

    /// Declares the `CONNECTS` `geom` point index.
    pub fn create_relationship_indexes(&self) -> IndexReport {
        info!("roadgraph.index.create_relationship_indexes");
        let mut report = IndexReport::default();
        let bootstrap = self.graph.config().bootstrap_index_entities;
        let sentinel = BootstrapSentinel::new();
        let target = EdgeKind::Connects.as_type();

        if bootstrap {
            self.run_phase(&mut report, IndexPhase::BootstrapCreate, target, |tx| {
                let start = tx.create_node(
                    NodeKind::Intersection,
                    osm_id_only(sentinel.tagged("start")),
                )?;
                let end =
                    tx.create_node(NodeKind::Intersection, osm_id_only(sentinel.tagged("end")))?;
                let mut properties = osm_id_only(sentinel.tagged("rel"));
                let line = Polyline(vec![Point::wgs84(50.0, 50.0), Point::wgs84(51.0, 51.0)]);
                properties.insert(PROPERTY_GEOM.to_string(), line.to_value());
                tx.create_edge(start.id, end.id, EdgeKind::Connects, properties)?;
                Ok(())
            });
        }
        for descriptor in RELATIONSHIP_INDEXES {
            self.create_index(&mut report, descriptor);
        }
        if bootstrap {
            self.run_phase(&mut report, IndexPhase::BootstrapDelete, target, |tx| {
                let rel = tx
                    .find_edge(EdgeKind::Connects, PROPERTY_OSM_ID, &sentinel.tagged("rel"))?
                    .ok_or_else(|| RoadGraphError::store("bootstrap relationship not found"))?;
                tx.delete_edge(rel.id)?;
                let start = find_bootstrap_node(tx, &sentinel, "start")?;
                tx.delete_node(start)?;
                let end = find_bootstrap_node(tx, &sentinel, "end")?;
                tx.delete_node(end)
            });
        }
        report
    }

    pub fn drop_node_indexes(&self) -> IndexReport {
        info!("roadgraph.index.drop_node_indexes");
        self.drop_indexes(NODE_INDEXES)
    }

    pub fn drop_relationship_indexes(&self) -> IndexReport {
        info!("roadgraph.index.drop_relationship_indexes");
        self.drop_indexes(RELATIONSHIP_INDEXES)
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexInfo>, RoadGraphError> {
        let tx = self.graph.begin_transaction()?;
        let indexes = list_indexes(&tx)?;
        tx.close()?;
        Ok(indexes)
    }

    fn create_index(&self, report: &mut IndexReport, descriptor: &IndexDescriptor) {
        self.run_phase(report, IndexPhase::IndexCreate, descriptor.name, |tx| {
            tx.execute_batch(&descriptor.create_sql()?)?;
            tx.connection()?
                .execute(
                    "INSERT OR REPLACE INTO graph_index_catalog(name, entity_type, selector, property, kind) \
                     VALUES(?1, ?2, ?3, ?4, ?5)",
                    params![
                        descriptor.name,
                        descriptor.entity.as_str(),
                        descriptor.selector,
                        descriptor.properties.join(","),
                        descriptor.kind.as_str(),
                    ],
                )
                .map_err(RoadGraphError::sqlite)?;
            Ok(())
        });
    }

    fn drop_indexes(&self, descriptors: &[IndexDescriptor]) -> IndexReport {
        let mut report = IndexReport::default();
        for descriptor in descriptors {
            self.run_phase(&mut report, IndexPhase::IndexDrop, descriptor.name, |tx| {
                tx.execute_batch(&descriptor.drop_sql())?;
                tx.connection()?
                    .execute(
                        "DELETE FROM graph_index_catalog WHERE name=?1",
                        params![descriptor.name],
                    )
                    .map_err(RoadGraphError::sqlite)?;
                Ok(())
            });
        }
        report
    }

    fn run_phase<F>(&self, report: &mut IndexReport, phase: IndexPhase, target: &str, work: F)
    where
        F: FnOnce(&GraphTransaction<'_>) -> Result<(), RoadGraphError>,
    {
        let result = self.graph.begin_transaction().and_then(|tx| {
            work(&tx)?;
            tx.commit()
        });
        let error = match result {
            Ok(()) => {
                debug!(index = target, %phase, "roadgraph.index.phase_done");
                None
            }
            Err(err) => {
                warn!(index = target, %phase, error = %err, "roadgraph.index.phase_failed");
                Some(RoadGraphError::index_operation(
                    target,
                    phase.as_str(),
                    err.to_string(),
                ))
            }
        };
        report.outcomes.push(PhaseOutcome {
            phase,
            target: target.to_string(),
            error,
        });
    }
}

fn osm_id_only(osm_id: Value) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(PROPERTY_OSM_ID.to_string(), osm_id);
    properties
}

fn find_bootstrap_node(
    tx: &GraphTransaction<'_>,
    sentinel: &BootstrapSentinel,
    role: &str,
) -> Result<i64, RoadGraphError> {
    tx.find_node(NodeKind::Intersection, PROPERTY_OSM_ID, &sentinel.tagged(role))?
        .map(|node| node.id)
        .ok_or_else(|| RoadGraphError::store(format!("bootstrap {role} node not found")))
}

impl RoadGraph {
    pub fn create_node_indexes(&self) -> IndexReport {
        IndexManager::new(self).create_node_indexes()
    }

    pub fn create_relationship_indexes(&self) -> IndexReport {
        IndexManager::new(self).create_relationship_indexes()
    }

    pub fn drop_node_indexes(&self) -> IndexReport {
        IndexManager::new(self).drop_node_indexes()
    }

    pub fn drop_relationship_indexes(&self) -> IndexReport {
        IndexManager::new(self).drop_relationship_indexes()
    }
}
