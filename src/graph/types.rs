use std::str::FromStr;

use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RoadGraphError;

/// Property holding the ordered list of associated-data names on an edge.
pub const PROPERTY_ASSOCIATED_DATA: &str = "associatedData";
pub const PROPERTY_GEOM: &str = "geom";
pub const PROPERTY_OSM_ID: &str = "osm_id";

/// EPSG:4326, the only coordinate reference system used by the graph.
pub const WGS84_SRID: u32 = 4326;

/// Property bag stored as JSON in the `data` column.
pub type Properties = Map<String, Value>;

/// One result row of [`GraphTransaction::execute`](crate::GraphTransaction::execute),
/// keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Intersection,
}

impl NodeKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            NodeKind::Intersection => "Intersection",
        }
    }
}

impl FromStr for NodeKind {
    type Err = RoadGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Intersection" => Ok(NodeKind::Intersection),
            other => Err(RoadGraphError::store(format!("unknown node label {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Connects,
}

impl EdgeKind {
    pub fn as_type(&self) -> &'static str {
        match self {
            EdgeKind::Connects => "CONNECTS",
        }
    }
}

impl FromStr for EdgeKind {
    type Err = RoadGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECTS" => Ok(EdgeKind::Connects),
            other => Err(RoadGraphError::store(format!(
                "unknown relationship type {other}"
            ))),
        }
    }
}

/// A lon/lat point in [`WGS84_SRID`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub srid: u32,
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn wgs84(lon: f64, lat: f64) -> Self {
        Self {
            srid: WGS84_SRID,
            x: lon,
            y: lat,
        }
    }

    pub fn lon(&self) -> f64 {
        self.x
    }

    pub fn lat(&self) -> f64 {
        self.y
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "srid": self.srid, "x": self.x, "y": self.y })
    }
}

/// Ordered points of a road segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Polyline(pub Vec<Point>);

impl Polyline {
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.0.iter().map(Point::to_value).collect())
    }
}

/// Intersection snapshot read inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub kind: NodeKind,
    pub properties: Properties,
}

impl Node {
    pub fn osm_id(&self) -> Option<&Value> {
        self.properties.get(PROPERTY_OSM_ID)
    }

    pub fn geom(&self) -> Option<Point> {
        self.properties
            .get(PROPERTY_GEOM)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Road segment snapshot read inside a transaction.
///
/// Direction is only storage order; traversal treats edges as undirected.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub kind: EdgeKind,
    pub properties: Properties,
}

impl Edge {
    pub fn osm_id(&self) -> Option<&Value> {
        self.properties.get(PROPERTY_OSM_ID)
    }

    pub fn geom(&self) -> Option<Polyline> {
        self.properties
            .get(PROPERTY_GEOM)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn connects(&self, node_id: i64) -> bool {
        self.from_id == node_id || self.to_id == node_id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Node(i64),
    Edge(i64),
}

impl EntityRef {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            EntityRef::Node(_) => "graph_entities",
            EntityRef::Edge(_) => "graph_edges",
        }
    }

    pub(crate) fn id(&self) -> i64 {
        match self {
            EntityRef::Node(id) | EntityRef::Edge(id) => *id,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            EntityRef::Node(id) => format!("node {id}"),
            EntityRef::Edge(id) => format!("edge {id}"),
        }
    }
}

impl From<&Node> for EntityRef {
    fn from(node: &Node) -> Self {
        EntityRef::Node(node.id)
    }
}

impl From<&Edge> for EntityRef {
    fn from(edge: &Edge) -> Self {
        EntityRef::Edge(edge.id)
    }
}

pub(crate) fn parse_properties(data: &str) -> Result<Properties, rusqlite::Error> {
    serde_json::from_str(data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            data.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn parse_kind<K: FromStr<Err = RoadGraphError>>(raw: &str) -> Result<K, rusqlite::Error> {
    raw.parse().map_err(|e: RoadGraphError| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

/// Maps `SELECT id, label, data` rows.
pub(crate) fn row_to_node(row: &rusqlite::Row<'_>) -> Result<Node, rusqlite::Error> {
    let label: String = row.get(1)?;
    let data: String = row.get(2)?;
    Ok(Node {
        id: row.get(0)?,
        kind: parse_kind(&label)?,
        properties: parse_properties(&data)?,
    })
}

/// Maps `SELECT id, from_id, to_id, edge_type, data` rows.
pub(crate) fn row_to_edge(row: &rusqlite::Row<'_>) -> Result<Edge, rusqlite::Error> {
    let edge_type: String = row.get(3)?;
    let data: String = row.get(4)?;
    Ok(Edge {
        id: row.get(0)?,
        from_id: row.get(1)?,
        to_id: row.get(2)?,
        kind: parse_kind(&edge_type)?,
        properties: parse_properties(&data)?,
    })
}

/// Binds a JSON scalar the way `json_extract` returns it, so equality
/// against an extracted property matches.
pub(crate) fn json_to_sql(value: &Value) -> ToSqlOutput<'static> {
    let sql = match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    };
    ToSqlOutput::Owned(sql)
}

pub(crate) fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Property keys are spliced into `json_extract` paths, so only plain
/// identifiers are accepted.
pub(crate) fn validate_property_key(key: &str) -> Result<(), RoadGraphError> {
    let mut chars = key.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RoadGraphError::store(format!(
            "property key {key:?} is not a plain identifier"
        )))
    }
}
