#![allow(dead_code)]

use std::sync::Once;

use roadgraph::{
    EdgeKind, NodeKind, Point, Polyline, Properties, RoadGraph, RoadGraphError,
    graph::{PROPERTY_GEOM, PROPERTY_OSM_ID},
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Edge count of the road network used across the integration tests.
pub const FIXTURE_EDGE_COUNT: usize = 676;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("roadgraph=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

pub fn node_osm_id(i: usize) -> i64 {
    65_300_000 + i as i64
}

/// Builds a chain of `edges` road segments over `edges + 1` intersections.
/// Segment `i` has `osm_id = i + 1` and joins intersections `i` and `i + 1`.
pub fn build_road_chain(graph: &RoadGraph, edges: usize) -> Result<(), RoadGraphError> {
    let tx = graph.begin_transaction()?;
    let mut node_ids = Vec::with_capacity(edges + 1);
    for i in 0..=edges {
        let mut properties = Properties::new();
        properties.insert(PROPERTY_OSM_ID.to_string(), json!(node_osm_id(i)));
        properties.insert(PROPERTY_GEOM.to_string(), position(i).to_value());
        node_ids.push(tx.create_node(NodeKind::Intersection, properties)?.id);
    }
    for i in 0..edges {
        let mut properties = Properties::new();
        properties.insert(PROPERTY_OSM_ID.to_string(), json!(i as i64 + 1));
        properties.insert("start_osm_id".to_string(), json!(node_osm_id(i)));
        properties.insert("end_osm_id".to_string(), json!(node_osm_id(i + 1)));
        let line = Polyline(vec![position(i), position(i + 1)]);
        properties.insert(PROPERTY_GEOM.to_string(), line.to_value());
        tx.create_edge(node_ids[i], node_ids[i + 1], EdgeKind::Connects, properties)?;
    }
    tx.commit()
}

pub fn loaded_graph() -> RoadGraph {
    init_tracing();
    let graph = RoadGraph::open_in_memory().expect("graph");
    build_road_chain(&graph, FIXTURE_EDGE_COUNT).expect("fixture");
    graph
}

pub fn empty_graph() -> RoadGraph {
    init_tracing();
    RoadGraph::open_in_memory().expect("graph")
}

fn position(i: usize) -> Point {
    Point::wgs84(-122.5 + i as f64 * 0.001, 37.75)
}
