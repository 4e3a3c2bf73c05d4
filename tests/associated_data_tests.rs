mod common;

use roadgraph::{
    EdgeKind, RoadGraph, RoadGraphError, associated_data, associated_data_names,
    graph::{Edge, GraphTransaction, PROPERTY_ASSOCIATED_DATA},
    set_associated_data,
};
use serde_json::{Value, json};

use common::{loaded_graph, node_osm_id};

fn segment(tx: &GraphTransaction<'_>) -> Edge {
    tx.find_edge(EdgeKind::Connects, "start_osm_id", &json!(node_osm_id(41)))
        .expect("query")
        .expect("segment 41")
}

fn stored_text(tx: &GraphTransaction<'_>, edge: &Edge, name: &str) -> Value {
    let text = tx
        .get_property(edge, name)
        .expect("property")
        .expect("present");
    serde_json::from_str(text.as_str().expect("json text")).expect("json")
}

#[test]
fn test_set_associated_data_single_prop() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);

    set_associated_data(&tx, &mut edge, "myProp", &json!([{ "my": "data" }])).expect("set");

    let ledger = tx
        .get_property(&edge, PROPERTY_ASSOCIATED_DATA)
        .expect("ledger")
        .expect("present");
    assert_eq!(ledger, json!(["myProp"]));
    assert_eq!(stored_text(&tx, &edge, "myProp")[0]["my"], json!("data"));
    tx.rollback().expect("rollback");
}

#[test]
fn test_set_associated_data_multiple_props_keep_order() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);

    for name in ["myProp", "myProp2", "alpha", "zeta"] {
        set_associated_data(&tx, &mut edge, name, &json!([{ "name": name }])).expect("set");
    }

    let reread = tx.edge(edge.id).expect("edge");
    assert_eq!(
        associated_data_names(&reread).expect("names"),
        vec!["myProp", "myProp2", "alpha", "zeta"]
    );
    assert_eq!(stored_text(&tx, &reread, "myProp2")[0]["name"], json!("myProp2"));
    tx.rollback().expect("rollback");
}

#[test]
fn test_same_prop_twice_is_listed_once_and_overwritten() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);

    set_associated_data(&tx, &mut edge, "myProp", &json!([{ "my": "data" }])).expect("first");
    set_associated_data(&tx, &mut edge, "myProp", &json!([{ "my2": "data2" }])).expect("second");

    assert_eq!(associated_data_names(&edge).expect("names"), vec!["myProp"]);
    let stored = stored_text(&tx, &edge, "myProp");
    assert_eq!(stored, json!([{ "my2": "data2" }]));
    tx.rollback().expect("rollback");
}

#[test]
fn test_bare_objects_are_wrapped() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);

    set_associated_data(&tx, &mut edge, "myProp", &json!({ "my": "data" })).expect("set");
    set_associated_data(&tx, &mut edge, "myProp2", &json!({ "my2": "data2" })).expect("set");

    assert_eq!(
        associated_data_names(&edge).expect("names"),
        vec!["myProp", "myProp2"]
    );
    assert_eq!(stored_text(&tx, &edge, "myProp"), json!([{ "my": "data" }]));
    assert_eq!(stored_text(&tx, &edge, "myProp2"), json!([{ "my2": "data2" }]));
    tx.rollback().expect("rollback");
}

#[test]
fn test_object_and_array_forms_share_a_name() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);

    set_associated_data(&tx, &mut edge, "surface", &json!({ "kind": "gravel" })).expect("obj");
    let decoded = associated_data(&edge, "surface").expect("read").expect("present");
    assert_eq!(decoded.len(), 1);

    set_associated_data(
        &tx,
        &mut edge,
        "surface",
        &json!([{ "kind": "asphalt" }, { "kind": "concrete" }]),
    )
    .expect("array");
    let decoded = associated_data(&edge, "surface").expect("read").expect("present");
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded.objects()[1]["kind"], json!("concrete"));
    assert_eq!(associated_data_names(&edge).expect("names"), vec!["surface"]);
    tx.rollback().expect("rollback");
}

#[test]
fn test_elevation_scenario_survives_commit() {
    let graph = loaded_graph();

    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);
    let id = edge.id;
    set_associated_data(&tx, &mut edge, "elev", &json!([{ "m": 120 }])).expect("set");
    tx.commit().expect("commit");

    let tx = graph.begin_transaction().expect("tx");
    let mut edge = tx.edge(id).expect("edge");
    assert_eq!(associated_data_names(&edge).expect("names"), vec!["elev"]);
    assert_eq!(edge.property("elev"), Some(&json!(r#"[{"m":120}]"#)));

    set_associated_data(&tx, &mut edge, "elev", &json!({ "m": 130 })).expect("set");
    tx.commit().expect("commit");

    let tx = graph.begin_transaction().expect("tx");
    let edge = tx.edge(id).expect("edge");
    assert_eq!(associated_data_names(&edge).expect("names"), vec!["elev"]);
    assert_eq!(edge.property("elev"), Some(&json!(r#"[{"m":130}]"#)));
    tx.close().expect("close");
}

#[test]
fn test_rollback_discards_ledger_and_payload() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);
    let id = edge.id;
    set_associated_data(&tx, &mut edge, "myProp", &json!({ "my": "data" })).expect("set");
    tx.rollback().expect("rollback");

    let tx = graph.begin_transaction().expect("tx");
    assert!(!tx.has_property(roadgraph::EntityRef::Edge(id), PROPERTY_ASSOCIATED_DATA).expect("has"));
    assert!(!tx.has_property(roadgraph::EntityRef::Edge(id), "myProp").expect("has"));
}

#[test]
fn test_other_properties_are_preserved() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);
    let geom = edge.geom().expect("geom");

    set_associated_data(&tx, &mut edge, "myProp", &json!({ "my": "data" })).expect("set");

    let reread = tx.edge(edge.id).expect("edge");
    assert_eq!(reread.geom(), Some(geom));
    assert_eq!(reread.osm_id(), Some(&json!(42)));
    assert_eq!(reread, edge);
}

#[test]
fn test_invalid_payloads_are_rejected_without_writes() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);

    for payload in [json!("text"), json!(7), json!([1, 2]), json!([{ "ok": 1 }, null])] {
        let err = set_associated_data(&tx, &mut edge, "bad", &payload).expect_err("invalid");
        assert!(matches!(err, RoadGraphError::InvalidPayload(_)), "{err:?}");
    }
    let err = set_associated_data(&tx, &mut edge, PROPERTY_ASSOCIATED_DATA, &json!({}))
        .expect_err("reserved");
    assert!(matches!(err, RoadGraphError::InvalidPayload(_)));

    assert!(!tx.has_property(&edge, PROPERTY_ASSOCIATED_DATA).expect("has"));
    assert!(!tx.has_property(&edge, "bad").expect("has"));
}

#[test]
fn test_missing_edge_is_a_store_error() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);
    tx.delete_edge(edge.id).expect("delete");

    let err = set_associated_data(&tx, &mut edge, "myProp", &json!({})).expect_err("gone");
    assert!(matches!(err, RoadGraphError::StoreError(_)), "{err:?}");
}

#[test]
fn test_malformed_ledger_is_a_store_error() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let mut edge = segment(&tx);
    tx.set_property(&edge, PROPERTY_ASSOCIATED_DATA, json!("myProp"))
        .expect("corrupt");

    let err = set_associated_data(&tx, &mut edge, "myProp", &json!({})).expect_err("ledger");
    assert!(matches!(err, RoadGraphError::StoreError(_)), "{err:?}");
}

#[test]
fn test_unlisted_property_is_not_associated_data() {
    let graph = RoadGraph::open_in_memory().expect("graph");
    common::build_road_chain(&graph, 1).expect("fixture");
    let tx = graph.begin_transaction().expect("tx");
    let edge = tx
        .find_edge(EdgeKind::Connects, "osm_id", &json!(1))
        .expect("query")
        .expect("edge");
    assert!(associated_data_names(&edge).expect("names").is_empty());
    assert!(associated_data(&edge, "start_osm_id").expect("read").is_none());
}
