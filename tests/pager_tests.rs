mod common;

use std::collections::HashSet;

use roadgraph::{
    EdgeKind, NodeKind, Properties, RELATIONSHIP_PAGE_SIZE, RoadGraphError, pager,
};
use serde_json::json;

use common::{FIXTURE_EDGE_COUNT, empty_graph, loaded_graph};

#[test]
fn test_first_page_holds_every_edge_in_descending_order() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");

    let page = pager::page(&tx, 0).expect("page 0");
    assert_eq!(page.number, 0);
    assert_eq!(page.len(), FIXTURE_EDGE_COUNT);

    let osm_ids: Vec<i64> = page
        .iter()
        .map(|edge| edge.osm_id().and_then(|v| v.as_i64()).expect("osm_id"))
        .collect();
    assert_eq!(osm_ids.first(), Some(&(FIXTURE_EDGE_COUNT as i64)));
    assert_eq!(osm_ids.last(), Some(&1));
    assert!(osm_ids.windows(2).all(|w| w[0] > w[1]));

    let distinct: HashSet<i64> = page.iter().map(|edge| edge.id).collect();
    assert_eq!(distinct.len(), FIXTURE_EDGE_COUNT);
    assert!(page.iter().all(|edge| edge.kind == EdgeKind::Connects));

    assert!(tx.relationship_page(1).expect("page 1").is_empty());
}

#[test]
fn test_small_pages_cover_the_same_sequence() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let full: Vec<i64> = pager::page(&tx, 0)
        .expect("full")
        .iter()
        .map(|edge| edge.id)
        .collect();

    let mut scanned = Vec::new();
    let mut number = 0;
    loop {
        let page = pager::page_with_size(&tx, number, 100).expect("page");
        if page.is_empty() {
            break;
        }
        assert!(page.len() <= 100);
        scanned.extend(page.into_iter().map(|edge| edge.id));
        number += 1;
    }
    assert_eq!(number, 7);
    assert_eq!(scanned, full);
}

#[test]
fn test_pages_are_stable_across_calls() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let first = pager::page_with_size(&tx, 3, 50).expect("first");
    let second = pager::page_with_size(&tx, 3, 50).expect("second");
    assert_eq!(first, second);
    assert_eq!(first.len(), 50);
}

#[test]
fn test_empty_graph_yields_empty_page() {
    let graph = empty_graph();
    let tx = graph.begin_transaction().expect("tx");
    let page = pager::page(&tx, 0).expect("page");
    assert!(page.is_empty());
    assert_eq!(RELATIONSHIP_PAGE_SIZE, 5000);
}

#[test]
fn test_zero_page_size_is_rejected() {
    let graph = loaded_graph();
    let tx = graph.begin_transaction().expect("tx");
    let err = pager::page_with_size(&tx, 0, 0).expect_err("zero");
    assert!(matches!(err, RoadGraphError::StoreError(_)));

    let err = pager::page_with_size(&tx, usize::MAX, 2).expect_err("overflow");
    assert!(matches!(err, RoadGraphError::StoreError(_)));
}

#[test]
fn test_ties_and_missing_osm_ids() {
    let graph = empty_graph();
    let tx = graph.begin_transaction().expect("tx");
    let a = tx
        .create_node(NodeKind::Intersection, Properties::new())
        .expect("a");
    let b = tx
        .create_node(NodeKind::Intersection, Properties::new())
        .expect("b");

    let with_osm_id = |osm_id: i64| {
        let mut properties = Properties::new();
        properties.insert("osm_id".to_string(), json!(osm_id));
        properties
    };
    let low = tx
        .create_edge(a.id, b.id, EdgeKind::Connects, with_osm_id(5))
        .expect("low");
    let unnamed = tx
        .create_edge(a.id, b.id, EdgeKind::Connects, Properties::new())
        .expect("unnamed");
    let tie_first = tx
        .create_edge(a.id, b.id, EdgeKind::Connects, with_osm_id(9))
        .expect("tie first");
    let tie_second = tx
        .create_edge(b.id, a.id, EdgeKind::Connects, with_osm_id(9))
        .expect("tie second");

    let ids: Vec<i64> = pager::page(&tx, 0)
        .expect("page")
        .iter()
        .map(|edge| edge.id)
        .collect();
    assert_eq!(ids, vec![tie_second.id, tie_first.id, low.id, unnamed.id]);
    tx.rollback().expect("rollback");
}

#[test]
fn test_closed_graph_cannot_page() {
    let graph = loaded_graph();
    graph.close().expect("close");
    assert!(matches!(
        graph.begin_transaction(),
        Err(RoadGraphError::StoreClosed)
    ));
}

#[test]
fn test_numeric_osm_ids_precede_text_ids() {
    let graph = empty_graph();
    let tx = graph.begin_transaction().expect("tx");
    let a = tx
        .create_node(NodeKind::Intersection, Properties::new())
        .expect("a");
    let b = tx
        .create_node(NodeKind::Intersection, Properties::new())
        .expect("b");
    for osm_id in [json!("9"), json!(10), json!(2), json!(null)] {
        let mut properties = Properties::new();
        properties.insert("osm_id".to_string(), osm_id);
        tx.create_edge(a.id, b.id, EdgeKind::Connects, properties)
            .expect("edge");
    }

    let osm_ids: Vec<_> = pager::page(&tx, 0)
        .expect("page")
        .iter()
        .map(|edge| edge.osm_id().cloned())
        .collect();
    assert_eq!(
        osm_ids,
        vec![
            Some(json!(10)),
            Some(json!(2)),
            Some(json!("9")),
            Some(json!(null)),
        ]
    );
    tx.rollback().expect("rollback");
}
