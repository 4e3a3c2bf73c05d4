//! Deterministic page-wise enumeration of every edge in the graph.
//!
//! Pages are ordered by descending `osm_id` (ties by descending row id) and
//! computed independently per call: no cursor state survives between calls.
//! Numeric ids come first, then text ids, then any other JSON value. Edges
//! without an `osm_id` (or with a `null` one) come last.
//! A full scan fetches page 0, 1, 2, ... until an empty page comes back;
//! running the whole scan inside one transaction gives a consistent view.

use rusqlite::params;
use tracing::debug;

use crate::{
    errors::RoadGraphError,
    graph::{Edge, GraphTransaction, row_to_edge},
};

pub const RELATIONSHIP_PAGE_SIZE: usize = 5000;

/// One bounded slice of the edge set.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePage {
    pub number: usize,
    edges: Vec<Edge>,
}

impl EdgePage {
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edge> {
        self.edges.iter()
    }
}

impl IntoIterator for EdgePage {
    type Item = Edge;
    type IntoIter = std::vec::IntoIter<Edge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.into_iter()
    }
}

impl<'a> IntoIterator for &'a EdgePage {
    type Item = &'a Edge;
    type IntoIter = std::slice::Iter<'a, Edge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}

/// Returns zero-based page `page_number` of [`RELATIONSHIP_PAGE_SIZE`] edges.
pub fn page(tx: &GraphTransaction<'_>, page_number: usize) -> Result<EdgePage, RoadGraphError> {
    page_with_size(tx, page_number, RELATIONSHIP_PAGE_SIZE)
}

pub fn page_with_size(
    tx: &GraphTransaction<'_>,
    page_number: usize,
    page_size: usize,
) -> Result<EdgePage, RoadGraphError> {
    if page_size == 0 {
        return Err(RoadGraphError::store("page size must be positive"));
    }
    let skip = page_number
        .checked_mul(page_size)
        .and_then(|skip| i64::try_from(skip).ok())
        .ok_or_else(|| RoadGraphError::store(format!("page {page_number} is out of range")))?;
    let limit = i64::try_from(page_size)
        .map_err(|_| RoadGraphError::store(format!("page size {page_size} is out of range")))?;

    let conn = tx.connection()?;
    let mut stmt = conn
        .prepare_cached(
            "SELECT id, from_id, to_id, edge_type, data FROM graph_edges \
             ORDER BY CASE coalesce(json_type(data, '$.osm_id'), 'null') \
             WHEN 'integer' THEN 0 WHEN 'real' THEN 0 WHEN 'text' THEN 1 \
             WHEN 'null' THEN 3 ELSE 2 END, \
             json_extract(data, '$.osm_id') DESC, id DESC LIMIT ?1 OFFSET ?2",
        )
        .map_err(RoadGraphError::sqlite)?;
    let rows = stmt
        .query_map(params![limit, skip], row_to_edge)
        .map_err(RoadGraphError::sqlite)?;
    let mut edges = Vec::with_capacity(page_size.min(RELATIONSHIP_PAGE_SIZE));
    for edge in rows {
        edges.push(edge.map_err(RoadGraphError::sqlite)?);
    }
    debug!(page = page_number, skip, returned = edges.len(), "roadgraph.pager.page");
    Ok(EdgePage {
        number: page_number,
        edges,
    })
}

impl GraphTransaction<'_> {
    /// See [`page`].
    pub fn relationship_page(&self, page_number: usize) -> Result<EdgePage, RoadGraphError> {
        page(self, page_number)
    }
}
