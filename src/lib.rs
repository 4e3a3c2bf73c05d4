//! Associated-data and index management for road-network graphs.
//!
//! Intersections are nodes and road segments are `CONNECTS` relationships
//! of an embedded SQLite-backed graph. On top of data imported elsewhere
//! the crate provides:
//!
//! - [`RoadGraph`] - owned store handle with scoped [`GraphTransaction`]s
//! - [`associated`] - duplicate-free ledger of named JSON payloads per edge
//! - [`index`] - create/drop of the lookup and spatial index catalogue
//! - [`pager`] - deterministic page-wise scan of all edges
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use roadgraph::{RoadGraph, associated, pager};
//! use serde_json::json;
//!
//! let graph = RoadGraph::open("/var/lib/roads")?;
//! graph.create_node_indexes();
//!
//! let tx = graph.begin_transaction()?;
//! for mut edge in pager::page(&tx, 0)? {
//!     associated::set_associated_data(&tx, &mut edge, "elevation", &json!({ "m": 120 }))?;
//! }
//! tx.commit()?;
//! graph.close()?;
//! # Ok::<(), roadgraph::RoadGraphError>(())
//! ```

pub mod associated;
pub mod config;
pub mod errors;
pub mod graph;
pub mod index;
pub mod pager;
pub mod schema;

pub use associated::{AssociatedData, associated_data, associated_data_names, set_associated_data};
pub use config::GraphConfig;
pub use errors::RoadGraphError;
pub use graph::{
    Edge, EdgeKind, EntityRef, GraphTransaction, Node, NodeKind, Point, Polyline, Properties,
    RoadGraph, Row,
};
pub use index::{IndexDescriptor, IndexInfo, IndexKind, IndexManager, IndexReport, list_indexes};
pub use pager::{EdgePage, RELATIONSHIP_PAGE_SIZE};
