mod store;
mod transaction;
mod types;

pub use store::{DATABASE_FILE_NAME, RoadGraph};
pub use transaction::GraphTransaction;
pub use types::{
    Edge, EdgeKind, EntityRef, Node, NodeKind, PROPERTY_ASSOCIATED_DATA, PROPERTY_GEOM,
    PROPERTY_OSM_ID, Point, Polyline, Properties, Row, WGS84_SRID,
};

pub(crate) use types::row_to_edge;
