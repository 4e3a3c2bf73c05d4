//! Associated data: named JSON payloads attached to road segments.
//!
//! Each edge carries a ledger under [`PROPERTY_ASSOCIATED_DATA`] listing, in
//! first-attachment order, the names of the payload properties written by
//! [`set_associated_data`]. A payload property holds the JSON text of an
//! array of objects. The ledger never holds a duplicate, and a name is in
//! the ledger exactly when its payload property exists.

use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    errors::RoadGraphError,
    graph::{
        Edge, EntityRef, GraphTransaction, PROPERTY_ASSOCIATED_DATA, PROPERTY_GEOM,
        PROPERTY_OSM_ID,
    },
};

const RESERVED_NAMES: &[&str] = &[PROPERTY_ASSOCIATED_DATA, PROPERTY_GEOM, PROPERTY_OSM_ID];

/// A validated payload: one or more JSON objects.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociatedData(Vec<Map<String, Value>>);

impl AssociatedData {
    /// Accepts a bare object (wrapped into a one-element array) or an array
    /// whose every element is an object.
    pub fn from_value(payload: &Value) -> Result<Self, RoadGraphError> {
        match payload {
            Value::Object(object) => Ok(Self(vec![object.clone()])),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(object) => Ok(object.clone()),
                    other => Err(RoadGraphError::invalid_payload(format!(
                        "element {i} is {}, expected an object",
                        json_kind(other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
            other => Err(RoadGraphError::invalid_payload(format!(
                "payload is {}, expected an object or an array of objects",
                json_kind(other)
            ))),
        }
    }

    pub fn objects(&self) -> &[Map<String, Value>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical JSON text (keys sorted) stored on the edge.
    pub fn to_json_text(&self) -> Result<String, RoadGraphError> {
        serde_json::to_string(&self.0).map_err(|e| RoadGraphError::invalid_payload(e.to_string()))
    }

    fn from_json_text(name: &str, text: &str) -> Result<Self, RoadGraphError> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            RoadGraphError::store(format!("associated data {name:?} is not valid JSON: {e}"))
        })?;
        match value {
            Value::Array(_) => Self::from_value(&value),
            _ => Err(RoadGraphError::store(format!(
                "associated data {name:?} is not a JSON array"
            ))),
        }
    }
}

/// Attaches `payload` to `edge` under `name` inside the caller's transaction.
///
/// The name is appended to the ledger the first time it is used; later calls
/// leave the ledger unchanged and overwrite the stored payload. `edge` is
/// updated to mirror the two written properties. Nothing is committed here.
pub fn set_associated_data(
    tx: &GraphTransaction<'_>,
    edge: &mut Edge,
    name: &str,
    payload: &Value,
) -> Result<(), RoadGraphError> {
    validate_name(name)?;
    let data = AssociatedData::from_value(payload)?;
    let text = data.to_json_text()?;

    let entity = EntityRef::from(&*edge);
    let mut properties = tx.load_properties(entity)?;
    let mut ledger = ledger_from(properties.get(PROPERTY_ASSOCIATED_DATA))?;
    let appended = !ledger.iter().any(|existing| existing == name);
    if appended {
        ledger.push(name.to_string());
        properties.insert(
            PROPERTY_ASSOCIATED_DATA.to_string(),
            Value::from(ledger.clone()),
        );
    }
    properties.insert(name.to_string(), Value::String(text));
    tx.store_properties(entity, &properties)?;

    debug!(
        edge = edge.id,
        name,
        objects = data.len(),
        appended,
        "roadgraph.associated_data.set"
    );
    edge.properties = properties;
    Ok(())
}

/// Ledger of `edge`, in first-attachment order. Empty when nothing has been
/// attached.
pub fn associated_data_names(edge: &Edge) -> Result<Vec<String>, RoadGraphError> {
    ledger_from(edge.property(PROPERTY_ASSOCIATED_DATA))
}

/// Decoded payload stored under `name`, or `None` if `name` is not in the
/// ledger.
pub fn associated_data(edge: &Edge, name: &str) -> Result<Option<AssociatedData>, RoadGraphError> {
    if !associated_data_names(edge)?.iter().any(|n| n == name) {
        return Ok(None);
    }
    match edge.property(name) {
        Some(Value::String(text)) => AssociatedData::from_json_text(name, text).map(Some),
        Some(_) => Err(RoadGraphError::store(format!(
            "associated data {name:?} is not stored as JSON text"
        ))),
        None => Err(RoadGraphError::store(format!(
            "edge {} lists {name:?} but has no such property",
            edge.id
        ))),
    }
}

fn validate_name(name: &str) -> Result<(), RoadGraphError> {
    if name.trim().is_empty() {
        return Err(RoadGraphError::invalid_payload(
            "associated data name must be set",
        ));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(RoadGraphError::invalid_payload(format!(
            "{name:?} is a reserved property name"
        )));
    }
    Ok(())
}

fn ledger_from(value: Option<&Value>) -> Result<Vec<String>, RoadGraphError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let malformed = || {
        RoadGraphError::store(format!(
            "{PROPERTY_ASSOCIATED_DATA} is not an array of strings"
        ))
    };
    value
        .as_array()
        .ok_or_else(malformed)?
        .iter()
        .map(|entry| entry.as_str().map(str::to_string).ok_or_else(malformed))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
