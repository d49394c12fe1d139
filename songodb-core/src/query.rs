// src/query.rs
//! Query module for the MongoDB-like filter language
//!
//! Filters are parsed into a `Filter` tree (see `operators`) once per
//! operation and then evaluated against every scanned document.

pub mod operators;

use serde_json::Value;

use crate::document::ID_FIELD;
use crate::error::Result;

pub use operators::{ElemMatch, FieldPredicate, Filter};

/// Evaluate a JSON filter against one document
///
/// ```
/// use serde_json::json;
/// use songodb_core::query::matches_filter;
///
/// let doc = json!({"age": 21});
/// assert!(matches_filter(&doc, &json!({"age": {"$gt": 18}})).unwrap());
/// ```
pub fn matches_filter(document: &Value, filter: &Value) -> Result<bool> {
    Ok(Filter::parse(filter)?.matches(document))
}

/// Id of a point lookup: the filter is exactly `{ "_id": "<string>" }`
///
/// Such filters skip the prefix scan and read the single key directly.
pub fn point_lookup_id(filter: &Value) -> Option<&str> {
    let map = filter.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(ID_FIELD)?.as_str()
}

/// A filter is "empty" when it is `null` or `{}`
pub fn is_empty_filter(filter: &Value) -> bool {
    match filter {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
