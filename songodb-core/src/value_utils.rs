//! Value utility functions shared across modules
//!
//! Documents are plain `serde_json::Value` trees. This module provides the
//! dotted-path accessors the matcher, update engine and sort comparator are
//! built on, plus value equality and ordering.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

use crate::error::{Result, SongoError};

/// Get nested value from JSON with dot notation support
///
/// Supports:
/// - Simple fields: "name"
/// - Nested objects: "address.city"
/// - Array indexing: "items.0.name"
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use songodb_core::value_utils::get_nested_value;
///
/// let doc = json!({"address": {"city": "NYC"}});
/// assert_eq!(get_nested_value(&doc, "address.city"), Some(&json!("NYC")));
/// ```
pub fn get_nested_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    // Fast path: no dots means simple field access
    if !path.contains('.') {
        return doc.get(path);
    }

    let mut value = doc;
    for part in path.split('.') {
        match value {
            Value::Object(map) => value = map.get(part)?,
            Value::Array(arr) => {
                let index = part.parse::<usize>().ok()?;
                value = arr.get(index)?;
            }
            _ => return None,
        }
    }
    Some(value)
}

/// Set a value at a nested path with dot notation support
///
/// Missing intermediate levels are created as empty objects. Walking into a
/// scalar fails, as does an array segment that is not an in-bounds index.
///
/// ```
/// use serde_json::json;
/// use songodb_core::value_utils::set_nested_value;
///
/// let mut doc = json!({"name": "Alice"});
/// set_nested_value(&mut doc, "address.city", json!("NYC")).unwrap();
/// assert_eq!(doc["address"]["city"], "NYC");
/// ```
pub fn set_nested_value(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let parts: Vec<&str> = path.split('.').collect();
    let invalid = || SongoError::InvalidArgument(format!("Invalid field path '{}'", path));
    if parts.iter().any(|p| p.is_empty()) {
        return Err(invalid());
    }

    let (last, parents) = parts.split_last().ok_or_else(invalid)?;
    let mut current = doc;
    for part in parents {
        current = match current {
            Value::Object(map) => map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(arr) => {
                let index = array_index(part, arr.len(), path)?;
                &mut arr[index]
            }
            other => return Err(cannot_create(path, part, other)),
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(arr) => {
            let index = array_index(last, arr.len(), path)?;
            arr[index] = value;
            Ok(())
        }
        other => Err(cannot_create(path, last, other)),
    }
}

fn array_index(part: &str, len: usize, path: &str) -> Result<usize> {
    match part.parse::<usize>() {
        Ok(index) if index < len => Ok(index),
        _ => Err(SongoError::InvalidArgument(format!(
            "Cannot address array element '{}' in path '{}'",
            part, path
        ))),
    }
}

fn cannot_create(path: &str, part: &str, parent: &Value) -> SongoError {
    SongoError::InvalidArgument(format!(
        "Cannot create field '{}' of path '{}' in element {}",
        part, path, parent
    ))
}

/// Remove the value at a nested path, returning it. Missing paths are a no-op.
pub fn remove_nested_value(doc: &mut Value, path: &str) -> Option<Value> {
    let (parent_path, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, path),
    };

    let parent = match parent_path {
        None => doc,
        Some(parent_path) => get_nested_value_mut(doc, parent_path)?,
    };

    match parent {
        Value::Object(map) => map.shift_remove(last),
        // Arrays keep their length; the slot becomes null
        Value::Array(arr) => {
            let index = last.parse::<usize>().ok()?;
            let slot = arr.get_mut(index)?;
            Some(std::mem::replace(slot, Value::Null))
        }
        _ => None,
    }
}

fn get_nested_value_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut value = doc;
    for part in path.split('.') {
        value = match value {
            Value::Object(map) => map.get_mut(part)?,
            Value::Array(arr) => arr.get_mut(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Deep equality where numbers compare by value (`2 == 2.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => numbers_equal(n1, n2),
        (Value::Array(a1), Value::Array(a2)) => {
            a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(m1), Value::Object(m2)) => {
            m1.len() == m2.len()
                && m1
                    .iter()
                    .all(|(k, v)| m2.get(k).map(|other| values_equal(v, other)).unwrap_or(false))
        }
        _ => a == b,
    }
}

fn numbers_equal(n1: &Number, n2: &Number) -> bool {
    match (n1.as_i64(), n2.as_i64()) {
        (Some(i1), Some(i2)) => i1 == i2,
        _ => n1.as_f64() == n2.as_f64(),
    }
}

/// Compare two JSON values of the same kind
///
/// Returns `Some(Ordering)` for comparable types (numbers, strings, booleans),
/// `None` for incompatible types (e.g., comparing string to number).
///
/// ```
/// use serde_json::json;
/// use std::cmp::Ordering;
/// use songodb_core::value_utils::compare_values;
///
/// assert_eq!(compare_values(&json!(10), &json!(5)), Some(Ordering::Greater));
/// assert_eq!(compare_values(&json!("a"), &json!("b")), Some(Ordering::Less));
/// assert_eq!(compare_values(&json!("a"), &json!(1)), None); // incompatible
/// ```
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => {
            if let (Some(i1), Some(i2)) = (n1.as_i64(), n2.as_i64()) {
                return Some(i1.cmp(&i2));
            }
            n1.as_f64()?.partial_cmp(&n2.as_f64()?)
        }
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        _ => None,
    }
}

/// Total order used for sorting
///
/// Missing values and `null` are the same logical value and order first.
/// Values of different kinds order by type: null < number < string < object
/// < array < bool.
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(av), Some(bv)) => compare_present(av, bv),
    }
}

fn compare_present(a: &Value, b: &Value) -> Ordering {
    if let Some(ordering) = compare_values(a, b) {
        return ordering;
    }

    match (a, b) {
        (Value::Array(a1), Value::Array(a2)) => {
            for (x, y) in a1.iter().zip(a2) {
                let ordering = compare_for_sort(Some(x), Some(y));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a1.len().cmp(&a2.len())
        }
        (Value::Object(m1), Value::Object(m2)) => {
            for ((k1, v1), (k2, v2)) in m1.iter().zip(m2) {
                let ordering = k1
                    .cmp(k2)
                    .then_with(|| compare_for_sort(Some(v1), Some(v2)));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            m1.len().cmp(&m2.len())
        }
        _ => type_priority(a).cmp(&type_priority(b)),
    }
}

/// Get type priority for mixed-type sorting
fn type_priority(val: &Value) -> u8 {
    match val {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}
