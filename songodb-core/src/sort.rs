// src/sort.rs
//! Multi-key sort specifications
//!
//! Accepts the driver format `[["a", 1], ["b", -1]]` as well as the
//! object form `{"a": 1, "b": -1}` (key order is preserved).

use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::{Result, SongoError};
use crate::value_utils::{compare_for_sort, get_nested_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) if n.as_i64() == Some(1) => Ok(SortDirection::Ascending),
            Value::Number(n) if n.as_i64() == Some(-1) => Ok(SortDirection::Descending),
            Value::String(s) => match s.to_lowercase().as_str() {
                "asc" | "ascending" => Ok(SortDirection::Ascending),
                "desc" | "descending" => Ok(SortDirection::Descending),
                _ => Err(invalid_direction(value)),
            },
            _ => Err(invalid_direction(value)),
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

fn invalid_direction(value: &Value) -> SongoError {
    SongoError::InvalidArgument(format!(
        "Sort direction must be 1, -1, \"asc\" or \"desc\", got {}",
        value
    ))
}

/// Ordered (field path, direction) pairs; earlier pairs take precedence
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "Value")]
pub struct SortSpec {
    keys: Vec<(String, SortDirection)>,
}

impl SortSpec {
    pub fn new(keys: Vec<(String, SortDirection)>) -> Self {
        SortSpec { keys }
    }

    pub fn ascending(field: &str) -> Self {
        SortSpec::new(vec![(field.to_string(), SortDirection::Ascending)])
    }

    pub fn then(mut self, field: &str, direction: SortDirection) -> Self {
        self.keys.push((field.to_string(), direction));
        self
    }

    pub fn from_json(json: &Value) -> Result<Self> {
        let keys = match json {
            Value::Array(pairs) => pairs
                .iter()
                .map(|pair| match pair.as_array().map(Vec::as_slice) {
                    Some([Value::String(field), direction]) => {
                        Ok((field.clone(), SortDirection::parse(direction)?))
                    }
                    _ => Err(SongoError::InvalidArgument(format!(
                        "Sort entries must be [field, direction] pairs, got {}",
                        pair
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            Value::Object(map) => map
                .iter()
                .map(|(field, direction)| Ok((field.clone(), SortDirection::parse(direction)?)))
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(SongoError::InvalidArgument(format!(
                    "Sort must be an array of pairs or an object, got {}",
                    other
                )))
            }
        };
        Ok(SortSpec { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compare two documents; absent and `null` fields are the same value and
    /// come first ascending, last descending
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (field, direction) in &self.keys {
            let ordering = compare_for_sort(get_nested_value(a, field), get_nested_value(b, field));
            if ordering != Ordering::Equal {
                return direction.apply(ordering);
            }
        }
        Ordering::Equal
    }

    pub fn comparator(&self) -> impl Fn(&Value, &Value) -> Ordering + '_ {
        move |a: &Value, b: &Value| self.compare(a, b)
    }

    /// Stable in-place sort
    pub fn sort(&self, docs: &mut [Value]) {
        if self.is_empty() {
            return;
        }
        docs.sort_by(self.comparator());
    }
}

impl TryFrom<Value> for SortSpec {
    type Error = SongoError;

    fn try_from(value: Value) -> Result<Self> {
        SortSpec::from_json(&value)
    }
}
