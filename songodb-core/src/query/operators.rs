// src/query/operators.rs
//! Query operator definitions and matching
//!
//! A JSON filter is parsed once into a closed `Filter` tree. Every operator
//! family is a variant, so dispatch is an exhaustive `match` and an
//! unrecognised `$operator` is rejected at parse time with `InvalidArgument`.
//!
//! ```text
//! Filter
//!   ├── And / Or / Nor / Not          (logical: $and, $or, $nor, $not)
//!   └── Field { path, predicates }
//!         └── FieldPredicate
//!               ├── comparison        ($eq, $ne, $gt, $gte, $lt, $lte)
//!               ├── membership        ($in, $nin, $all)
//!               ├── element / array   ($exists, $size, $elemMatch)
//!               ├── evaluation        ($regex + $options)
//!               └── Not               (field-level $not)
//! ```
//!
//! Adding an operator means adding a variant, one parse arm and one match
//! arm; callers only ever see `Filter::parse` and `Filter::matches`.

use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{Result, SongoError};
use crate::value_utils::{compare_values, get_nested_value, values_equal};

/// Parsed query filter
#[derive(Debug, Clone)]
pub enum Filter {
    /// All clauses must match. The empty conjunction matches every document.
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Field {
        path: String,
        predicates: Vec<FieldPredicate>,
    },
}

/// Condition applied to the value found at a field path
#[derive(Debug, Clone)]
pub enum FieldPredicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    All(Vec<Value>),
    Exists(bool),
    Size(usize),
    Regex(Regex),
    ElemMatch(ElemMatch),
    Not(Vec<FieldPredicate>),
}

/// `$elemMatch` either queries sub-documents or applies operators to scalars
#[derive(Debug, Clone)]
pub enum ElemMatch {
    Document(Box<Filter>),
    Value(Vec<FieldPredicate>),
}

impl Filter {
    /// Filter matching every document
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    /// Parse a JSON filter. `null` and `{}` both match everything.
    pub fn parse(json: &Value) -> Result<Self> {
        match json {
            Value::Null => Ok(Filter::all()),
            Value::Object(map) => parse_clauses(map),
            other => Err(SongoError::InvalidArgument(format!(
                "Filter must be an object, got {}",
                other
            ))),
        }
    }

    pub fn matches_all(&self) -> bool {
        matches!(self, Filter::And(clauses) if clauses.is_empty())
    }

    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|f| f.matches(document)),
            Filter::Or(clauses) => clauses.iter().any(|f| f.matches(document)),
            Filter::Nor(clauses) => !clauses.iter().any(|f| f.matches(document)),
            Filter::Not(inner) => !inner.matches(document),
            Filter::Field { path, predicates } => {
                let value = get_nested_value(document, path);
                predicates.iter().all(|p| p.matches(value))
            }
        }
    }
}

impl FieldPredicate {
    /// `value` is `None` when the field is absent from the document
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            FieldPredicate::Eq(expected) => equals(value, expected),
            FieldPredicate::Ne(expected) => !equals(value, expected),
            FieldPredicate::Gt(bound) => compare(value, bound, |o| o == Ordering::Greater),
            FieldPredicate::Gte(bound) => compare(value, bound, |o| o != Ordering::Less),
            FieldPredicate::Lt(bound) => compare(value, bound, |o| o == Ordering::Less),
            FieldPredicate::Lte(bound) => compare(value, bound, |o| o != Ordering::Greater),
            FieldPredicate::In(candidates) => candidates.iter().any(|c| equals(value, c)),
            FieldPredicate::Nin(candidates) => !candidates.iter().any(|c| equals(value, c)),
            FieldPredicate::All(required) => {
                !required.is_empty() && required.iter().all(|r| equals(value, r))
            }
            FieldPredicate::Exists(expected) => value.is_some() == *expected,
            FieldPredicate::Size(len) => matches!(value, Some(Value::Array(arr)) if arr.len() == *len),
            FieldPredicate::Regex(re) => match value {
                Some(Value::String(s)) => re.is_match(s),
                Some(Value::Array(arr)) => arr
                    .iter()
                    .any(|v| v.as_str().map(|s| re.is_match(s)).unwrap_or(false)),
                _ => false,
            },
            FieldPredicate::ElemMatch(elem) => match value {
                Some(Value::Array(arr)) => arr.iter().any(|el| elem.matches(el)),
                _ => false,
            },
            FieldPredicate::Not(inner) => !inner.iter().all(|p| p.matches(value)),
        }
    }
}

impl ElemMatch {
    fn matches(&self, element: &Value) -> bool {
        match self {
            ElemMatch::Document(filter) => element.is_object() && filter.matches(element),
            ElemMatch::Value(predicates) => predicates.iter().all(|p| p.matches(Some(element))),
        }
    }
}

/// Equality with array-element and missing-as-null semantics
fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(v) if values_equal(v, expected) => true,
        Some(Value::Array(arr)) => arr.iter().any(|el| values_equal(el, expected)),
        Some(_) => false,
    }
}

/// Ordered comparison; values of different kinds never match
fn compare<F>(value: Option<&Value>, bound: &Value, accept: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    match value {
        Some(Value::Array(arr)) => arr
            .iter()
            .any(|el| compare_values(el, bound).map(&accept).unwrap_or(false)),
        Some(v) => compare_values(v, bound).map(accept).unwrap_or(false),
        None => false,
    }
}

// ============================================================================
// PARSING
// ============================================================================

fn parse_clauses(map: &Map<String, Value>) -> Result<Filter> {
    let mut clauses = map
        .iter()
        .map(|(key, value)| parse_clause(key, value))
        .collect::<Result<Vec<_>>>()?;

    if clauses.len() == 1 {
        Ok(clauses.remove(0))
    } else {
        Ok(Filter::And(clauses))
    }
}

fn parse_clause(key: &str, value: &Value) -> Result<Filter> {
    match key {
        "$and" => Ok(Filter::And(parse_filter_list(key, value)?)),
        "$or" => Ok(Filter::Or(parse_filter_list(key, value)?)),
        "$nor" => Ok(Filter::Nor(parse_filter_list(key, value)?)),
        "$not" => Ok(Filter::Not(Box::new(Filter::parse(value)?))),
        op if op.starts_with('$') => Err(unknown_operator(op)),
        path => Ok(Filter::Field {
            path: path.to_string(),
            predicates: parse_condition(value)?,
        }),
    }
}

fn parse_filter_list(op: &str, value: &Value) -> Result<Vec<Filter>> {
    match value {
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => parse_clauses(map),
                other => Err(SongoError::InvalidArgument(format!(
                    "{} entries must be objects, got {}",
                    op, other
                ))),
            })
            .collect(),
        _ => Err(SongoError::InvalidArgument(format!(
            "{} requires a non-empty array",
            op
        ))),
    }
}

/// `{ "$gt": 1 }` is an operator expression; `{ "a": 1 }` is a literal sub-document
fn is_operator_object(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.keys().next().map(|k| k.starts_with('$')).unwrap_or(false),
        _ => false,
    }
}

fn parse_condition(value: &Value) -> Result<Vec<FieldPredicate>> {
    match value {
        Value::Object(map) if is_operator_object(value) => parse_operators(map),
        literal => Ok(vec![FieldPredicate::Eq(literal.clone())]),
    }
}

fn parse_operators(map: &Map<String, Value>) -> Result<Vec<FieldPredicate>> {
    let options = match map.get("$options") {
        None => "",
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(SongoError::InvalidArgument(format!(
                "$options must be a string, got {}",
                other
            )))
        }
    };

    let mut predicates = Vec::with_capacity(map.len());
    for (op, operand) in map {
        let predicate = match op.as_str() {
            "$eq" => FieldPredicate::Eq(operand.clone()),
            "$ne" => FieldPredicate::Ne(operand.clone()),
            "$gt" => FieldPredicate::Gt(operand.clone()),
            "$gte" => FieldPredicate::Gte(operand.clone()),
            "$lt" => FieldPredicate::Lt(operand.clone()),
            "$lte" => FieldPredicate::Lte(operand.clone()),
            "$in" => FieldPredicate::In(array_operand(op, operand)?),
            "$nin" => FieldPredicate::Nin(array_operand(op, operand)?),
            "$all" => FieldPredicate::All(array_operand(op, operand)?),
            "$exists" => FieldPredicate::Exists(truthy(operand)),
            "$size" => FieldPredicate::Size(
                operand
                    .as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| invalid_operand(op, "a non-negative integer", operand))?,
            ),
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| invalid_operand(op, "a string pattern", operand))?;
                FieldPredicate::Regex(compile_regex(pattern, options)?)
            }
            "$options" => {
                if !map.contains_key("$regex") {
                    return Err(SongoError::InvalidArgument(
                        "$options requires $regex".to_string(),
                    ));
                }
                continue;
            }
            "$elemMatch" => FieldPredicate::ElemMatch(parse_elem_match(operand)?),
            "$not" => match operand {
                Value::Object(inner) if is_operator_object(operand) => {
                    FieldPredicate::Not(parse_operators(inner)?)
                }
                other => return Err(invalid_operand(op, "an operator expression", other)),
            },
            other => return Err(unknown_operator(other)),
        };
        predicates.push(predicate);
    }
    Ok(predicates)
}

fn parse_elem_match(operand: &Value) -> Result<ElemMatch> {
    match operand {
        Value::Object(map) if is_operator_object(operand) => {
            // Logical operators query sub-documents; the rest apply to the element
            if map.keys().all(|k| matches!(k.as_str(), "$and" | "$or" | "$nor")) {
                Ok(ElemMatch::Document(Box::new(parse_clauses(map)?)))
            } else {
                Ok(ElemMatch::Value(parse_operators(map)?))
            }
        }
        Value::Object(map) => Ok(ElemMatch::Document(Box::new(parse_clauses(map)?))),
        other => Err(invalid_operand("$elemMatch", "an object", other)),
    }
}

fn array_operand(op: &str, operand: &Value) -> Result<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| invalid_operand(op, "an array", operand))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Null => false,
        _ => true,
    }
}

/// Build a regex honouring the `i`, `m`, `s` and `x` flags
fn compile_regex(pattern: &str, options: &str) -> Result<Regex> {
    let flags: String = options
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();

    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };

    Regex::new(&source).map_err(|e| {
        SongoError::InvalidArgument(format!("Invalid regex pattern '{}': {}", pattern, e))
    })
}

fn unknown_operator(op: &str) -> SongoError {
    SongoError::InvalidArgument(format!("Unknown operator: {}", op))
}

fn invalid_operand(op: &str, expected: &str, got: &Value) -> SongoError {
    SongoError::InvalidArgument(format!("{} requires {}, got {}", op, expected, got))
}
