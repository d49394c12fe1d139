// src/update.rs
//! Update operator engine
//!
//! `UpdateSpec::apply` never touches its input: it deep-copies the document,
//! applies every `(operator, path, operand)` triple in order and hands
//! back the candidate value. Callers compare candidate and original to decide
//! whether anything needs to be written.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

use crate::document::ID_FIELD;
use crate::error::{Result, SongoError};
use crate::value_utils::{
    compare_values, get_nested_value, remove_nested_value, set_nested_value, values_equal,
};

/// Supported update operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Set,
    SetOnInsert,
    Unset,
    Inc,
    Mul,
    Min,
    Max,
    Rename,
    CurrentDate,
}

impl UpdateOperator {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "$set" => Ok(UpdateOperator::Set),
            "$setOnInsert" => Ok(UpdateOperator::SetOnInsert),
            "$unset" => Ok(UpdateOperator::Unset),
            "$inc" => Ok(UpdateOperator::Inc),
            "$mul" => Ok(UpdateOperator::Mul),
            "$min" => Ok(UpdateOperator::Min),
            "$max" => Ok(UpdateOperator::Max),
            "$rename" => Ok(UpdateOperator::Rename),
            "$currentDate" => Ok(UpdateOperator::CurrentDate),
            other => Err(SongoError::UnknownModifier(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UpdateOperator::Set => "$set",
            UpdateOperator::SetOnInsert => "$setOnInsert",
            UpdateOperator::Unset => "$unset",
            UpdateOperator::Inc => "$inc",
            UpdateOperator::Mul => "$mul",
            UpdateOperator::Min => "$min",
            UpdateOperator::Max => "$max",
            UpdateOperator::Rename => "$rename",
            UpdateOperator::CurrentDate => "$currentDate",
        }
    }
}

#[derive(Debug, Clone)]
struct UpdateClause {
    operator: UpdateOperator,
    operands: Vec<(String, Value)>,
}

/// Parsed update specification: `{ "$op": { "path": operand, ... }, ... }`
#[derive(Debug, Clone)]
pub struct UpdateSpec {
    clauses: Vec<UpdateClause>,
}

impl UpdateSpec {
    pub fn from_json(json: &Value) -> Result<Self> {
        let map = json.as_object().ok_or_else(|| {
            SongoError::InvalidArgument(format!("Update must be an object, got {}", json))
        })?;

        let mut clauses = Vec::with_capacity(map.len());
        for (name, fields) in map {
            let operator = UpdateOperator::parse(name)?;
            let fields = fields.as_object().ok_or_else(|| {
                SongoError::InvalidArgument(format!(
                    "{} requires an object of field paths, got {}",
                    name, fields
                ))
            })?;
            clauses.push(UpdateClause {
                operator,
                operands: fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            });
        }

        Ok(UpdateSpec { clauses })
    }

    /// `{ "$set": replacement }`, used to build upserted replacements
    pub fn set_all(replacement: &Map<String, Value>) -> Self {
        UpdateSpec {
            clauses: vec![UpdateClause {
                operator: UpdateOperator::Set,
                operands: replacement
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            }],
        }
    }

    /// Apply to an existing document
    pub fn apply(&self, document: &Value) -> Result<Value> {
        self.apply_with(document, false)
    }

    /// Apply while building a document for an upsert (enables `$setOnInsert`)
    pub fn apply_for_upsert(&self, document: &Value) -> Result<Value> {
        self.apply_with(document, true)
    }

    fn apply_with(&self, document: &Value, inserting: bool) -> Result<Value> {
        let mut next = document.clone();
        for clause in &self.clauses {
            for (path, operand) in &clause.operands {
                apply_operator(&mut next, clause.operator, path, operand, inserting)?;
            }
        }
        check_id_unchanged(document, &next)?;
        Ok(next)
    }
}

/// Parse and apply in one step
pub fn apply_update(document: &Value, update: &Value) -> Result<Value> {
    UpdateSpec::from_json(update)?.apply(document)
}

fn apply_operator(
    doc: &mut Value,
    operator: UpdateOperator,
    path: &str,
    operand: &Value,
    inserting: bool,
) -> Result<()> {
    match operator {
        UpdateOperator::Set => set_nested_value(doc, path, operand.clone()),
        UpdateOperator::SetOnInsert if inserting => set_nested_value(doc, path, operand.clone()),
        UpdateOperator::SetOnInsert => Ok(()),
        UpdateOperator::Unset => {
            remove_nested_value(doc, path);
            Ok(())
        }
        UpdateOperator::Inc => arithmetic(doc, operator, path, operand, i64::checked_add, |a, b| a + b),
        UpdateOperator::Mul => arithmetic(doc, operator, path, operand, i64::checked_mul, |a, b| a * b),
        UpdateOperator::Min => replace_if(doc, path, operand, Ordering::Less),
        UpdateOperator::Max => replace_if(doc, path, operand, Ordering::Greater),
        UpdateOperator::Rename => rename(doc, path, operand),
        UpdateOperator::CurrentDate => set_nested_value(doc, path, current_date(path, operand)?),
    }
}

/// `$inc` / `$mul`: a missing (or null) field counts as 0
///
/// Integer arithmetic stays integral unless it overflows, then falls back to f64.
fn arithmetic(
    doc: &mut Value,
    operator: UpdateOperator,
    path: &str,
    operand: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<()> {
    let amount = match operand {
        Value::Number(n) => n,
        other => {
            return Err(SongoError::InvalidArgument(format!(
                "{} requires a numeric operand for '{}', got {}",
                operator.name(),
                path,
                other
            )))
        }
    };

    let current = match get_nested_value(doc, path) {
        None | Some(Value::Null) => Number::from(0),
        Some(Value::Number(n)) => n.clone(),
        Some(_) => {
            return Err(SongoError::TypeMismatch {
                operator: operator.name(),
                path: path.to_string(),
            })
        }
    };

    let integral = match (current.as_i64(), amount.as_i64()) {
        (Some(a), Some(b)) => int_op(a, b).map(Value::from),
        _ => None,
    };
    let result = match integral {
        Some(v) => v,
        None => current
            .as_f64()
            .zip(amount.as_f64())
            .and_then(|(a, b)| Number::from_f64(float_op(a, b)))
            .map(Value::Number)
            .ok_or_else(|| {
                SongoError::InvalidArgument(format!(
                    "{} on '{}' does not produce a finite number",
                    operator.name(),
                    path
                ))
            })?,
    };

    set_nested_value(doc, path, result)
}

/// `$min` / `$max` only act on fields that already exist
fn replace_if(doc: &mut Value, path: &str, operand: &Value, wanted: Ordering) -> Result<()> {
    let replace = get_nested_value(doc, path)
        .and_then(|current| compare_values(operand, current))
        .map(|ordering| ordering == wanted)
        .unwrap_or(false);

    if replace {
        set_nested_value(doc, path, operand.clone())?;
    }
    Ok(())
}

fn rename(doc: &mut Value, path: &str, operand: &Value) -> Result<()> {
    let target = operand.as_str().ok_or_else(|| {
        SongoError::InvalidArgument(format!(
            "$rename target for '{}' must be a string, got {}",
            path, operand
        ))
    })?;

    if target == path {
        return Ok(());
    }
    match remove_nested_value(doc, path) {
        Some(value) => set_nested_value(doc, target, value),
        None => Ok(()),
    }
}

fn current_date(path: &str, operand: &Value) -> Result<Value> {
    let now = Utc::now();
    let kind = match operand {
        Value::Bool(_) => "date",
        Value::Object(spec) => spec.get("$type").and_then(Value::as_str).unwrap_or(""),
        _ => "",
    };

    match kind {
        "date" => Ok(Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))),
        "timestamp" => Ok(Value::from(now.timestamp_millis())),
        _ => Err(SongoError::InvalidArgument(format!(
            "$currentDate for '{}' requires true or {{\"$type\": \"date\"|\"timestamp\"}}, got {}",
            path, operand
        ))),
    }
}

fn check_id_unchanged(before: &Value, after: &Value) -> Result<()> {
    let Some(original) = before.get(ID_FIELD) else {
        return Ok(());
    };
    match after.get(ID_FIELD) {
        Some(current) if values_equal(current, original) => Ok(()),
        _ => Err(SongoError::InvalidArgument(
            "Performing an update on the path '_id' would modify the immutable field '_id'"
                .to_string(),
        )),
    }
}
