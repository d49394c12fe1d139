// src/document.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::{Result, SongoError};

/// Name of the identifier field every stored document carries
pub const ID_FIELD: &str = "_id";

/// Document identifier
///
/// Untagged so it appears as a bare value inside documents: `{"_id": 2}` or
/// `{"_id": "6f1c..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum DocumentId {
    Int(i64),
    String(String),
}

impl DocumentId {
    /// Fresh globally-unique id (UUID v4)
    pub fn generate() -> Self {
        DocumentId::String(Uuid::new_v4().to_string())
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(DocumentId::String(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => n
                .as_i64()
                .map(DocumentId::Int)
                .ok_or_else(|| SongoError::InvalidArgument(format!("_id {} is out of range", n))),
            other => Err(SongoError::InvalidArgument(format!(
                "_id must be a string or an integer, got {}",
                other
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            DocumentId::Int(i) => Value::from(*i),
            DocumentId::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(i) => write!(f, "{}", i),
            DocumentId::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId::String(s.to_string())
    }
}

/// A stored document: a JSON object with an `_id` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Wrap a JSON value; anything other than an object is rejected
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Document { fields }),
            other => Err(SongoError::InvalidArgument(format!(
                "Document must be an object, got {}",
                other
            ))),
        }
    }

    pub fn id(&self) -> Result<Option<DocumentId>> {
        self.fields.get(ID_FIELD).map(DocumentId::from_value).transpose()
    }

    /// Return the document's id, generating and storing one if it has none
    pub fn ensure_id(&mut self) -> Result<DocumentId> {
        match self.id()? {
            Some(id) => Ok(id),
            None => {
                let id = DocumentId::generate();
                self.fields.insert(ID_FIELD.to_string(), id.to_value());
                Ok(id)
            }
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
