// src/namespace.rs
//! Collection namespaces and the storage keys derived from them
//!
//! A collection `instance/database/collection` owns every object whose key
//! starts with `instance/database/collection/`. There is no separate metadata
//! object: a collection exists as long as one key lives under its prefix.

use std::fmt;

use crate::document::DocumentId;
use crate::error::{Result, SongoError};

const MAX_SEGMENT_LEN: usize = 255;

/// Validate one path segment (instance, database, collection or document id)
pub fn validate_segment(kind: &str, segment: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(SongoError::InvalidNamespace(format!(
            "{} name '{}' {}",
            kind, segment, reason
        )))
    };

    if segment.is_empty() {
        return reject("must not be empty");
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return reject("is too long");
    }
    if segment == "." || segment == ".." {
        return reject("is reserved");
    }
    if segment.starts_with('$') {
        return reject("must not start with '$'");
    }
    if segment.contains(['/', '\\', '\0']) {
        return reject("contains an illegal character");
    }
    Ok(())
}

/// Three-level collection path: instance / database / collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    instance: String,
    database: String,
    collection: String,
}

impl Namespace {
    pub fn new(
        instance: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self> {
        let namespace = Namespace {
            instance: instance.into(),
            database: database.into(),
            collection: collection.into(),
        };
        validate_segment("Instance", &namespace.instance)?;
        validate_segment("Database", &namespace.database)?;
        validate_segment("Collection", &namespace.collection)?;
        Ok(namespace)
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Storage prefix shared by every document of the collection
    pub fn prefix(&self) -> String {
        format!("{}/{}/{}/", self.instance, self.database, self.collection)
    }

    /// Storage key of one document: `prefix + _id`
    pub fn key_for(&self, id: &DocumentId) -> Result<String> {
        let segment = id.to_string();
        validate_segment("Document id", &segment)?;
        Ok(format!("{}{}", self.prefix(), segment))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.instance, self.database, self.collection)
    }
}
