// storage/traits.rs
//! Object-store abstraction consumed by the engine
//!
//! The engine never touches files or the network directly. Everything it
//! needs from a backend is the small capability set below: single-key
//! get/put/delete, batched put/delete, paginated prefix listing and an
//! exhaustive prefix delete.
//!
//! # Architecture
//!
//! ```text
//! ObjectStore trait (unified interface)
//!   ├── FileObjectStore (JSON files under a root directory)
//!   └── MemoryStore (testing, in-memory BTreeMap)
//! ```

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, SongoError};

/// Bounds one listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub page_size: usize,
    pub continuation_token: Option<String>,
}

impl ListRequest {
    pub fn new(page_size: usize) -> Self {
        ListRequest {
            page_size,
            continuation_token: None,
        }
    }

    pub fn after(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }
}

/// One stored object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub key: String,
    pub body: Value,
}

/// One page of a prefix listing
///
/// `entries` never holds more than `page_size` objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    pub truncated: bool,
    pub key_count: usize,
    pub page_size: usize,
    pub next_continuation_token: Option<String>,
}

/// One page of distinct child names directly under a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixPage {
    pub names: Vec<String>,
    pub truncated: bool,
    pub key_count: usize,
    pub page_size: usize,
    pub next_continuation_token: Option<String>,
}

/// A per-key failure inside a batch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectError {
    pub key: String,
    pub message: String,
}

impl ObjectError {
    pub fn new(key: impl Into<String>, error: &SongoError) -> Self {
        ObjectError {
            key: key.into(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    pub written: Vec<String>,
    pub errors: Vec<ObjectError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<ObjectError>,
}

impl DeleteOutcome {
    pub fn merge(&mut self, other: DeleteOutcome) {
        self.deleted.extend(other.deleted);
        self.errors.extend(other.errors);
    }
}

/// Core storage abstraction
///
/// A malformed key fails with `SongoError::InvalidNamespace`; every other
/// backend failure is `SongoError::Storage` or `SongoError::Io`.
pub trait ObjectStore: Send + Sync {
    // ========================================================================
    // SINGLE-KEY OPERATIONS
    // ========================================================================

    /// Read one object, `None` when the key does not exist
    fn get_one(&self, key: &str) -> impl Future<Output = Result<Option<Value>>> + Send;

    /// Unconditional overwrite
    fn put_one(&self, key: &str, body: &Value) -> impl Future<Output = Result<()>> + Send;

    /// Delete one key; a missing key yields an empty `deleted` list
    fn delete_one(&self, key: &str) -> impl Future<Output = Result<DeleteOutcome>> + Send;

    // ========================================================================
    // BATCH OPERATIONS
    // ========================================================================

    /// Write many objects; per-key failures are reported, not raised
    fn put_multiple(
        &self,
        entries: Vec<(String, Value)>,
    ) -> impl Future<Output = Result<PutOutcome>> + Send;

    /// Delete many keys; per-key failures are reported, not raised
    fn delete_multiple(&self, keys: &[String]) -> impl Future<Output = Result<DeleteOutcome>> + Send;

    // ========================================================================
    // LISTING
    // ========================================================================

    /// One bounded page of objects whose key starts with `prefix`, in key order
    fn list_prefix(
        &self,
        prefix: &str,
        request: &ListRequest,
    ) -> impl Future<Output = Result<ListPage>> + Send;

    /// One bounded page of the distinct path segments that follow `prefix`
    fn list_common_prefixes(
        &self,
        prefix: &str,
        request: &ListRequest,
    ) -> impl Future<Output = Result<PrefixPage>> + Send;

    /// Delete every object under `prefix`, across as many pages as needed
    fn delete_prefix(&self, prefix: &str) -> impl Future<Output = Result<DeleteOutcome>> + Send {
        async move {
            let mut outcome = DeleteOutcome::default();
            let mut request = ListRequest::new(DELETE_PAGE_SIZE);
            loop {
                let page = self.list_prefix(prefix, &request).await?;
                let keys: Vec<String> = page.entries.into_iter().map(|e| e.key).collect();
                if !keys.is_empty() {
                    outcome.merge(self.delete_multiple(&keys).await?);
                }
                if !page.truncated {
                    break;
                }
                match page.next_continuation_token {
                    Some(token) => request = request.after(Some(token)),
                    None => break,
                }
            }
            Ok(outcome)
        }
    }
}

/// Page size used by `delete_prefix`
pub const DELETE_PAGE_SIZE: usize = 1000;

/// Reject keys no backend can address
///
/// A key is a `/`-separated path of non-empty segments; `.` and `..` and
/// the characters `\` and NUL are not allowed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SongoError::InvalidNamespace("empty key".to_string()));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(SongoError::InvalidNamespace(format!("invalid key: {}", key)));
        }
        if segment.contains(['\\', '\0']) {
            return Err(SongoError::InvalidNamespace(format!("invalid key: {}", key)));
        }
    }
    Ok(())
}
