// songodb-core/src/find_options.rs
// Per-operation options: page bounds, sort, skip, limit, upsert
//
// Every option the engine recognises is a field here, with its default. The
// serde field names are the wire names; `MaxKeys` / `ContinuationToken` are
// accepted as aliases.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SongoError};
use crate::sort::SortSpec;

/// Default page bound for reads, deletes and updates
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default page bound for database / collection listings
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_list_page_size() -> usize {
    DEFAULT_LIST_PAGE_SIZE
}

/// Bounds one prefix scan
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOptions {
    #[serde(default = "default_page_size", alias = "MaxKeys")]
    pub page_size: usize,

    /// Resume after a previous truncated page
    #[serde(default, alias = "ContinuationToken")]
    pub continuation_token: Option<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            page_size: DEFAULT_PAGE_SIZE,
            continuation_token: None,
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    pub fn from_json(json: &Value) -> Result<Self> {
        parse_options(json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SongoError::InvalidArgument(
                "pageSize must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options for find queries
///
/// Sort, skip and limit are applied to the documents of the single scanned
/// page, never across pages. Callers wanting the whole result set iterate with
/// the continuation token reported in the explain record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOptions {
    #[serde(flatten)]
    pub scan: ScanOptions,

    /// Sort: [(field, direction)]
    pub sort: Option<SortSpec>,

    /// Skip: number of documents to skip; 0 skips nothing
    pub skip: Option<usize>,

    /// Limit: maximum number of documents to return; 0 means no limit
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn from_json(json: &Value) -> Result<Self> {
        parse_options(json)
    }
}

/// Options for `update_many` and `replace_one`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateOptions {
    #[serde(flatten)]
    pub scan: ScanOptions,

    /// Insert a new document when nothing matches
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    pub fn with_scan(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn from_json(json: &Value) -> Result<Self> {
        parse_options(json)
    }
}

/// Options for database and collection listings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    #[serde(default = "default_list_page_size", alias = "MaxKeys")]
    pub page_size: usize,

    #[serde(default, alias = "ContinuationToken")]
    pub continuation_token: Option<String>,

    /// Return bare names instead of `{ "name": ... }` documents
    #[serde(default)]
    pub name_only: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            page_size: DEFAULT_LIST_PAGE_SIZE,
            continuation_token: None,
            name_only: false,
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names_only(mut self) -> Self {
        self.name_only = true;
        self
    }

    pub fn from_json(json: &Value) -> Result<Self> {
        parse_options(json)
    }

    pub(crate) fn scan(&self) -> ScanOptions {
        ScanOptions {
            page_size: self.page_size,
            continuation_token: self.continuation_token.clone(),
        }
    }
}

/// `null` means "all defaults"
fn parse_options<T>(json: &Value) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if json.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(json.clone())
        .map_err(|e| SongoError::InvalidArgument(format!("Invalid options: {}", e)))
}

/// Apply skip and limit to one page of documents
pub fn apply_limit_skip(docs: Vec<Value>, limit: Option<usize>, skip: Option<usize>) -> Vec<Value> {
    let skip_count = skip.unwrap_or(0);
    let limit_count = limit.filter(|&l| l > 0).unwrap_or(usize::MAX);
    docs.into_iter().skip(skip_count).take(limit_count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::SortDirection;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = FindOptions::from_json(&Value::Null).unwrap();
        assert_eq!(options.scan.page_size, DEFAULT_PAGE_SIZE);
        assert!(options.sort.is_none());
        assert_eq!(ListOptions::default().page_size, DEFAULT_LIST_PAGE_SIZE);
        assert!(!UpdateOptions::default().upsert);
    }

    #[test]
    fn test_parse_find_options() {
        let options = FindOptions::from_json(&json!({
            "pageSize": 10,
            "continuationToken": "abc",
            "sort": [["first", 1], ["age", -1]],
            "skip": 2,
            "limit": 5
        }))
        .unwrap();
        assert_eq!(options.scan, ScanOptions::new().with_page_size(10).with_continuation_token("abc"));
        assert_eq!(
            options.sort,
            Some(SortSpec::ascending("first").then("age", SortDirection::Descending))
        );
        assert_eq!(options.skip, Some(2));
        assert_eq!(options.limit, Some(5));
    }

    #[test]
    fn test_wire_aliases() {
        let options = UpdateOptions::from_json(&json!({"MaxKeys": 7, "ContinuationToken": "t", "upsert": true})).unwrap();
        assert_eq!(options.scan.page_size, 7);
        assert_eq!(options.scan.continuation_token.as_deref(), Some("t"));
        assert!(options.upsert);

        let list = ListOptions::from_json(&json!({"nameOnly": true})).unwrap();
        assert!(list.name_only);
        assert_eq!(list.page_size, DEFAULT_LIST_PAGE_SIZE);
    }

    #[test]
    fn test_invalid_options() {
        assert!(FindOptions::from_json(&json!({"sort": "nope"})).is_err());
        assert!(FindOptions::from_json(&json!({"skip": -1})).is_err());
        assert!(ScanOptions::new().with_page_size(0).validate().is_err());
    }

    #[test]
    fn test_limit_skip() {
        let docs: Vec<Value> = (0..5).map(|i| json!({"i": i})).collect();
        assert_eq!(apply_limit_skip(docs.clone(), Some(2), Some(1)), vec![json!({"i": 1}), json!({"i": 2})]);
        assert_eq!(apply_limit_skip(docs.clone(), Some(0), None).len(), 5);
        assert!(apply_limit_skip(docs, None, Some(10)).is_empty());
    }
}
