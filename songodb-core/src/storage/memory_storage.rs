// storage/memory_storage.rs
//! Pure in-memory object store for fast testing
//!
//! Objects live in an ordered map so prefix listings come back in key order,
//! the same order an object-storage service lists them in.
//!
//! # Architecture
//!
//! ```text
//! MemoryStore (ObjectStore trait implementation)
//!      ↓
//! RwLock<BTreeMap<String, Value>> (key -> JSON body)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::Result;
use crate::storage::traits::validate_key;
use crate::storage::{
    DeleteOutcome, ListPage, ListRequest, ObjectEntry, ObjectError, ObjectStore, PrefixPage,
    PutOutcome,
};

/// In-memory object store (testing)
///
/// The continuation token of a truncated listing is the last key (or name)
/// of the page; the next page starts strictly after it.
///
/// # Examples
///
/// ```ignore
/// use songodb_core::storage::MemoryStore;
///
/// let store = MemoryStore::new();
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Every stored key, in order
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    fn list_page(&self, prefix: &str, request: &ListRequest) -> Result<ListPage> {
        validate_prefix(prefix)?;
        let objects = self.objects.read();
        let lower = match &request.continuation_token {
            Some(token) if token.as_str() >= prefix => Bound::Excluded(token.clone()),
            _ => Bound::Included(prefix.to_string()),
        };
        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix));

        let entries: Vec<ObjectEntry> = matching
            .by_ref()
            .take(request.page_size)
            .map(|(key, body)| ObjectEntry {
                key: key.clone(),
                body: body.clone(),
            })
            .collect();
        let truncated = matching.next().is_some();
        let next_continuation_token = if truncated {
            entries.last().map(|e| e.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            key_count: entries.len(),
            entries,
            truncated,
            page_size: request.page_size,
            next_continuation_token,
        })
    }

    fn prefix_page(&self, prefix: &str, request: &ListRequest) -> Result<PrefixPage> {
        validate_prefix(prefix)?;
        let objects = self.objects.read();
        let children: BTreeSet<&str> = objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                rest.split_once('/').map(|(child, _)| child)
            })
            .collect();

        let mut remaining = children
            .into_iter()
            .filter(|name| match &request.continuation_token {
                Some(token) => *name > token.as_str(),
                None => true,
            });
        let names: Vec<String> = remaining
            .by_ref()
            .take(request.page_size)
            .map(str::to_string)
            .collect();
        let truncated = remaining.next().is_some();

        Ok(PrefixPage {
            key_count: names.len(),
            next_continuation_token: if truncated { names.last().cloned() } else { None },
            names,
            truncated,
            page_size: request.page_size,
        })
    }

    fn remove(&self, key: &str) -> Result<DeleteOutcome> {
        validate_key(key)?;
        let removed = self.objects.write().remove(key).is_some();
        Ok(DeleteOutcome {
            deleted: if removed { vec![key.to_string()] } else { Vec::new() },
            errors: Vec::new(),
        })
    }
}

/// A listing prefix is a key with an optional trailing `/`; the empty prefix
/// lists everything
fn validate_prefix(prefix: &str) -> Result<()> {
    let trimmed = prefix.strip_suffix('/').unwrap_or(prefix);
    if trimmed.is_empty() {
        return Ok(());
    }
    validate_key(trimmed)
}

impl ObjectStore for MemoryStore {
    async fn get_one(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        Ok(self.objects.read().get(key).cloned())
    }

    async fn put_one(&self, key: &str, body: &Value) -> Result<()> {
        validate_key(key)?;
        self.objects.write().insert(key.to_string(), body.clone());
        Ok(())
    }

    async fn delete_one(&self, key: &str) -> Result<DeleteOutcome> {
        self.remove(key)
    }

    async fn put_multiple(&self, entries: Vec<(String, Value)>) -> Result<PutOutcome> {
        let mut outcome = PutOutcome::default();
        let mut objects = self.objects.write();
        for (key, body) in entries {
            match validate_key(&key) {
                Ok(()) => {
                    objects.insert(key.clone(), body);
                    outcome.written.push(key);
                }
                Err(e) => outcome.errors.push(ObjectError::new(key, &e)),
            }
        }
        Ok(outcome)
    }

    async fn delete_multiple(&self, keys: &[String]) -> Result<DeleteOutcome> {
        let mut outcome = DeleteOutcome::default();
        for key in keys {
            match self.remove(key) {
                Ok(single) => outcome.merge(single),
                Err(e) => outcome.errors.push(ObjectError::new(key.as_str(), &e)),
            }
        }
        Ok(outcome)
    }

    async fn list_prefix(&self, prefix: &str, request: &ListRequest) -> Result<ListPage> {
        self.list_page(prefix, request)
    }

    async fn list_common_prefixes(&self, prefix: &str, request: &ListRequest) -> Result<PrefixPage> {
        self.prefix_page(prefix, request)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SongoError;
    use serde_json::json;

    async fn seeded(n: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..n {
            store
                .put_one(&format!("i/d/c/{:03}", i), &json!({"_id": format!("{:03}", i)}))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let store = MemoryStore::new();
        assert_eq!(store.get_one("i/d/c/a").await.unwrap(), None);
        store.put_one("i/d/c/a", &json!({"v": 1})).await.unwrap();
        store.put_one("i/d/c/a", &json!({"v": 2})).await.unwrap();
        assert_eq!(store.get_one("i/d/c/a").await.unwrap(), Some(json!({"v": 2})));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_key_is_namespace_error() {
        let store = MemoryStore::new();
        let err = store.put_one("i//a", &json!({})).await.unwrap_err();
        assert!(matches!(err, SongoError::InvalidNamespace(_)));
    }

    #[tokio::test]
    async fn test_list_pages_with_token() {
        let store = seeded(5).await;
        let first = store.list_prefix("i/d/c/", &ListRequest::new(2)).await.unwrap();
        assert_eq!(first.key_count, 2);
        assert!(first.truncated);
        assert_eq!(first.next_continuation_token.as_deref(), Some("i/d/c/001"));

        let second = store
            .list_prefix("i/d/c/", &ListRequest::new(2).after(first.next_continuation_token))
            .await
            .unwrap();
        let keys: Vec<&str> = second.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["i/d/c/002", "i/d/c/003"]);

        let last = store
            .list_prefix("i/d/c/", &ListRequest::new(2).after(second.next_continuation_token))
            .await
            .unwrap();
        assert_eq!(last.key_count, 1);
        assert!(!last.truncated);
        assert_eq!(last.next_continuation_token, None);
    }

    #[tokio::test]
    async fn test_list_exact_page_is_not_truncated() {
        let store = seeded(3).await;
        let page = store.list_prefix("i/d/c/", &ListRequest::new(3)).await.unwrap();
        assert_eq!(page.key_count, 3);
        assert!(!page.truncated);
    }

    #[tokio::test]
    async fn test_list_does_not_leak_sibling_prefix() {
        let store = seeded(2).await;
        store.put_one("i/d/cc/x", &json!({})).await.unwrap();
        store.put_one("i/d/b/x", &json!({})).await.unwrap();
        let page = store.list_prefix("i/d/c/", &ListRequest::new(100)).await.unwrap();
        assert_eq!(page.key_count, 2);
    }

    #[tokio::test]
    async fn test_common_prefixes() {
        let store = MemoryStore::new();
        for key in ["i/db/c/1", "i/db-2/c/1", "i/db/d/1", "i/z/c/1"] {
            store.put_one(key, &json!({})).await.unwrap();
        }
        let page = store.list_common_prefixes("i/", &ListRequest::new(2)).await.unwrap();
        assert_eq!(page.names, vec!["db".to_string(), "db-2".to_string()]);
        assert!(page.truncated);

        let rest = store
            .list_common_prefixes("i/", &ListRequest::new(2).after(page.next_continuation_token))
            .await
            .unwrap();
        assert_eq!(rest.names, vec!["z".to_string()]);
        assert!(!rest.truncated);

        let collections = store.list_common_prefixes("i/db/", &ListRequest::new(10)).await.unwrap();
        assert_eq!(collections.names, vec!["c".to_string(), "d".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_one_reports_existence() {
        let store = seeded(1).await;
        assert_eq!(store.delete_one("i/d/c/000").await.unwrap().deleted.len(), 1);
        assert!(store.delete_one("i/d/c/000").await.unwrap().deleted.is_empty());
    }

    #[tokio::test]
    async fn test_batch_errors_are_per_key() {
        let store = MemoryStore::new();
        let outcome = store
            .put_multiple(vec![("i/d/c/a".into(), json!({})), ("bad//key".into(), json!({}))])
            .await
            .unwrap();
        assert_eq!(outcome.written, vec!["i/d/c/a".to_string()]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].key, "bad//key");
    }

    #[tokio::test]
    async fn test_delete_prefix_spans_pages() {
        let store = seeded(2500).await;
        store.put_one("i/d/other/x", &json!({})).await.unwrap();
        let outcome = store.delete_prefix("i/d/c/").await.unwrap();
        assert_eq!(outcome.deleted.len(), 2500);
        assert!(outcome.errors.is_empty());
        assert_eq!(store.keys(), vec!["i/d/other/x".to_string()]);
    }
}
