// songodb-core/src/collection.rs
// Collection-level operations over an object store
//
// FILE STRUCTURE:
// ├── Result records (FindResult, InsertOneResult, ..., UpdateResult)
// ├── Query Operations
// │   └── find, find_one
// ├── Insert Operations
// │   └── insert_one, insert_many
// ├── Delete Operations
// │   └── delete, delete_one, delete_many, delete_collection
// ├── Update Operations
// │   └── update_many, replace_one
// └── Private Helpers
//     └── fetch_page, upsert
//
// Every read and write is bounded by one storage page except
// delete_collection, which drains the whole prefix. Writes race at the
// storage layer: the later put wins, there is no document versioning.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::document::{Document, DocumentId, ID_FIELD};
use crate::error::{Result, SongoError};
use crate::explain::{millis, Explain, ScanStats};
use crate::find_options::{FindOptions, ScanOptions, UpdateOptions};
use crate::namespace::Namespace;
use crate::query::{is_empty_filter, point_lookup_id, Filter};
use crate::scan::{self, finish_page, ScanPage};
use crate::storage::{DeleteOutcome, ObjectError, ObjectStore};
use crate::update::UpdateSpec;
use crate::value_utils::values_equal;

/// Documents of one page plus diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindResult {
    pub docs: Vec<Value>,
    pub explain: Explain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
    pub inserted_count: usize,
    pub inserted_id: DocumentId,
    /// The document as written, `_id` included
    pub ops: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertManyResult {
    pub inserted_count: usize,
    pub inserted_ids: Vec<DocumentId>,
    pub ops: Vec<Value>,
    pub errors: Vec<ObjectError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: usize,
    pub deleted: Vec<String>,
    pub errors: Vec<ObjectError>,
    pub explain: Explain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertedId {
    #[serde(rename = "_id")]
    pub id: DocumentId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub matched_count: usize,
    pub modified_count: usize,
    pub upserted_count: usize,
    pub upserted_id: Option<UpsertedId>,
    pub explain: Explain,
}

/// Handle to one collection: a namespace plus the store it lives in
///
/// Generic over the storage backend:
/// - `Collection<FileObjectStore>` - JSON files on disk
/// - `Collection<MemoryStore>` - in-memory storage for testing
pub struct Collection<S: ObjectStore> {
    namespace: Namespace,
    store: Arc<S>,
}

impl<S: ObjectStore> Clone for Collection<S> {
    fn clone(&self) -> Self {
        Collection {
            namespace: self.namespace.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ObjectStore> Collection<S> {
    pub fn new(namespace: Namespace, store: Arc<S>) -> Self {
        Collection { namespace, store }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        self.namespace.collection()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ========== QUERY OPERATIONS ==========

    /// Find the documents of one page matching `filter`
    ///
    /// `{ "_id": "<string>" }` reads that single key; anything else scans
    /// one page of the collection prefix. Sort, skip and limit operate on
    /// that page only.
    pub async fn find(&self, filter: &Value, options: &FindOptions) -> Result<FindResult> {
        let started = Instant::now();
        let parsed = Filter::parse(filter)?;
        let (docs, explain) = match point_lookup_id(filter) {
            Some(_) => {
                let page = self.fetch_page(filter, &options.scan).await?;
                let stats = page.stats();
                let docs = finish_page(page.into_documents(), &parsed, options);
                let explain = Explain::build(stats, docs.len(), started.elapsed());
                (docs, explain)
            }
            None => scan::query_page(self.store.as_ref(), &self.namespace.prefix(), &parsed, options).await?,
        };
        debug!(namespace = %self.namespace, returned = docs.len(), "find");
        Ok(FindResult { docs, explain })
    }

    /// First document of `find` with a limit of one
    pub async fn find_one(&self, filter: &Value, options: &FindOptions) -> Result<Option<Value>> {
        let options = options.clone().with_limit(1);
        Ok(self.find(filter, &options).await?.docs.into_iter().next())
    }

    // ========== INSERT OPERATIONS ==========

    /// Write one document, generating `_id` when absent
    ///
    /// The write is an unconditional overwrite of `prefix + _id`.
    pub async fn insert_one(&self, document: Value) -> Result<InsertOneResult> {
        let (id, key, document) = self.prepare_insert(document)?;
        self.store.put_one(&key, &document).await?;
        debug!(namespace = %self.namespace, id = %id, "inserted document");
        Ok(InsertOneResult {
            inserted_count: 1,
            inserted_id: id,
            ops: vec![document],
        })
    }

    /// Write many documents; per-key failures land in `errors` and already
    /// written documents stay written
    pub async fn insert_many(&self, documents: Vec<Value>) -> Result<InsertManyResult> {
        let prepared = documents
            .into_iter()
            .map(|doc| self.prepare_insert(doc))
            .collect::<Result<Vec<_>>>()?;

        let entries: Vec<(String, Value)> = prepared
            .iter()
            .map(|(_, key, doc)| (key.clone(), doc.clone()))
            .collect();
        let outcome = self.store.put_multiple(entries).await?;
        if !outcome.errors.is_empty() {
            warn!(namespace = %self.namespace, failed = outcome.errors.len(), "insert_many had failures");
        }

        let failed: Vec<&str> = outcome.errors.iter().map(|e| e.key.as_str()).collect();
        let (inserted_ids, ops): (Vec<DocumentId>, Vec<Value>) = prepared
            .into_iter()
            .filter(|(_, key, _)| !failed.contains(&key.as_str()))
            .map(|(id, _, doc)| (id, doc))
            .unzip();

        Ok(InsertManyResult {
            inserted_count: outcome.written.len(),
            inserted_ids,
            ops,
            errors: outcome.errors,
        })
    }

    // ========== DELETE OPERATIONS ==========

    /// Route a delete by the shape of its filter
    ///
    /// - empty or `null` filter: drop every document of the collection
    /// - exactly `{ "_id": <id> }`: delete that key
    /// - anything else: delete the matches of one page
    pub async fn delete(&self, filter: &Value, options: &ScanOptions) -> Result<DeleteResult> {
        if is_empty_filter(filter) {
            return self.delete_collection(options).await;
        }
        if let Some(map) = filter.as_object() {
            if map.len() == 1 {
                if let Some(Ok(id)) = map.get(ID_FIELD).map(DocumentId::from_value) {
                    return self.delete_one(&id, options).await;
                }
            }
        }
        self.delete_many(filter, options).await
    }

    /// Delete one key; counts 1 only when the key existed
    pub async fn delete_one(&self, id: &DocumentId, options: &ScanOptions) -> Result<DeleteResult> {
        let started = Instant::now();
        let outcome = match self.namespace.key_for(id) {
            Ok(key) => self.store.delete_one(&key).await?,
            Err(SongoError::InvalidNamespace(_)) => DeleteOutcome::default(),
            Err(e) => return Err(e),
        };
        let stats = ScanStats {
            is_truncated: false,
            key_count: outcome.deleted.len(),
            max_keys: options.page_size,
            next_continuation_token: None,
            time_millis: millis(started.elapsed()),
        };
        Ok(DeleteResult {
            deleted_count: outcome.deleted.len(),
            explain: Explain::build(stats, outcome.deleted.len(), started.elapsed()),
            deleted: outcome.deleted,
            errors: outcome.errors,
        })
    }

    /// Delete the documents of one page that match `filter`
    pub async fn delete_many(&self, filter: &Value, options: &ScanOptions) -> Result<DeleteResult> {
        let started = Instant::now();
        let parsed = Filter::parse(filter)?;
        let page = scan::scan(self.store.as_ref(), &self.namespace.prefix(), options).await?;
        let stats = page.stats();
        let keys: Vec<String> = page.matching(&parsed).into_iter().map(|e| e.key).collect();

        let outcome = if keys.is_empty() {
            Default::default()
        } else {
            self.store.delete_multiple(&keys).await?
        };
        if !outcome.errors.is_empty() {
            warn!(namespace = %self.namespace, failed = outcome.errors.len(), "delete_many had failures");
        }
        Ok(DeleteResult {
            deleted_count: outcome.deleted.len(),
            explain: Explain::build(stats, outcome.deleted.len(), started.elapsed()),
            deleted: outcome.deleted,
            errors: outcome.errors,
        })
    }

    /// Drop the collection: delete every key under its prefix, across pages
    pub async fn delete_collection(&self, options: &ScanOptions) -> Result<DeleteResult> {
        let started = Instant::now();
        let outcome = self.store.delete_prefix(&self.namespace.prefix()).await?;
        info!(
            namespace = %self.namespace,
            deleted = outcome.deleted.len(),
            failed = outcome.errors.len(),
            "dropped collection"
        );
        let examined = outcome.deleted.len() + outcome.errors.len();
        let stats = ScanStats {
            is_truncated: false,
            key_count: examined,
            max_keys: options.page_size,
            next_continuation_token: None,
            time_millis: millis(started.elapsed()),
        };
        Ok(DeleteResult {
            deleted_count: outcome.deleted.len(),
            explain: Explain::build(stats, outcome.deleted.len(), started.elapsed()),
            deleted: outcome.deleted,
            errors: outcome.errors,
        })
    }

    // ========== UPDATE OPERATIONS ==========

    /// Apply `update` to the matching documents of one page
    ///
    /// Only documents whose value actually changed are written, so
    /// `modified_count` can be lower than `matched_count`. With
    /// `options.upsert` and no match, the update is applied to an empty
    /// document and the result is inserted.
    pub async fn update_many(
        &self,
        filter: &Value,
        update: &Value,
        options: &UpdateOptions,
    ) -> Result<UpdateResult> {
        let started = Instant::now();
        let parsed = Filter::parse(filter)?;
        let spec = UpdateSpec::from_json(update)?;
        let page = self.fetch_page(filter, &options.scan).await?;
        let stats = page.stats();
        let matched = page.matching(&parsed);

        if matched.is_empty() && options.upsert {
            return self.upsert(&spec, stats, started).await;
        }

        let mut changed = Vec::new();
        for entry in &matched {
            let next = spec.apply(&entry.body)?;
            if !values_equal(&next, &entry.body) {
                changed.push((entry.key.clone(), next));
            }
        }

        let modified_count = changed.len();
        if !changed.is_empty() {
            let outcome = self.store.put_multiple(changed).await?;
            if let Some(first) = outcome.errors.first() {
                warn!(namespace = %self.namespace, failed = outcome.errors.len(), "update_many had failures");
                return Err(SongoError::Storage(format!(
                    "failed to write {} of {} updated documents ({}: {})",
                    outcome.errors.len(),
                    modified_count,
                    first.key,
                    first.message
                )));
            }
        }
        debug!(namespace = %self.namespace, matched = matched.len(), modified = modified_count, "update_many");

        Ok(UpdateResult {
            matched_count: matched.len(),
            modified_count,
            upserted_count: 0,
            upserted_id: None,
            explain: Explain::build(stats, matched.len(), started.elapsed()),
        })
    }

    /// Overwrite the first matching document with `replacement`, keeping its `_id`
    ///
    /// `matched_count` reports every match of the page while only the first
    /// is written, and `modified_count` is always 1 when anything matched.
    pub async fn replace_one(
        &self,
        filter: &Value,
        replacement: &Value,
        options: &UpdateOptions,
    ) -> Result<UpdateResult> {
        let started = Instant::now();
        let parsed = Filter::parse(filter)?;
        let replacement_fields = replacement.as_object().ok_or_else(|| {
            SongoError::InvalidArgument(format!("Replacement must be an object, got {}", replacement))
        })?;
        if let Some(op) = replacement_fields.keys().find(|k| k.starts_with('$')) {
            return Err(SongoError::InvalidArgument(format!(
                "Replacement document must not contain update operators, found {}",
                op
            )));
        }

        let page = self.fetch_page(filter, &options.scan).await?;
        let stats = page.stats();
        let matched = page.matching(&parsed);

        let Some(first) = matched.first() else {
            if options.upsert {
                return self.upsert(&UpdateSpec::set_all(replacement_fields), stats, started).await;
            }
            return Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
                upserted_count: 0,
                upserted_id: None,
                explain: Explain::build(stats, 0, started.elapsed()),
            });
        };

        let mut next = replacement_fields.clone();
        if let Some(id) = first.body.get(ID_FIELD) {
            next.insert(ID_FIELD.to_string(), id.clone());
        }
        self.store.put_one(&first.key, &Value::Object(next)).await?;
        debug!(namespace = %self.namespace, key = %first.key, matched = matched.len(), "replace_one");

        Ok(UpdateResult {
            matched_count: matched.len(),
            modified_count: 1,
            upserted_count: 0,
            upserted_id: None,
            explain: Explain::build(stats, matched.len(), started.elapsed()),
        })
    }

    // ========== PRIVATE HELPERS ==========

    async fn fetch_page(&self, filter: &Value, options: &ScanOptions) -> Result<ScanPage> {
        match point_lookup_id(filter) {
            Some(id) => match self.namespace.key_for(&DocumentId::from(id)) {
                Ok(key) => scan::point_lookup(self.store.as_ref(), &key, options.page_size).await,
                // No stored document can carry an id that is not a key segment
                Err(SongoError::InvalidNamespace(_)) => Ok(ScanPage::empty(options.page_size)),
                Err(e) => Err(e),
            },
            None => scan::scan(self.store.as_ref(), &self.namespace.prefix(), options).await,
        }
    }

    fn prepare_insert(&self, document: Value) -> Result<(DocumentId, String, Value)> {
        let mut document = Document::from_value(document)?;
        let id = document.ensure_id()?;
        let key = self.namespace.key_for(&id)?;
        Ok((id, key, document.into_value()))
    }

    async fn upsert(&self, spec: &UpdateSpec, stats: ScanStats, started: Instant) -> Result<UpdateResult> {
        let document = spec.apply_for_upsert(&json!({}))?;
        let inserted = self.insert_one(document).await?;
        info!(namespace = %self.namespace, id = %inserted.inserted_id, "upserted document");
        Ok(UpdateResult {
            matched_count: 0,
            modified_count: 0,
            upserted_count: 1,
            upserted_id: Some(UpsertedId {
                id: inserted.inserted_id,
            }),
            explain: Explain::build(stats, 0, started.elapsed()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn collection() -> Collection<MemoryStore> {
        let namespace = Namespace::new("inst", "db", "users").unwrap();
        Collection::new(namespace, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_insert_generates_id() {
        let users = collection();
        let result = users.insert_one(json!({"name": "Ann"})).await.unwrap();
        assert_eq!(result.inserted_count, 1);
        assert_eq!(result.ops[0][ID_FIELD], result.inserted_id.to_value());
        let key = users.namespace().key_for(&result.inserted_id).unwrap();
        assert!(users.store().get_one(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_insert_rejects_bad_documents() {
        let users = collection();
        assert!(users.insert_one(json!([1, 2])).await.unwrap_err().is_client_error());
        assert!(users.insert_one(json!({"_id": "a/b"})).await.unwrap_err().is_client_error());
        assert!(users.insert_one(json!({"_id": 1.5})).await.is_err());
        // Nothing is written when any document of a batch is invalid
        assert!(users.insert_many(vec![json!({"_id": "ok"}), json!(3)]).await.is_err());
        assert!(users.store().is_empty());
    }

    #[tokio::test]
    async fn test_insert_overwrites() {
        let users = collection();
        users.insert_one(json!({"_id": "a", "v": 1})).await.unwrap();
        users.insert_one(json!({"_id": "a", "v": 2})).await.unwrap();
        let found = users.find(&json!({"_id": "a"}), &FindOptions::new()).await.unwrap();
        assert_eq!(found.docs, vec![json!({"_id": "a", "v": 2})]);
    }

    #[tokio::test]
    async fn test_delete_dispatch() {
        let users = collection();
        users
            .insert_many(vec![json!({"_id": "a", "n": 1}), json!({"_id": "b", "n": 2}), json!({"_id": 7, "n": 3})])
            .await
            .unwrap();

        let one = users.delete(&json!({"_id": 7}), &ScanOptions::new()).await.unwrap();
        assert_eq!(one.deleted_count, 1);
        let missing = users.delete(&json!({"_id": "zzz"}), &ScanOptions::new()).await.unwrap();
        assert_eq!(missing.deleted_count, 0);

        let many = users.delete(&json!({"n": {"$gt": 1}}), &ScanOptions::new()).await.unwrap();
        assert_eq!(many.deleted, vec!["inst/db/users/b".to_string()]);

        let all = users.delete(&Value::Null, &ScanOptions::new()).await.unwrap();
        assert_eq!(all.deleted_count, 1);
        assert!(users.store().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_operator_before_writing() {
        let users = collection();
        users.insert_one(json!({"_id": "a", "n": 1})).await.unwrap();
        let err = users
            .update_many(&json!({}), &json!({"$push": {"n": 1}}), &UpdateOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SongoError::UnknownModifier(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_update_type_mismatch_is_internal() {
        let users = collection();
        users.insert_one(json!({"_id": "a", "n": "one"})).await.unwrap();
        let err = users
            .update_many(&json!({}), &json!({"$inc": {"n": 1}}), &UpdateOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SongoError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_replace_keeps_id_and_reports_literal_counts() {
        let users = collection();
        users
            .insert_many(vec![
                json!({"_id": "a", "team": "x", "n": 1}),
                json!({"_id": "b", "team": "x", "n": 2}),
            ])
            .await
            .unwrap();

        let result = users
            .replace_one(&json!({"team": "x"}), &json!({"_id": "other", "n": 9}), &UpdateOptions::new())
            .await
            .unwrap();
        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 1);

        let a = users.find_one(&json!({"_id": "a"}), &FindOptions::new()).await.unwrap();
        assert_eq!(a, Some(json!({"_id": "a", "n": 9})));
        let b = users.find_one(&json!({"_id": "b"}), &FindOptions::new()).await.unwrap();
        assert_eq!(b, Some(json!({"_id": "b", "team": "x", "n": 2})));
    }

    #[tokio::test]
    async fn test_replace_rejects_operators() {
        let users = collection();
        let err = users
            .replace_one(&json!({}), &json!({"$set": {"a": 1}}), &UpdateOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_replace_upsert() {
        let users = collection();
        let result = users
            .replace_one(&json!({"name": "x"}), &json!({"name": "x", "n": 1}), &UpdateOptions::new().upsert())
            .await
            .unwrap();
        assert_eq!(result.upserted_count, 1);
        let id = result.upserted_id.unwrap().id;
        let key = users.namespace().key_for(&id).unwrap();
        let stored = users.store().get_one(&key).await.unwrap().unwrap();
        assert_eq!(stored["n"], json!(1));
        assert_eq!(stored[ID_FIELD], id.to_value());
    }

    #[tokio::test]
    async fn test_update_result_wire_shape() {
        let users = collection();
        let result = users
            .update_many(&json!({}), &json!({"$set": {"a": 1}}), &UpdateOptions::new())
            .await
            .unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["matchedCount"], json!(0));
        assert_eq!(value["upsertedId"], json!(null));
        assert!(value["explain"]["executionStats"].is_object());
    }
}
