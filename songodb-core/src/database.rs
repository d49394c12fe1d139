// songodb-core/src/database.rs
// Instance and database level API

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::collection::Collection;
use crate::error::Result;
use crate::explain::{millis, Explain, ScanStats};
use crate::find_options::ListOptions;
use crate::namespace::{validate_segment, Namespace};
use crate::query::Filter;
use crate::storage::{ListRequest, ObjectError, ObjectStore};

/// One page of database or collection names
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResult {
    /// `{ "name": ... }` documents, or bare strings with `name_only`
    pub docs: Vec<Value>,
    pub explain: Explain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropResult {
    pub deleted_count: usize,
    /// False when any key failed to delete
    pub dropped: bool,
    pub errors: Vec<ObjectError>,
}

/// Top-level tenant: every key of an instance starts with `<instance>/`
///
/// Generic over Storage backend:
/// - `Instance<FileObjectStore>` - JSON files on disk
/// - `Instance<MemoryStore>` - in-memory storage for testing
pub struct Instance<S: ObjectStore> {
    name: String,
    store: Arc<S>,
}

impl<S: ObjectStore> Instance<S> {
    pub fn new(name: impl Into<String>, store: Arc<S>) -> Result<Self> {
        let name = name.into();
        validate_segment("Instance", &name)?;
        Ok(Instance { name, store })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db(&self, name: &str) -> Result<Database<S>> {
        validate_segment("Database", name)?;
        Ok(Database {
            instance: self.name.clone(),
            name: name.to_string(),
            store: Arc::clone(&self.store),
        })
    }

    /// One page of the databases of this instance, filtered by `filter`
    pub async fn list_databases(&self, filter: &Value, options: &ListOptions) -> Result<ListResult> {
        list_names(self.store.as_ref(), &format!("{}/", self.name), filter, options).await
    }
}

/// A database: the collections under `<instance>/<database>/`
pub struct Database<S: ObjectStore> {
    instance: String,
    name: String,
    store: Arc<S>,
}

impl<S: ObjectStore> Database<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    fn prefix(&self) -> String {
        format!("{}/{}/", self.instance, self.name)
    }

    pub fn collection(&self, name: &str) -> Result<Collection<S>> {
        let namespace = Namespace::new(self.instance.as_str(), self.name.as_str(), name)?;
        Ok(Collection::new(namespace, Arc::clone(&self.store)))
    }

    /// One page of the collections of this database, filtered by `filter`
    pub async fn list_collections(&self, filter: &Value, options: &ListOptions) -> Result<ListResult> {
        list_names(self.store.as_ref(), &self.prefix(), filter, options).await
    }

    /// Delete every document of every collection of this database
    pub async fn drop_database(&self) -> Result<DropResult> {
        let prefix = self.prefix();
        let outcome = self.store.delete_prefix(&prefix).await?;
        if outcome.errors.is_empty() {
            info!(database = %prefix, deleted = outcome.deleted.len(), "dropped database");
        } else {
            warn!(database = %prefix, failed = outcome.errors.len(), "database drop incomplete");
        }
        Ok(DropResult {
            deleted_count: outcome.deleted.len(),
            dropped: outcome.errors.is_empty(),
            errors: outcome.errors,
        })
    }
}

async fn list_names<S: ObjectStore>(
    store: &S,
    prefix: &str,
    filter: &Value,
    options: &ListOptions,
) -> Result<ListResult> {
    let started = Instant::now();
    let parsed = Filter::parse(filter)?;
    let scan = options.scan();
    scan.validate()?;

    let request = ListRequest::new(scan.page_size).after(scan.continuation_token);
    let page = store.list_common_prefixes(prefix, &request).await?;
    let stats = ScanStats {
        is_truncated: page.truncated,
        key_count: page.key_count,
        max_keys: page.page_size,
        next_continuation_token: page.next_continuation_token,
        time_millis: millis(started.elapsed()),
    };

    let docs: Vec<Value> = page
        .names
        .into_iter()
        .map(|name| json!({ "name": name }))
        .filter(|doc| parsed.matches(doc))
        .map(|doc| if options.name_only { doc["name"].clone() } else { doc })
        .collect();

    Ok(ListResult {
        explain: Explain::build(stats, docs.len(), started.elapsed()),
        docs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    async fn seeded_instance() -> Instance<MemoryStore> {
        let instance = Instance::new("listDatabases", Arc::new(MemoryStore::new())).unwrap();
        for (db, coll) in [("db1", "users"), ("db1", "posts"), ("db2", "users")] {
            instance
                .db(db)
                .unwrap()
                .collection(coll)
                .unwrap()
                .insert_one(json!({"hello": "world"}))
                .await
                .unwrap();
        }
        instance
    }

    #[tokio::test]
    async fn test_list_databases() {
        let instance = seeded_instance().await;
        let result = instance.list_databases(&Value::Null, &ListOptions::new()).await.unwrap();
        assert_eq!(result.docs, vec![json!({"name": "db1"}), json!({"name": "db2"})]);
        assert_eq!(result.explain.execution_stats.n_returned, 2);
        assert_eq!(result.explain.execution_stats.total_docs_examined, 2);
        assert_eq!(result.explain.scan.max_keys, 1000);

        let names = instance.list_databases(&json!({}), &ListOptions::new().names_only()).await.unwrap();
        assert_eq!(names.docs, vec![json!("db1"), json!("db2")]);
    }

    #[tokio::test]
    async fn test_list_collections_with_filter() {
        let instance = seeded_instance().await;
        let db1 = instance.db("db1").unwrap();
        let all = db1.list_collections(&Value::Null, &ListOptions::new().names_only()).await.unwrap();
        assert_eq!(all.docs, vec![json!("posts"), json!("users")]);

        let filtered = db1.list_collections(&json!({"name": "users"}), &ListOptions::new()).await.unwrap();
        assert_eq!(filtered.docs, vec![json!({"name": "users"})]);
        assert_eq!(filtered.explain.execution_stats.total_docs_examined, 2);
    }

    #[tokio::test]
    async fn test_drop_database() {
        let instance = seeded_instance().await;
        let dropped = instance.db("db1").unwrap().drop_database().await.unwrap();
        assert_eq!(dropped.deleted_count, 2);
        assert!(dropped.dropped);
        let remaining = instance.list_databases(&Value::Null, &ListOptions::new().names_only()).await.unwrap();
        assert_eq!(remaining.docs, vec![json!("db2")]);
    }

    #[test]
    fn test_invalid_names() {
        let store = Arc::new(MemoryStore::new());
        assert!(Instance::new("", Arc::clone(&store)).is_err());
        let instance = Instance::new("i", store).unwrap();
        assert!(instance.db("a/b").is_err());
        assert!(instance.db("db").unwrap().collection("$x").is_err());
    }
}
