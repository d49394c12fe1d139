// storage/file_storage.rs
//! File-based object store
//!
//! Each object is one JSON file under a root directory. The key's `/`
//! separated segments become directories and the last segment gets a
//! `.json` suffix:
//!
//! ```text
//! key   instance/db/users/42
//! file  <root>/instance/db/users/42.json
//! ```
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never sees a half-written body. Empty directories are pruned after
//! deletes; a prefix with no objects under it does not exist.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SongoError};
use crate::storage::traits::validate_key;
use crate::storage::{
    DeleteOutcome, ListPage, ListRequest, ObjectEntry, ObjectError, ObjectStore, PrefixPage,
    PutOutcome,
};

const OBJECT_SUFFIX: &str = ".json";

/// Default number of concurrent file operations in a batch
pub const DEFAULT_WRITE_CONCURRENCY: usize = 100;

/// File-based object store (production)
///
/// # Examples
///
/// ```ignore
/// use songodb_core::storage::FileObjectStore;
///
/// let store = FileObjectStore::open("./songodb-data").await?;
/// ```
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    root: PathBuf,
    write_concurrency: usize,
}

impl FileObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "opened file object store");
        Ok(FileObjectStore {
            root,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
        })
    }

    /// Bound on concurrent file operations inside `put_multiple` / `delete_multiple`
    pub fn with_concurrency(mut self, write_concurrency: usize) -> Self {
        self.write_concurrency = write_concurrency.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_for(&self, dir_key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in dir_key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let (dir_key, name) = key.rsplit_once('/').unwrap_or(("", key));
        let mut path = self.dir_for(dir_key);
        path.push(format!("{}{}", name, OBJECT_SUFFIX));
        Ok(path)
    }

    async fn read_object(&self, path: &Path) -> Result<Option<Value>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_object(&self, key: &str, body: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| SongoError::Storage(format!("no parent directory for {}", key)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
        let bytes = serde_json::to_vec(body)?;

        // A concurrent delete may prune the directory between create and write
        let mut retried = false;
        loop {
            fs::create_dir_all(parent).await?;
            match fs::write(&tmp, &bytes).await {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::NotFound && !retried => retried = true,
                Err(e) => return Err(e.into()),
            }
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_object(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        self.prune_empty_dirs(path.parent()).await;
        Ok(true)
    }

    /// Remove now-empty directories from `start` up to (not including) the root
    async fn prune_empty_dirs(&self, start: Option<&Path>) {
        let mut dir = start.map(Path::to_path_buf);
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(&current).await.is_err() {
                break;
            }
            dir = current.parent().map(Path::to_path_buf);
        }
    }

    /// Every key starting with `prefix`, sorted
    async fn collect_keys(&self, prefix: &str) -> Result<Vec<String>> {
        if !prefix.is_empty() {
            validate_key(prefix.strip_suffix('/').unwrap_or(prefix))?;
        }
        let base_key = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };

        let mut keys = Vec::new();
        let mut pending = vec![(self.dir_for(base_key), base_key.to_string())];
        while let Some((dir, dir_key)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                let key = if dir_key.is_empty() {
                    name
                } else {
                    format!("{}/{}", dir_key, name)
                };
                if entry.file_type().await?.is_dir() {
                    if may_contain(&key, prefix) {
                        pending.push((entry.path(), key));
                    }
                } else if let Some(object_key) = key.strip_suffix(OBJECT_SUFFIX) {
                    if object_key.starts_with(prefix) {
                        keys.push(object_key.to_string());
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Whether keys under directory `dir_key` can start with `prefix`
fn may_contain(dir_key: &str, prefix: &str) -> bool {
    let dir_prefix = format!("{}/", dir_key);
    dir_prefix.starts_with(prefix) || prefix.starts_with(&dir_prefix)
}

fn after_token<'a>(token: &'a Option<String>) -> impl Fn(&String) -> bool + 'a {
    move |key: &String| match token {
        Some(token) => key > token,
        None => true,
    }
}

impl ObjectStore for FileObjectStore {
    async fn get_one(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        self.read_object(&path).await
    }

    async fn put_one(&self, key: &str, body: &Value) -> Result<()> {
        self.write_object(key, body).await
    }

    async fn delete_one(&self, key: &str) -> Result<DeleteOutcome> {
        let removed = self.remove_object(key).await?;
        Ok(DeleteOutcome {
            deleted: if removed { vec![key.to_string()] } else { Vec::new() },
            errors: Vec::new(),
        })
    }

    async fn put_multiple(&self, entries: Vec<(String, Value)>) -> Result<PutOutcome> {
        let results: Vec<(String, Result<()>)> = stream::iter(entries)
            .map(|(key, body)| async move {
                let result = self.write_object(&key, &body).await;
                (key, result)
            })
            .buffer_unordered(self.write_concurrency)
            .collect()
            .await;

        let mut outcome = PutOutcome::default();
        for (key, result) in results {
            match result {
                Ok(()) => outcome.written.push(key),
                Err(e) => outcome.errors.push(ObjectError::new(key, &e)),
            }
        }
        if !outcome.errors.is_empty() {
            warn!(failed = outcome.errors.len(), "batch put had failures");
        }
        Ok(outcome)
    }

    async fn delete_multiple(&self, keys: &[String]) -> Result<DeleteOutcome> {
        let results: Vec<(String, Result<bool>)> = stream::iter(keys.iter().cloned())
            .map(|key| async move {
                let result = self.remove_object(&key).await;
                (key, result)
            })
            .buffer_unordered(self.write_concurrency)
            .collect()
            .await;

        let mut outcome = DeleteOutcome::default();
        for (key, result) in results {
            match result {
                Ok(true) => outcome.deleted.push(key),
                Ok(false) => {}
                Err(e) => outcome.errors.push(ObjectError::new(key.as_str(), &e)),
            }
        }
        if !outcome.errors.is_empty() {
            warn!(failed = outcome.errors.len(), "batch delete had failures");
        }
        Ok(outcome)
    }

    async fn list_prefix(&self, prefix: &str, request: &ListRequest) -> Result<ListPage> {
        let keys = self.collect_keys(prefix).await?;
        let mut remaining = keys.into_iter().filter(after_token(&request.continuation_token));
        let page_keys: Vec<String> = remaining.by_ref().take(request.page_size).collect();
        let truncated = remaining.next().is_some();
        let next_continuation_token = if truncated { page_keys.last().cloned() } else { None };

        let bodies: Vec<Option<ObjectEntry>> = stream::iter(page_keys)
            .map(|key| async move {
                let path = self.path_for(&key)?;
                Ok::<_, SongoError>(self.read_object(&path).await?.map(|body| ObjectEntry { key, body }))
            })
            .buffered(self.write_concurrency)
            .collect::<Vec<Result<_>>>()
            .await
            .into_iter()
            .collect::<Result<_>>()?;
        // An object deleted between listing and reading is skipped
        let entries: Vec<ObjectEntry> = bodies.into_iter().flatten().collect();

        Ok(ListPage {
            key_count: entries.len(),
            entries,
            truncated,
            page_size: request.page_size,
            next_continuation_token,
        })
    }

    async fn list_common_prefixes(&self, prefix: &str, request: &ListRequest) -> Result<PrefixPage> {
        let keys = self.collect_keys(prefix).await?;
        let mut children: Vec<String> = keys
            .iter()
            .filter_map(|key| key[prefix.len()..].split_once('/').map(|(child, _)| child.to_string()))
            .collect();
        children.sort();
        children.dedup();

        let mut remaining = children.into_iter().filter(after_token(&request.continuation_token));
        let names: Vec<String> = remaining.by_ref().take(request.page_size).collect();
        let truncated = remaining.next().is_some();

        Ok(PrefixPage {
            key_count: names.len(),
            next_continuation_token: if truncated { names.last().cloned() } else { None },
            names,
            truncated,
            page_size: request.page_size,
        })
    }
}
