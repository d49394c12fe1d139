// src/scan.rs
//! Scan/pagination adapter
//!
//! Turns one bounded storage listing into a page of documents and layers
//! filter, sort, skip and limit over that page. Nothing here ever reads a
//! second page: a caller that wants the full result set follows
//! `next_continuation_token` itself.

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SongoError};
use crate::explain::{millis, Explain, ScanStats};
use crate::find_options::{apply_limit_skip, FindOptions, ScanOptions};
use crate::query::Filter;
use crate::storage::{ListRequest, ObjectEntry, ObjectStore};

/// One bounded listing, wrapped verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage {
    pub entries: Vec<ObjectEntry>,
    pub truncated: bool,
    pub key_count: usize,
    pub page_size: usize,
    pub next_continuation_token: Option<String>,
    pub elapsed: Duration,
}

impl ScanPage {
    pub fn stats(&self) -> ScanStats {
        ScanStats {
            is_truncated: self.truncated,
            key_count: self.key_count,
            max_keys: self.page_size,
            next_continuation_token: self.next_continuation_token.clone(),
            time_millis: millis(self.elapsed),
        }
    }

    /// A page with no entries, as read for a key that cannot exist
    pub fn empty(page_size: usize) -> Self {
        ScanPage {
            entries: Vec::new(),
            truncated: false,
            key_count: 0,
            page_size,
            next_continuation_token: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn into_documents(self) -> Vec<Value> {
        self.entries.into_iter().map(|e| e.body).collect()
    }

    /// Entries whose body matches `filter`, in listing order
    pub fn matching(self, filter: &Filter) -> Vec<ObjectEntry> {
        self.entries.into_iter().filter(|e| filter.matches(&e.body)).collect()
    }
}

/// Fetch one page of objects under `prefix`
pub async fn scan<S: ObjectStore>(store: &S, prefix: &str, options: &ScanOptions) -> Result<ScanPage> {
    options.validate()?;
    let started = Instant::now();
    let request = ListRequest::new(options.page_size).after(options.continuation_token.clone());
    let listing = store.list_prefix(prefix, &request).await?;
    if listing.entries.len() > options.page_size {
        return Err(SongoError::Storage(format!(
            "listing of {} returned {} entries for a page of {}",
            prefix,
            listing.entries.len(),
            options.page_size
        )));
    }
    let elapsed = started.elapsed();
    debug!(
        prefix,
        key_count = listing.key_count,
        truncated = listing.truncated,
        "scanned prefix"
    );

    Ok(ScanPage {
        entries: listing.entries,
        truncated: listing.truncated,
        key_count: listing.key_count,
        page_size: listing.page_size,
        next_continuation_token: listing.next_continuation_token,
        elapsed,
    })
}

/// Read a single key and present it as a page of zero or one entries
pub async fn point_lookup<S: ObjectStore>(store: &S, key: &str, page_size: usize) -> Result<ScanPage> {
    let started = Instant::now();
    let body = store.get_one(key).await?;
    let elapsed = started.elapsed();
    debug!(key, found = body.is_some(), "point lookup");

    let entries: Vec<ObjectEntry> = body
        .map(|body| ObjectEntry {
            key: key.to_string(),
            body,
        })
        .into_iter()
        .collect();
    Ok(ScanPage {
        key_count: entries.len(),
        entries,
        truncated: false,
        page_size,
        next_continuation_token: None,
        elapsed,
    })
}

/// Filter, then sort, then skip, then limit one page of documents
pub fn finish_page<I>(documents: I, filter: &Filter, options: &FindOptions) -> Vec<Value>
where
    I: IntoIterator<Item = Value>,
{
    let mut docs: Vec<Value> = documents.into_iter().filter(|d| filter.matches(d)).collect();
    if let Some(sort) = &options.sort {
        sort.sort(&mut docs);
    }
    apply_limit_skip(docs, options.limit, options.skip)
}

/// Scan one page under `prefix` and finish it with `filter` and `options`
pub async fn query_page<S: ObjectStore>(
    store: &S,
    prefix: &str,
    filter: &Filter,
    options: &FindOptions,
) -> Result<(Vec<Value>, Explain)> {
    let started = Instant::now();
    let page = scan(store, prefix, &options.scan).await?;
    let stats = page.stats();
    let docs = finish_page(page.into_documents(), filter, options);
    let explain = Explain::build(stats, docs.len(), started.elapsed());
    Ok((docs, explain))
}
