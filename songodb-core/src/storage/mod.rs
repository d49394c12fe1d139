// src/storage/mod.rs
//! Object storage backends
//!
//! The engine talks to storage only through [`ObjectStore`]. Keys are
//! `instance/database/collection/id` paths and bodies are JSON documents.

pub mod file_storage;
pub mod memory_storage;
pub mod traits;

pub use file_storage::{FileObjectStore, DEFAULT_WRITE_CONCURRENCY};
pub use memory_storage::MemoryStore;
pub use traits::{
    validate_key, DeleteOutcome, ListPage, ListRequest, ObjectEntry, ObjectError, ObjectStore,
    PrefixPage, PutOutcome,
};
