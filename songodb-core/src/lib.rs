// songodb-core/src/lib.rs
// Document query and mutation engine over flat object storage

pub mod collection;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod explain;
pub mod find_options;
pub mod logging;
pub mod namespace;
pub mod query;
pub mod scan;
pub mod sort;
pub mod storage;
pub mod update;
pub mod value_utils;

// Public exports
pub use collection::{
    Collection, DeleteResult, FindResult, InsertManyResult, InsertOneResult, UpdateResult,
    UpsertedId,
};
pub use config::EngineConfig;
pub use database::{Database, DropResult, Instance, ListResult};
pub use document::{Document, DocumentId};
pub use error::{ErrorClass, Result, SongoError};
pub use explain::Explain;
pub use find_options::{FindOptions, ListOptions, ScanOptions, UpdateOptions};
pub use logging::LogLevel;
pub use namespace::Namespace;
pub use query::Filter;
pub use sort::{SortDirection, SortSpec};
pub use storage::{FileObjectStore, MemoryStore, ObjectStore};
pub use update::UpdateSpec;
