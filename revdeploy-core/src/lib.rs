//! revdeploy Core Library
//!
//! Revisioned artifact publishing on top of a plain key-value store:
//! - Backend capability trait (get/set plus list push/trim/range)
//! - In-memory backend for tests and throwaway runs
//! - SQLite backend for local, persistent publishing
//! - Redis backend for publishing to a shared server
//! - Revision store: upload, activate, and revision queries

pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
pub mod redis_backend;
pub mod sqlite;
pub mod store;

pub use backend::{BackendError, BackendResult, KvBackend, Operation};
pub use config::{BackendConfig, RedisConfig, StoreConfig, DEFAULT_MAX_RECENT_UPLOADS, DEFAULT_REVISION};
pub use error::{Result, RevisionStoreError};
pub use memory::InMemoryBackend;
pub use redis_backend::RedisBackend;
pub use sqlite::SqliteBackend;
pub use store::{artifact_key, current_key, RevisionStore, RevisionSummary, CURRENT_TAG};
