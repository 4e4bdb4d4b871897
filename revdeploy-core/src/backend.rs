//! Key-value backend abstraction
//!
//! The revision store talks to its key-value store only through [`KvBackend`].
//! The store offers scalar get/set and a handful of list primitives, with no
//! atomicity across calls.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while talking to a key-value backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Backend primitives, named after the operation they perform on the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Set,
    ListPushFront,
    ListTrim,
    ListRange,
}

/// Capability interface every key-value store must satisfy
///
/// List indices are inclusive and signed: negative values count from the
/// tail, so `(0, -1)` spans the whole list. Indices past either end are
/// clamped.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read a scalar value, `None` if the key is absent
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>>;

    /// Write a scalar value, replacing whatever was there
    async fn set(&self, key: &str, value: Bytes) -> BackendResult<()>;

    /// Push a value onto the head of a list, creating the list if needed
    async fn list_push_front(&self, key: &str, value: Bytes) -> BackendResult<()>;

    /// Keep only the elements in `start..=stop`, dropping the rest
    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> BackendResult<()>;

    /// Read the elements in `start..=stop`
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<Bytes>>;
}

#[async_trait]
impl<T: KvBackend + ?Sized> KvBackend for Arc<T> {
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes) -> BackendResult<()> {
        (**self).set(key, value).await
    }

    async fn list_push_front(&self, key: &str, value: Bytes) -> BackendResult<()> {
        (**self).list_push_front(key, value).await
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> BackendResult<()> {
        (**self).list_trim(key, start, stop).await
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<Bytes>> {
        (**self).list_range(key, start, stop).await
    }
}

#[async_trait]
impl<T: KvBackend + ?Sized> KvBackend for Box<T> {
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes) -> BackendResult<()> {
        (**self).set(key, value).await
    }

    async fn list_push_front(&self, key: &str, value: Bytes) -> BackendResult<()> {
        (**self).list_push_front(key, value).await
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> BackendResult<()> {
        (**self).list_trim(key, start, stop).await
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<Bytes>> {
        (**self).list_range(key, start, stop).await
    }
}

/// Resolve signed inclusive list indices against a list of length `len`.
///
/// Returns the inclusive `(first, last)` positions, or `None` when the
/// window is empty.
pub(crate) fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };

    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len {
        return None;
    }

    Some((start as usize, stop as usize))
}
