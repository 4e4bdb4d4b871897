//! In-memory key-value backend
//!
//! Process-local store used by tests and by the `memory` backend setting.
//! It can be told to fail a specific primitive on its next call and records
//! every primitive it was asked to run, so callers can observe how a
//! multi-step protocol behaves when the store gives out halfway.

use crate::backend::{resolve_range, BackendError, BackendResult, KvBackend, Operation};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, RwLock};

/// A stored value
#[derive(Debug, Clone)]
enum Entry {
    Scalar(Bytes),
    List(VecDeque<Bytes>),
}

/// In-memory backend
#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,

    /// Primitives scheduled to fail on their next invocation
    faults: Mutex<Vec<Operation>>,

    /// Every primitive invoked, in call order
    journal: Mutex<Vec<Operation>>,
}

impl InMemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call to `op` fail with [`BackendError::Unavailable`]
    pub async fn fail_next(&self, op: Operation) {
        self.faults.lock().await.push(op);
    }

    /// Primitives served so far, including the ones that failed
    pub async fn operations(&self) -> Vec<Operation> {
        self.journal.lock().await.clone()
    }

    /// Forget the recorded operations
    pub async fn clear_operations(&self) {
        self.journal.lock().await.clear();
    }

    async fn enter(&self, op: Operation) -> BackendResult<()> {
        self.journal.lock().await.push(op);

        let mut faults = self.faults.lock().await;
        if let Some(pos) = faults.iter().position(|f| *f == op) {
            faults.remove(pos);
            return Err(BackendError::Unavailable(format!(
                "injected failure on {:?}",
                op
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        self.enter(Operation::Get).await?;

        let entries = self.entries.read().await;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Scalar(value)) => Ok(Some(value.clone())),
            Some(Entry::List(_)) => Err(BackendError::WrongType { key: key.to_string() }),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> BackendResult<()> {
        self.enter(Operation::Set).await?;

        // Replaces lists as well as scalars
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry::Scalar(value));
        Ok(())
    }

    async fn list_push_front(&self, key: &str, value: Bytes) -> BackendResult<()> {
        self.enter(Operation::ListPushFront).await?;

        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));

        match entry {
            Entry::List(list) => {
                list.push_front(value);
                Ok(())
            }
            Entry::Scalar(_) => Err(BackendError::WrongType { key: key.to_string() }),
        }
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> BackendResult<()> {
        self.enter(Operation::ListTrim).await?;

        let mut entries = self.entries.write().await;
        let list = match entries.get_mut(key) {
            None => return Ok(()),
            Some(Entry::List(list)) => list,
            Some(Entry::Scalar(_)) => {
                return Err(BackendError::WrongType { key: key.to_string() });
            }
        };

        match resolve_range(list.len(), start, stop) {
            Some((first, last)) => {
                list.truncate(last + 1);
                list.drain(..first);
            }
            None => list.clear(),
        }

        if list.is_empty() {
            entries.remove(key);
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<Bytes>> {
        self.enter(Operation::ListRange).await?;

        let entries = self.entries.read().await;
        let list = match entries.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry::List(list)) => list,
            Some(Entry::Scalar(_)) => {
                return Err(BackendError::WrongType { key: key.to_string() });
            }
        };

        Ok(match resolve_range(list.len(), start, stop) {
            Some((first, last)) => list.range(first..=last).cloned().collect(),
            None => Vec::new(),
        })
    }
}
