//! Revision store and backend configuration

use crate::backend::{BackendResult, KvBackend};
use crate::error::{Result, RevisionStoreError};
use crate::memory::InMemoryBackend;
use crate::redis_backend::RedisBackend;
use crate::sqlite::SqliteBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Number of recent uploads kept per prefix unless configured otherwise
pub const DEFAULT_MAX_RECENT_UPLOADS: usize = 10;

/// Revision tag used when the caller does not supply one
pub const DEFAULT_REVISION: &str = "default";

/// Behaviour knobs for [`crate::RevisionStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Length of the recent-uploads list, and so of the activation window
    pub max_recent_uploads: usize,
    /// Whether `upload` may replace an artifact that already exists
    pub allow_overwrite: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_recent_uploads: DEFAULT_MAX_RECENT_UPLOADS,
            allow_overwrite: false,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_recent_uploads == 0 {
            return Err(RevisionStoreError::InvalidArgument(
                "max_recent_uploads must be at least 1".to_string(),
            ));
        }
        // List indices are signed 64-bit
        if i64::try_from(self.max_recent_uploads).is_err() {
            return Err(RevisionStoreError::InvalidArgument(format!(
                "max_recent_uploads must be at most {}",
                i64::MAX
            )));
        }
        Ok(())
    }
}

/// Redis connection settings
///
/// `url` wins when set; otherwise the server is reached at `host:port`,
/// authenticating with `password` if given and selecting `database`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            database: 0,
        }
    }
}

/// Which key-value backend to publish into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Process-local store, gone when the process exits
    Memory,
    /// SQLite file on local disk
    Sqlite { path: PathBuf },
    /// Redis server
    Redis(RedisConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Sqlite {
            path: PathBuf::from(".revdeploy/store.sqlite"),
        }
    }
}

impl BackendConfig {
    /// Open the configured backend
    pub fn open(&self) -> BackendResult<Box<dyn KvBackend>> {
        match self {
            BackendConfig::Memory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Sqlite { path } => Ok(Box::new(SqliteBackend::open(path)?)),
            BackendConfig::Redis(redis) => Ok(Box::new(RedisBackend::open(redis)?)),
        }
    }
}
