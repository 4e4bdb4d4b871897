//! Redis key-value backend
//!
//! Speaks to a Redis server through one multiplexed connection, opened on
//! first use and shared by every call. Each primitive is a single command
//! (GET, SET, LPUSH, LTRIM, LRANGE), so the store's multi-step protocol keeps
//! the same per-step semantics it has on the other backends.

use crate::backend::{BackendError, BackendResult, KvBackend};
use crate::config::RedisConfig;
use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::{Client, IntoConnectionInfo, RedisError};
use tokio::sync::OnceCell;
use tracing::debug;

fn redis_err(key: &str, e: RedisError) -> BackendError {
    if e.code() == Some("WRONGTYPE") {
        BackendError::WrongType { key: key.to_string() }
    } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        BackendError::Unavailable(format!("Redis: {}", e))
    } else {
        BackendError::Database(format!("Redis: {}", e))
    }
}

fn settings_err(e: RedisError) -> BackendError {
    BackendError::Database(format!("Invalid Redis connection settings: {}", e))
}

impl RedisConfig {
    /// Connection details: `url` when set, otherwise host, port, password
    /// and database
    pub fn connection_info(&self) -> BackendResult<redis::ConnectionInfo> {
        if let Some(url) = &self.url {
            return url.as_str().into_connection_info().map_err(settings_err);
        }

        let mut info = (self.host.as_str(), self.port)
            .into_connection_info()
            .map_err(settings_err)?;
        info.redis.db = self.database;
        info.redis.password = self.password.clone();
        Ok(info)
    }
}

/// Redis key-value backend
pub struct RedisBackend {
    client: Client,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisBackend {
    /// Prepare a client for `config`; nothing is dialed until the first call
    pub fn open(config: &RedisConfig) -> BackendResult<Self> {
        let client = Client::open(config.connection_info()?).map_err(settings_err)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> BackendResult<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                debug!("Connecting to Redis at {}", self.client.get_connection_info().addr);
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| BackendError::Unavailable(format!("Failed to connect to Redis: {}", e)))
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err(key, e))?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(&value[..])
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err(key, e))?;
        Ok(())
    }

    async fn list_push_front(&self, key: &str, value: Bytes) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(&value[..])
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err(key, e))?;
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("LTRIM")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err(key, e))?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<Bytes>> {
        let mut conn = self.connection().await?;
        let values: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err(key, e))?;
        Ok(values.into_iter().map(Bytes::from).collect())
    }
}
