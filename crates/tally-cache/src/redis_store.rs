// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis-backed key-value store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ErrorKind, RedisError, RedisResult};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use tally_core::{AdapterType, HealthStatus, KeyTtl, KeyValueStore, PluginAdapter, TallyError};

/// Redis store over one shared multiplexed connection.
///
/// Commands run on clones of the cached connection, so the lock is held only
/// to read or fill the slot. A command that fails at the connection level
/// empties the slot and the next command reconnects.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl RedisStore {
    /// Parse the URL. No connection is made until the first command.
    pub fn new(redis_url: &str) -> Result<Self, TallyError> {
        let client = Client::open(redis_url)
            .map_err(|e| TallyError::Config(format!("invalid redis url: {e}")))?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            connection: Arc::new(Mutex::new(None)),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, TallyError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(TallyError::store)?;
        debug!("redis connection established");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn run<T, F, Fut>(&self, command: F) -> Result<T, TallyError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match command(conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if is_connection_error(&e) {
                    warn!(error = %e, "redis connection lost, reconnecting on next command");
                    self.connection.lock().await.take();
                }
                Err(TallyError::store(e))
            }
        }
    }
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

#[async_trait]
impl PluginAdapter for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::KeyValue
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        let ping = self
            .run(|mut conn| async move {
                let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(pong)
            })
            .await;
        match ping {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        self.connection.lock().await.take();
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TallyError> {
        self.run(|mut conn| async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), TallyError> {
        self.run(|mut conn| async move {
            if ttl_secs == 0 {
                conn.set::<_, _, ()>(key, value).await
            } else {
                conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), TallyError> {
        self.run(|mut conn| async move { conn.del::<_, ()>(key).await }).await
    }

    async fn exists(&self, key: &str) -> Result<bool, TallyError> {
        self.run(|mut conn| async move { conn.exists(key).await }).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, TallyError> {
        let secs: i64 = self.run(|mut conn| async move { conn.ttl(key).await }).await?;
        Ok(match secs {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            s => KeyTtl::Expires(Duration::from_secs(u64::try_from(s).unwrap_or(0))),
        })
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, TallyError> {
        self.run(|mut conn| async move {
            if ttl_secs == 0 {
                return conn.persist(key).await;
            }
            let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
            conn.expire(key, secs).await
        })
        .await
    }

    async fn clear(&self) -> Result<(), TallyError> {
        self.run(|mut conn| async move {
            let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}
