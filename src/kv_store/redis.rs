//! A Redis-backed implementation of the [`KvStore`][super::KvStore] trait.
//!
//! Connections are drawn from a bounded [`deadpool_redis`] pool. Checking out a connection
//! waits when the pool is exhausted, bounded by the configured connect timeout, and every
//! command is bounded by the configured read timeout.
use crate::config::RedisConfig;
use crate::error::Error;
use crate::kv_store::KvStore;
use deadpool_redis::redis::{cmd, Cmd, FromRedisValue, RedisResult};
use deadpool_redis::{Pool, PoolConfig, Runtime};
use std::collections::HashSet;
use std::time::Duration;

#[allow(clippy::module_name_repetitions)]
pub struct RedisKvStore {
    pool: Pool,
    read_timeout: Option<Duration>,
}

impl RedisKvStore {
    /// Build the connection pool described by `config`. No connection is opened until the first
    /// command runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the address can't be turned into a Redis URL, and
    /// [`Error::StorePoolSetup`] if the pool can't be created.
    pub fn new(config: &RedisConfig) -> Result<Self, Error> {
        let connect_timeout = non_zero(config.connect_timeout);
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = connect_timeout;
        pool_config.timeouts.create = connect_timeout;
        pool_config.timeouts.recycle = connect_timeout;

        let mut pool_builder = deadpool_redis::Config::from_url(config.url()?);
        pool_builder.pool = Some(pool_config);
        let pool = pool_builder.create_pool(Some(Runtime::Tokio1))?;

        Ok(RedisKvStore {
            pool,
            read_timeout: non_zero(config.read_timeout),
        })
    }

    async fn query<T: FromRedisValue>(&self, command: Cmd) -> Result<T, Error> {
        let mut conn = self.pool.get().await?;
        let reply: RedisResult<T> = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, command.query_async(&mut conn))
                .await
                .map_err(|_| Error::StoreTimeout(limit))?,
            None => command.query_async(&mut conn).await,
        };
        Ok(reply?)
    }
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

#[async_trait::async_trait]
impl KvStore for RedisKvStore {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let mut command = cmd("KEYS");
        command.arg(pattern);
        self.query(command).await
    }

    async fn hkeys(&self, key: &str) -> Result<HashSet<String>, Error> {
        let mut command = cmd("HKEYS");
        command.arg(key);
        self.query(command).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, Error> {
        let mut command = cmd("HGET");
        command.arg(key).arg(field);
        self.query(command).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error> {
        let mut command = cmd("HSET");
        command.arg(key).arg(field).arg(value);
        self.query(command).await
    }

    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, Error> {
        let mut command = cmd("HSETNX");
        command.arg(key).arg(field).arg(value);
        self.query(command).await
    }
}
