//! Error types.

use deadpool_redis::redis::RedisError;
use std::time::Duration;
use trust_dns_proto::error::ProtoError;

/// Error enumerates the possible redzone error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when the Redis server rejects or fails a command.
    #[error("store error: {0}")]
    Store(#[from] RedisError),

    /// Returned when no pooled store connection could be checked out, e.g. because the pool is
    /// exhausted and the wait timeout elapsed, or because a new connection couldn't be opened.
    #[error("store connection unavailable: {0}")]
    StorePool(#[from] deadpool_redis::PoolError),

    /// Returned when the store connection pool can't be built from the
    /// [`StoreConfig`][`crate::config::StoreConfig`].
    #[error("can't create store connection pool: {0}")]
    StorePoolSetup(#[from] deadpool_redis::CreatePoolError),

    /// Returned when a single store command outlives the configured read timeout.
    #[error("store command timed out after {0:?}")]
    StoreTimeout(Duration),

    /// Returned when a zone name handed to the [`ZoneStore`][`crate::kv_store::ZoneStore`]
    /// isn't fully qualified.
    #[error("zone name is not a fully qualified name: \"{0}\"")]
    NotFQDN(String),

    /// Returned when the configuration is syntactically valid JSON but semantically unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON fails, e.g. when
    /// [loading a `Config`][crate::config::Config::try_from_file], or
    /// [loading a `FileKvStore`][crate::kv_store::file::FileKvStore::try_from_file].
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when the redzone DNS server encounters a generic DNS protocol error.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),
}
