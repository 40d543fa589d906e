//! Key-value storage of zone data.
//!
//! Zones are kept in an external hash-of-hashes store: one hash per zone, keyed by
//! `key_prefix + zone + key_suffix`, whose fields are the zone's locations and whose values are
//! JSON [`Record`][crate::zone::Record] documents. The [`KvStore`] trait describes the handful
//! of primitives redzone needs from such a store, and [`ZoneStore`] translates zone and record
//! lookups into those primitives.
//!
//! Three implementations are provided. [`redis::RedisKvStore`] talks to a Redis server through a
//! bounded connection pool and is what production deployments use. [`memory::InMemoryKvStore`]
//! is not durable across restarts. [`file::FileKvStore`] writes its state to disk for each
//! update and loads this state again on startup.

use crate::error::Error;
use std::collections::HashSet;
use std::sync::Arc;

pub mod file;
pub mod memory;
pub mod redis;
mod zone_store;

#[allow(clippy::module_name_repetitions)]
pub use file::FileKvStore;
#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryKvStore;
#[allow(clippy::module_name_repetitions)]
pub use redis::RedisKvStore;
pub use zone_store::ZoneStore;

/// `DynKvStore` is a type alias for a [`KvStore`] shared by every concurrent query task.
/// Implementations synchronize internally, so no outer lock is needed.
#[allow(clippy::module_name_repetitions)]
pub type DynKvStore = Arc<dyn KvStore + Send + Sync>;

/// An async trait describing the subset of a hash-of-hashes key-value store used to serve zones.
#[async_trait::async_trait]
pub trait KvStore {
    /// List every top level key matching a glob `pattern` (`*` and `?` wildcards).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error>;

    /// List the field names of the hash stored at `key`. Missing keys have no fields.
    async fn hkeys(&self, key: &str) -> Result<HashSet<String>, Error>;

    /// Get the value of `field` in the hash stored at `key` (if any).
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, Error>;

    /// Set `field` in the hash stored at `key`, replacing any previous value.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error>;

    /// Set `field` in the hash stored at `key` only if it doesn't exist yet. Returns whether the
    /// value was written.
    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, Error>;
}

/// Match `text` against a glob `pattern` where `*` matches any run of characters and `?`
/// matches exactly one.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
