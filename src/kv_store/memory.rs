use crate::error::Error;
use crate::kv_store::{glob_match, KvStore};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Hash-of-hashes state shared by the in-memory and file-backed stores.
pub type Hashes = HashMap<String, HashMap<String, String>>;

#[derive(Default, Debug)]
pub struct InMemoryKvStore {
    hashes: RwLock<Hashes>,
}

impl InMemoryKvStore {
    pub fn from_hashes(hashes: Hashes) -> Self {
        InMemoryKvStore {
            hashes: RwLock::new(hashes),
        }
    }

    /// A copy of the complete store state.
    pub async fn snapshot(&self) -> Hashes {
        self.hashes.read().await.clone()
    }
}

#[async_trait::async_trait]
impl KvStore for InMemoryKvStore {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let mut keys: Vec<String> = self
            .hashes
            .read()
            .await
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn hkeys(&self, key: &str) -> Result<HashSet<String>, Error> {
        Ok(self
            .hashes
            .read()
            .await
            .get(key)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, Error> {
        Ok(self
            .hashes
            .read()
            .await
            .get(key)
            .and_then(|fields| fields.get(field))
            .cloned())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error> {
        self.hashes
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, Error> {
        let mut hashes = self.hashes.write().await;
        let fields = hashes.entry(key.to_string()).or_default();
        if fields.contains_key(field) {
            return Ok(false);
        }
        fields.insert(field.to_string(), value.to_string());
        Ok(true)
    }
}
