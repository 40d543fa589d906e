//! A JSON file-backed implementation of the [`KvStore`][super::KvStore] trait.
//!
//! Wraps a [`InMemoryKvStore`][super::memory::InMemoryKvStore] instance, persisting
//! updates to a JSON file on disk that can be reloaded across restarts.
use crate::error::Error;
use crate::kv_store::memory::{Hashes, InMemoryKvStore};
use crate::kv_store::KvStore;
use std::collections::HashSet;
use std::io::ErrorKind;
use tokio::fs::File;
use tokio::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

/// A file-backed key-value store. After each write a JSON file on disk is updated with the new
/// data. This file can be reloaded across restarts to avoid losing state, and is handy for
/// hand-editing zones in small deployments that don't run a Redis server.
///
/// Wraps a [`InMemoryKvStore`][super::memory::InMemoryKvStore], operating the same way except
/// for maintaining state beyond in-memory.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct FileKvStore {
    kv_store: InMemoryKvStore,
    path: String,
    save_lock: Mutex<()>,
}

impl FileKvStore {
    /// Save the state of the store as JSON to the store's configured path, or return an Error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJSON`] if the state can't be serialized to JSON.
    ///
    /// Returns [`Error::IO`] if the serialized state can't be written to the backing file path.
    pub async fn save(&self) -> Result<(), Error> {
        let _guard = self.save_lock.lock().await;
        let data = serde_json::to_string_pretty(&self.kv_store.snapshot().await)?;
        let mut output_file = File::create(&self.path).await?;
        output_file.write_all(data.as_bytes()).await?;
        output_file.flush().await?;
        Ok(())
    }

    /// Load a [`FileKvStore`] from the JSON state located at the given path, or return
    /// an Error. A missing file is created holding an empty state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJSON`] if the JSON state file is invalid.
    ///
    /// Returns [`Error::IO`] if the path can't be opened or read.
    pub async fn try_from_file(p: &str) -> Result<Self, Error> {
        let contents = match File::open(p).await {
            Ok(mut f) => {
                let mut buf = vec![];
                f.read_to_end(&mut buf).await?;
                buf
            }
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Self::write_empty_state(File::create(&p).await?).await?,
                _ => return Err(Error::IO(err)),
            },
        };

        let hashes: Hashes = serde_json::from_slice(&contents)?;
        Ok(Self {
            kv_store: InMemoryKvStore::from_hashes(hashes),
            path: p.to_string(),
            save_lock: Mutex::default(),
        })
    }

    async fn write_empty_state(mut f: File) -> io::Result<Vec<u8>> {
        let default_data = serde_json::to_string_pretty(&Hashes::default())?;
        let default_bytes = default_data.as_bytes();
        f.write_all(default_bytes).await?;
        f.flush().await?;
        Ok(default_bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl KvStore for FileKvStore {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        self.kv_store.keys(pattern).await
    }

    async fn hkeys(&self, key: &str) -> Result<HashSet<String>, Error> {
        self.kv_store.hkeys(key).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, Error> {
        self.kv_store.hget(key, field).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), Error> {
        self.kv_store.hset(key, field, value).await?;
        self.save().await
    }

    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, Error> {
        let written = self.kv_store.hset_nx(key, field, value).await?;
        if written {
            self.save().await?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        let path = path.to_str().unwrap();

        let store = FileKvStore::try_from_file(path).await.unwrap();
        assert!(store.keys("*").await.unwrap().is_empty());
        store
            .hset("_dns:example.com.", "www", r#"{"a":[{"ip":"192.0.2.1"}]}"#)
            .await
            .unwrap();
        assert!(store.hset_nx("_dns:example.com.", "@", "{}").await.unwrap());
        drop(store);

        let reloaded = FileKvStore::try_from_file(path).await.unwrap();
        assert_eq!(
            reloaded.hget("_dns:example.com.", "www").await.unwrap(),
            Some(r#"{"a":[{"ip":"192.0.2.1"}]}"#.to_string())
        );
        assert_eq!(reloaded.hkeys("_dns:example.com.").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_state_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let res = FileKvStore::try_from_file(path.to_str().unwrap()).await;
        assert!(matches!(res, Err(Error::InvalidJSON(_))));
    }
}
