//! File-backed key-value store: one JSON file per key.
//!
//! Keeping every record in its own file means a torn write or corrupt file
//! damages exactly one record. Writes go to a temp file first and are
//! renamed into place.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{KvStore, StorageError};

const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Durable store writing `<dir>/<key>.json` per record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates the store, creating the directory if needed.
    ///
    /// # Errors
    /// - `StorageError::Io` - Directory cannot be created
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn record_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        // Keys are fixed identifiers, never user input; reject anything that
        // could escape the storage directory.
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.record_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.record_path(key)?;
        let temp_path = self.dir.join(format!("{key}.json{TEMP_FILE_SUFFIX}"));

        tokio::fs::write(&temp_path, value).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.record_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::new(dir.path()).await.unwrap();
            store.put("stats", b"{\"total\":1}").await.unwrap();
        }

        let store = JsonFileStore::new(dir.path()).await.unwrap();
        assert_eq!(
            store.get("stats").await.unwrap(),
            Some(b"{\"total\":1}".to_vec())
        );
    }

    #[tokio::test]
    async fn keys_are_independent_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).await.unwrap();

        store.put("blacklist", b"[]").await.unwrap();
        store.put("policy", b"{}").await.unwrap();

        assert!(dir.path().join("blacklist.json").exists());
        assert!(dir.path().join("policy.json").exists());

        store.remove("blacklist").await.unwrap();
        assert_eq!(store.get("blacklist").await.unwrap(), None);
        assert!(store.get("policy").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejects_path_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).await.unwrap();

        let result = store.put("../escape", b"x").await;
        assert!(matches!(result, Err(StorageError::InvalidKey { .. })));
    }
}
