//! Durable key-value storage seam.
//!
//! The swarm subsystem persists a handful of independently-keyed records
//! (stats, verification cache, blacklist, policy, identity) so partial
//! corruption of one record never invalidates the others. Storage mechanics
//! beyond this contract belong to the embedding application.

mod json;
mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Well-known record keys.
pub mod keys {
    pub const STATS: &str = "stats";
    pub const VERIFICATION: &str = "verification";
    pub const BLACKLIST: &str = "blacklist";
    pub const POLICY: &str = "policy";
    pub const IDENTITY: &str = "identity";
}

/// Errors from durable storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("invalid storage key: {key}")]
    InvalidKey { key: String },
}

/// Minimal durable key-value contract consumed by the coordinator.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads the raw value for a key, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes the value for a key, replacing any previous value atomically.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Removes a key; no-op if absent.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Reads and JSON-decodes a record.
///
/// A record that fails to decode is treated as absent rather than fatal, so
/// one corrupt record never takes the subsystem down; the corruption is
/// logged and the record will be rewritten on the next flush.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(error) => {
            tracing::warn!("Discarding corrupt record '{key}': {error}");
            Ok(None)
        }
    }
}

/// JSON-encodes and writes a record.
pub async fn put_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_vec(value).map_err(|e| StorageError::Serialization {
        reason: e.to_string(),
    })?;
    store.put(key, &raw).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_helpers_round_trip() {
        let store = MemoryStore::new();
        put_json(&store, "numbers", &vec![1u32, 2, 3]).await.unwrap();

        let loaded: Option<Vec<u32>> = get_json(&store, "numbers").await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_absent() {
        let store = MemoryStore::new();
        store.put("stats", b"{not json").await.unwrap();

        let loaded: Option<Vec<u32>> = get_json(&store, "stats").await.unwrap();
        assert_eq!(loaded, None);
    }
}
