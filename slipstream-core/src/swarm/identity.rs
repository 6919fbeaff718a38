//! Rotating anonymous peer identity and its symmetric key.
//!
//! Exactly one identity is live at a time. Rotation applies to new session
//! channels only; connections established under the previous identity are
//! grandfathered until their sessions end.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::CryptoProvider;

/// Rotating (id, created-at, encryption key) triple. Persisted so restarts
/// do not force a rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    #[serde(with = "hex_20")]
    pub id: [u8; 20],
    pub created_at: DateTime<Utc>,
    #[serde(with = "hex_32")]
    pub key: [u8; 32],
}

mod hex_20 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 20], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 20 bytes"))
    }
}

mod hex_32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

impl Identity {
    /// Short hex prefix for logging without exposing the full id.
    pub fn short_id(&self) -> String {
        hex::encode(&self.id[..4])
    }
}

/// Maintains the live identity and rotates it past the configured age.
pub struct IdentityManager {
    crypto: Arc<dyn CryptoProvider>,
    current: Identity,
    rotation_interval: Duration,
}

impl IdentityManager {
    /// Creates a manager with a freshly generated identity.
    pub fn new(crypto: Arc<dyn CryptoProvider>, rotation_interval: Duration) -> Self {
        let current = Self::generate(crypto.as_ref());
        Self {
            crypto,
            current,
            rotation_interval,
        }
    }

    /// Resumes a persisted identity; rotation eligibility is re-checked on
    /// the normal schedule.
    pub fn with_identity(
        crypto: Arc<dyn CryptoProvider>,
        identity: Identity,
        rotation_interval: Duration,
    ) -> Self {
        Self {
            crypto,
            current: identity,
            rotation_interval,
        }
    }

    fn generate(crypto: &dyn CryptoProvider) -> Identity {
        let mut id = [0u8; 20];
        let mut key = [0u8; 32];
        crypto.random_bytes(&mut id);
        crypto.random_bytes(&mut key);
        Identity {
            id,
            created_at: Utc::now(),
            key,
        }
    }

    pub fn current(&self) -> &Identity {
        &self.current
    }

    /// Rotates when the live identity's age exceeds the interval.
    ///
    /// Returns true if a rotation happened. Existing session channels keep
    /// the key they captured at creation.
    pub fn rotate_if_due(&mut self) -> bool {
        let age = Utc::now().signed_duration_since(self.current.created_at);
        let interval =
            chrono::Duration::from_std(self.rotation_interval).unwrap_or(chrono::Duration::MAX);

        if age < interval {
            return false;
        }

        let old = self.current.short_id();
        self.current = Self::generate(self.crypto.as_ref());
        tracing::info!(
            "Rotated peer identity {old} -> {}",
            self.current.short_id()
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ChaChaCrypto;

    fn crypto() -> Arc<dyn CryptoProvider> {
        Arc::new(ChaChaCrypto::new())
    }

    #[test]
    fn fresh_identity_is_not_due() {
        let mut manager = IdentityManager::new(crypto(), Duration::from_secs(3600));
        assert!(!manager.rotate_if_due());
    }

    #[test]
    fn aged_identity_rotates() {
        let mut manager = IdentityManager::new(crypto(), Duration::from_secs(3600));
        let old_id = manager.current().id;
        let old_key = manager.current().key;

        manager.current.created_at = Utc::now() - chrono::Duration::hours(2);
        assert!(manager.rotate_if_due());
        assert_ne!(manager.current().id, old_id);
        assert_ne!(manager.current().key, old_key);
    }

    #[test]
    fn persisted_identity_round_trip() {
        let manager = IdentityManager::new(crypto(), Duration::from_secs(3600));
        let json = serde_json::to_string(manager.current()).unwrap();
        let restored: Identity = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, manager.current().id);
        assert_eq!(restored.key, manager.current().key);

        let resumed = IdentityManager::with_identity(crypto(), restored, Duration::from_secs(3600));
        assert_eq!(resumed.current().id, manager.current().id);
    }
}
