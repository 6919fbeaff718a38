//! Completed-session verification with a durable verdict cache.
//!
//! Baseline policy: a session verifies when the transport reported it done
//! and its completion bitset is entirely set. When the caller supplied a
//! content digest, the assembled file is additionally hashed and compared.
//! Verdicts are cached by content id; a `verified=true` entry is never
//! overwritten unless the session is explicitly re-downloaded.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::CryptoProvider;

use super::session::ContentSession;
use super::{ContentId, SwarmError};

/// Cached verification verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub verified: bool,
    pub verified_at: DateTime<Utc>,
}

/// Validates completed sessions and caches verdicts durably.
pub struct ContentVerifier {
    crypto: Arc<dyn CryptoProvider>,
    cache: HashMap<ContentId, VerificationRecord>,
    dirty: bool,
}

impl ContentVerifier {
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            crypto,
            cache: HashMap::new(),
            dirty: false,
        }
    }

    /// Seeds the cache from persisted state, keeping existing verified
    /// entries authoritative.
    pub fn load_cache(&mut self, records: HashMap<ContentId, VerificationRecord>) {
        for (content_id, record) in records {
            self.cache.entry(content_id).or_insert(record);
        }
    }

    /// Verifies a session, consulting the cache first.
    ///
    /// A cache hit with `verified=true` skips re-verification entirely.
    ///
    /// # Errors
    /// - `SwarmError::Io` - Digest verification could not read the file
    pub async fn verify(&mut self, session: &ContentSession) -> Result<bool, SwarmError> {
        if let Some(record) = self.cache.get(&session.content_id) {
            if record.verified {
                tracing::debug!("Verification cache hit for {}", session.content_id);
                return Ok(true);
            }
        }

        let mut verified = session.is_complete();

        if verified {
            if let (Some(expected), Some(path)) =
                (session.metadata.content_digest, session.file_path.as_ref())
            {
                let data = tokio::fs::read(path).await?;
                let actual = self.crypto.digest(&data);
                if actual != expected {
                    tracing::warn!("Content digest mismatch for {}", session.content_id);
                    verified = false;
                }
            }
        }

        self.store_verdict(session.content_id, verified);
        Ok(verified)
    }

    fn store_verdict(&mut self, content_id: ContentId, verified: bool) {
        // Never downgrade a verified entry
        if let Some(existing) = self.cache.get(&content_id) {
            if existing.verified && !verified {
                return;
            }
        }
        self.cache.insert(
            content_id,
            VerificationRecord {
                verified,
                verified_at: Utc::now(),
            },
        );
        self.dirty = true;
    }

    /// Drops a cached verdict ahead of an explicit re-download.
    pub fn invalidate(&mut self, content_id: ContentId) {
        if self.cache.remove(&content_id).is_some() {
            self.dirty = true;
        }
    }

    /// Returns the cache for persistence when it changed since the last
    /// flush.
    pub fn take_cache_flush(&mut self) -> Option<HashMap<ContentId, VerificationRecord>> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.cache.clone())
    }

    pub fn cached_verdict(&self, content_id: &ContentId) -> Option<bool> {
        self.cache.get(content_id).map(|record| record.verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ChaChaCrypto;
    use crate::swarm::session::{SessionMetadata, SessionMode, SessionParams};

    fn verifier() -> ContentVerifier {
        ContentVerifier::new(Arc::new(ChaChaCrypto::new()))
    }

    fn complete_session(tag: u8) -> ContentSession {
        let mut session = ContentSession::new(
            SessionParams {
                content_id: ContentId::new([tag; 20]),
                name: "file.bin".to_string(),
                total_size: 4 * 1024,
                piece_size: 1024,
                piece_count: 4,
                mode: SessionMode::Download,
                metadata: SessionMetadata::default(),
                file_path: None,
            },
            "chan".to_string(),
        )
        .unwrap();
        for piece in 0..4 {
            session.complete_piece(piece);
        }
        session
    }

    #[tokio::test]
    async fn complete_bitset_verifies() {
        let mut verifier = verifier();
        let session = complete_session(1);
        assert!(verifier.verify(&session).await.unwrap());
        assert_eq!(verifier.cached_verdict(&session.content_id), Some(true));
    }

    #[tokio::test]
    async fn incomplete_bitset_fails() {
        let mut verifier = verifier();
        let mut session = complete_session(1);
        session.completed_pieces[2] = false;
        assert!(!verifier.verify(&session).await.unwrap());
    }

    #[tokio::test]
    async fn verified_cache_hit_skips_reverification() {
        let mut verifier = verifier();
        let mut session = complete_session(1);
        assert!(verifier.verify(&session).await.unwrap());

        // Even with the bitset cleared, the cached verdict short-circuits
        session.completed_pieces[0] = false;
        assert!(verifier.verify(&session).await.unwrap());
    }

    #[tokio::test]
    async fn invalidate_forces_reverification() {
        let mut verifier = verifier();
        let mut session = complete_session(1);
        assert!(verifier.verify(&session).await.unwrap());

        verifier.invalidate(session.content_id);
        session.completed_pieces[0] = false;
        assert!(!verifier.verify(&session).await.unwrap());
    }

    #[tokio::test]
    async fn digest_mismatch_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.bin");
        tokio::fs::write(&path, b"actual bytes").await.unwrap();

        let mut session = complete_session(2);
        session.file_path = Some(path);
        session.metadata.content_digest = Some([0u8; 32]);

        let mut verifier = verifier();
        assert!(!verifier.verify(&session).await.unwrap());
    }

    #[tokio::test]
    async fn matching_digest_verifies() {
        let crypto = ChaChaCrypto::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.bin");
        tokio::fs::write(&path, b"actual bytes").await.unwrap();

        let mut session = complete_session(2);
        session.file_path = Some(path);
        session.metadata.content_digest = Some(crypto.digest(b"actual bytes"));

        let mut verifier = ContentVerifier::new(Arc::new(crypto));
        assert!(verifier.verify(&session).await.unwrap());
    }

    #[tokio::test]
    async fn flush_only_when_dirty() {
        let mut verifier = verifier();
        assert!(verifier.take_cache_flush().is_none());

        let session = complete_session(3);
        verifier.verify(&session).await.unwrap();

        let flushed = verifier.take_cache_flush().unwrap();
        assert!(flushed.contains_key(&session.content_id));
        assert!(verifier.take_cache_flush().is_none());
    }
}
