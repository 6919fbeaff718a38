//! Crypto provider seam: symmetric encryption, secure randomness, one-way hashing.
//!
//! The coordinator never touches cipher primitives directly; everything goes
//! through [`CryptoProvider`] so tests can substitute deterministic doubles.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Length of the random nonce prefixed to every ciphertext.
const NONCE_LEN: usize = 12;

/// Errors from cryptographic operations.
///
/// Deliberately carries no plaintext or key material in messages.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("ciphertext too short")]
    TruncatedCiphertext,
}

/// Symmetric crypto operations required by the swarm subsystem.
///
/// Implementations must be safe to share across the coordinator task and
/// any helper tasks it spawns.
pub trait CryptoProvider: Send + Sync {
    /// Encrypts plaintext under a 32-byte symmetric key.
    ///
    /// The returned buffer is self-contained: implementations embed whatever
    /// nonce or framing they need to decrypt it later.
    ///
    /// # Errors
    /// - `CryptoError::EncryptionFailed` - AEAD encryption rejected the input
    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypts a buffer produced by [`CryptoProvider::encrypt`] with the same key.
    ///
    /// # Errors
    /// - `CryptoError::TruncatedCiphertext` - Buffer shorter than the nonce framing
    /// - `CryptoError::DecryptionFailed` - Authentication tag mismatch or corrupt data
    fn decrypt(&self, key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Fills the buffer with cryptographically secure random bytes.
    fn random_bytes(&self, buf: &mut [u8]);

    /// One-way hash of arbitrary data, used for content digests.
    fn digest(&self, data: &[u8]) -> [u8; 32];
}

/// Production provider: ChaCha20-Poly1305 AEAD with a random nonce prefix,
/// SHA-256 digests, and OS randomness.
#[derive(Debug, Default, Clone)]
pub struct ChaChaCrypto;

impl ChaChaCrypto {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for ChaChaCrypto {
    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        // Wire format: nonce || ciphertext
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() <= NONCE_LEN {
            return Err(CryptoError::TruncatedCiphertext);
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let (nonce_bytes, payload) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, payload)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    fn random_bytes(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }

    fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}
