//! Encrypted peer metadata exchange and capability negotiation.
//!
//! Every message crosses the wire as an AEAD ciphertext of a closed tagged
//! union. Unknown tags and malformed payloads are rejected explicitly and
//! surface as security events at the coordinator; they are never propagated.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::crypto::CryptoProvider;

use super::{ContentId, SwarmError};

/// Capabilities negotiated during handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub metadata_exchange: bool,
    pub streaming_stats: bool,
    pub protocol_version: u8,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            metadata_exchange: true,
            streaming_stats: true,
            protocol_version: 1,
        }
    }
}

/// Peer metadata messages. Closed set: unknown tags fail deserialization
/// and are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    HaveMetadata {
        content: ContentId,
        piece_count: u32,
        piece_size: u32,
        total_size: u64,
    },
    RequestMetadata {
        content: ContentId,
    },
    StreamingStats {
        content: ContentId,
        position_secs: f64,
        buffer_health: f32,
    },
    BitfieldUpdate {
        content: ContentId,
        /// Packed completion bits, most significant bit first.
        bitfield: Vec<u8>,
    },
    NetworkInfo {
        upload_limit_bps: u64,
        peer_count: u32,
    },
}

/// Handshake payload exchanged under encryption.
///
/// Carries the session-scoped ephemeral channel id instead of any
/// persistent identity, so peers cannot correlate sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HandshakePayload {
    channel: String,
    capabilities: Capabilities,
}

/// Session-scoped encrypted channel for metadata exchange.
///
/// The key is captured at session creation; identity rotation affects only
/// channels created afterwards.
pub struct SecureChannel {
    crypto: Arc<dyn CryptoProvider>,
    key: [u8; 32],
    channel_id: String,
}

impl SecureChannel {
    /// Creates a channel with a fresh ephemeral identifier.
    pub fn new(crypto: Arc<dyn CryptoProvider>, key: [u8; 32]) -> Self {
        Self {
            crypto,
            key,
            channel_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// The ephemeral identifier used in outbound exchanges.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Builds the encrypted handshake advertising our capabilities.
    ///
    /// # Errors
    /// - `SwarmError::SecureChannel` - Serialization or encryption failed
    pub fn handshake(&self, capabilities: &Capabilities) -> Result<Bytes, SwarmError> {
        let payload = HandshakePayload {
            channel: self.channel_id.clone(),
            capabilities: capabilities.clone(),
        };
        let plaintext = serde_json::to_vec(&payload).map_err(|e| SwarmError::SecureChannel {
            reason: format!("handshake serialization: {e}"),
        })?;
        let ciphertext = self
            .crypto
            .encrypt(&self.key, &plaintext)
            .map_err(|e| SwarmError::SecureChannel {
                reason: e.to_string(),
            })?;
        Ok(Bytes::from(ciphertext))
    }

    /// Decrypts and parses a peer's handshake, returning its capabilities.
    ///
    /// # Errors
    /// - `SwarmError::SecureChannel` - Decryption or parsing failed
    pub fn accept_handshake(&self, payload: &[u8]) -> Result<Capabilities, SwarmError> {
        let plaintext = self.decrypt_raw(payload)?;
        self.parse_handshake(&plaintext)
    }

    /// Decrypts a payload without interpreting it, so the caller can
    /// distinguish decryption failures from malformed messages.
    ///
    /// # Errors
    /// - `SwarmError::SecureChannel` - Authentication or framing failure
    pub fn decrypt_raw(&self, payload: &[u8]) -> Result<Vec<u8>, SwarmError> {
        self.crypto
            .decrypt(&self.key, payload)
            .map_err(|e| SwarmError::SecureChannel {
                reason: e.to_string(),
            })
    }

    /// Parses decrypted bytes as a handshake.
    ///
    /// # Errors
    /// - `SwarmError::SecureChannel` - Not a handshake payload
    pub fn parse_handshake(&self, plaintext: &[u8]) -> Result<Capabilities, SwarmError> {
        let handshake: HandshakePayload =
            serde_json::from_slice(plaintext).map_err(|e| SwarmError::SecureChannel {
                reason: format!("handshake parse: {e}"),
            })?;
        Ok(handshake.capabilities)
    }

    /// Parses decrypted bytes as a metadata message, rejecting unknown tags.
    ///
    /// # Errors
    /// - `SwarmError::SecureChannel` - Unknown tag or malformed payload
    pub fn parse_message(&self, plaintext: &[u8]) -> Result<PeerMessage, SwarmError> {
        serde_json::from_slice(plaintext).map_err(|e| SwarmError::SecureChannel {
            reason: format!("unknown or malformed message: {e}"),
        })
    }

    /// Encrypts an outbound metadata message.
    ///
    /// # Errors
    /// - `SwarmError::SecureChannel` - Serialization or encryption failed
    pub fn encrypt_message(&self, message: &PeerMessage) -> Result<Bytes, SwarmError> {
        let plaintext = serde_json::to_vec(message).map_err(|e| SwarmError::SecureChannel {
            reason: format!("message serialization: {e}"),
        })?;
        let ciphertext = self
            .crypto
            .encrypt(&self.key, &plaintext)
            .map_err(|e| SwarmError::SecureChannel {
                reason: e.to_string(),
            })?;
        Ok(Bytes::from(ciphertext))
    }

    /// Decrypts and parses an inbound metadata message.
    ///
    /// # Errors
    /// - `SwarmError::SecureChannel` - Decryption failed, or the payload is
    ///   not a known message tag
    pub fn decrypt_message(&self, ciphertext: &[u8]) -> Result<PeerMessage, SwarmError> {
        let plaintext = self.decrypt_raw(ciphertext)?;
        self.parse_message(&plaintext)
    }
}

/// Packs a completion bit vector into bytes, most significant bit first.
pub fn pack_bitfield(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (index, &bit) in bits.iter().enumerate() {
        if bit {
            packed[index / 8] |= 0x80 >> (index % 8);
        }
    }
    packed
}
