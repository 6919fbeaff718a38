//! Swarm coordination: sessions, scheduling, peer health, governance,
//! secure metadata exchange, verification, and statistics.

pub mod coordinator;
pub mod events;
pub mod governor;
pub mod health;
pub mod identity;
pub mod scheduler;
pub mod secure;
pub mod session;
pub mod stats;
pub mod transport;
pub mod verifier;

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use coordinator::{SessionHandle, SwarmHandle, spawn_swarm_coordinator};
pub use events::{BandwidthAction, ErrorKind, SecurityKind, SwarmEvent};
pub use governor::{GovernorDecision, PauseReason, ResourceGovernor, UserPolicy};
pub use health::{PeerConnection, PeerHealthMonitor, PeerReputationEntry};
pub use identity::{Identity, IdentityManager};
pub use scheduler::{PiecePriority, PieceScheduler};
pub use secure::{Capabilities, PeerMessage, SecureChannel};
pub use session::{ContentSession, SessionMetadata, SessionStatus, SessionSummary};
pub use stats::{AggregateStats, StatsAggregator};
pub use transport::{
    SessionOptions, TransportEngine, TransportEvent, TransportEventKind, TransportLimits,
    TransportSession,
};
pub use verifier::{ContentVerifier, VerificationRecord};

use crate::crypto::CryptoError;
use crate::storage::StorageError;

/// 20-byte hash identifying one content item across the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId([u8; 20]);

impl ContentId {
    /// Creates a ContentId from a 20-byte hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses a 40-character hex string.
    ///
    /// # Errors
    /// - `SwarmError::InvalidLocator` - Not valid 40-character hex
    pub fn from_hex(s: &str) -> Result<Self, SwarmError> {
        let bytes = hex::decode(s).map_err(|_| SwarmError::InvalidLocator {
            reason: format!("content id '{s}' is not valid hex"),
        })?;
        let hash: [u8; 20] = bytes.try_into().map_err(|_| SwarmError::InvalidLocator {
            reason: "content id must be 20 bytes".to_string(),
        })?;
        Ok(Self(hash))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Zero-based index of a piece within a content session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parsed content locator: `swarm:?id=<hex>&tr=<tracker>&dn=<name>`.
///
/// Parsing happens before any transport call so malformed locators surface
/// as typed errors immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentLocator {
    pub content_id: ContentId,
    pub trackers: Vec<String>,
    pub display_name: Option<String>,
}

impl ContentLocator {
    /// Parses a locator URI.
    ///
    /// # Errors
    /// - `SwarmError::InvalidLocator` - Wrong scheme, missing id, or bad hex
    pub fn parse(input: &str) -> Result<Self, SwarmError> {
        let uri = url::Url::parse(input).map_err(|e| SwarmError::InvalidLocator {
            reason: e.to_string(),
        })?;

        if uri.scheme() != "swarm" {
            return Err(SwarmError::InvalidLocator {
                reason: format!("unsupported scheme '{}'", uri.scheme()),
            });
        }

        let mut content_id = None;
        let mut trackers = Vec::new();
        let mut display_name = None;

        for (key, value) in uri.query_pairs() {
            match key.as_ref() {
                "id" => content_id = Some(ContentId::from_hex(&value)?),
                "tr" => trackers.push(value.into_owned()),
                "dn" => display_name = Some(value.into_owned()),
                _ => {} // Forward compatible: ignore unknown parameters
            }
        }

        let content_id = content_id.ok_or_else(|| SwarmError::InvalidLocator {
            reason: "missing 'id' parameter".to_string(),
        })?;

        Ok(Self {
            content_id,
            trackers,
            display_name,
        })
    }
}

impl fmt::Display for ContentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "swarm:?id={}", self.content_id)?;
        for tracker in &self.trackers {
            write!(f, "&tr={tracker}")?;
        }
        if let Some(name) = &self.display_name {
            write!(f, "&dn={name}")?;
        }
        Ok(())
    }
}

/// Errors that can occur during swarm operations.
///
/// Transport failures are retried with bounded re-announce attempts before
/// becoming fatal; peer failures only ever drop the offending peer.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("Invalid content locator: {reason}")]
    InvalidLocator { reason: String },

    #[error("Session {content_id} not found")]
    SessionNotFound { content_id: ContentId },

    #[error("Session {content_id} already exists")]
    DuplicateSession { content_id: ContentId },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Peer {address} error: {reason}")]
    Peer { address: SocketAddr, reason: String },

    #[error("Peer {address} is blacklisted")]
    PeerBlacklisted { address: SocketAddr },

    #[error("Verification failed for {content_id}")]
    VerificationFailed { content_id: ContentId },

    #[error("Secure channel failure: {reason}")]
    SecureChannel { reason: String },

    #[error("Invalid resource policy: {reason}")]
    GovernorMisconfiguration { reason: String },

    #[error("Storage error")]
    Storage(#[from] StorageError),

    #[error("Crypto error")]
    Crypto(#[from] CryptoError),

    #[error("Coordinator initialization failed: {reason}")]
    Initialization { reason: String },

    #[error("Coordinator shut down")]
    CoordinatorShutdown,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
