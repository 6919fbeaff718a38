//! Slipstream Core - Swarm coordination and adaptive streaming prioritization
//!
//! This crate provides the peer-to-peer distribution engine for Slipstream:
//! session orchestration, streaming-aware piece prioritization, peer health
//! monitoring, resource governance, content verification, and encrypted
//! metadata exchange. The transport engine, platform signals, and playback
//! surface are external collaborators injected at construction.

pub mod config;
pub mod crypto;
pub mod platform;
pub mod storage;
pub mod swarm;
pub mod tasks;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::SlipstreamConfig;
pub use crypto::{ChaChaCrypto, CryptoError, CryptoProvider};
pub use platform::{NetworkClass, PlatformFeed, PlatformMonitor, ResourceProfile};
pub use storage::{JsonFileStore, KvStore, MemoryStore, StorageError};
pub use swarm::{SwarmError, SwarmEvent, SwarmHandle, spawn_swarm_coordinator};

/// Core errors that can bubble up from any Slipstream subsystem.
///
/// High-level error types representing failures in core functionality.
#[derive(Debug, thiserror::Error)]
pub enum SlipstreamError {
    #[error("Swarm error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlipstreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SlipstreamError::Swarm(e) => match e {
                SwarmError::InvalidLocator { reason } => {
                    format!("Invalid content link: {reason}")
                }
                SwarmError::SessionNotFound { content_id } => {
                    format!("Content {content_id} not found")
                }
                SwarmError::VerificationFailed { .. } => {
                    "Downloaded content failed verification".to_string()
                }
                SwarmError::GovernorMisconfiguration { reason } => {
                    format!("Invalid sharing settings: {reason}")
                }
                _ => "Swarm error occurred".to_string(),
            },
            SlipstreamError::Storage(_) => "Storage error occurred".to_string(),
            SlipstreamError::Crypto(_) => "Encryption error occurred".to_string(),
            SlipstreamError::Configuration { reason } => {
                format!("Configuration error: {reason}")
            }
            SlipstreamError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SlipstreamError::Configuration { .. }
                | SlipstreamError::Swarm(SwarmError::InvalidLocator { .. })
                | SlipstreamError::Swarm(SwarmError::GovernorMisconfiguration { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, SlipstreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_hide_internals() {
        let error = SlipstreamError::Swarm(SwarmError::CoordinatorShutdown);
        assert_eq!(error.user_message(), "Swarm error occurred");

        let error = SlipstreamError::Swarm(SwarmError::InvalidLocator {
            reason: "missing 'id' parameter".to_string(),
        });
        assert!(error.user_message().contains("Invalid content link"));
        assert!(error.is_user_error());
    }
}
