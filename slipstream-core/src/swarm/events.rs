//! Lifecycle, security, and bandwidth events exposed to external observers.

use std::fmt;
use std::net::SocketAddr;

use super::ContentId;

/// Event stream emitted by the coordinator to registered observers.
///
/// Delivered over a broadcast channel; slow observers may lag and miss
/// events, never block the coordinator.
#[derive(Debug, Clone)]
pub enum SwarmEvent {
    /// A peer joined one of our sessions.
    Connect { session: ContentId, peer: SocketAddr },
    /// A peer left one of our sessions.
    Disconnect { session: ContentId, peer: SocketAddr },
    /// Periodic per-session progress snapshot.
    Progress {
        session: ContentId,
        /// Completion in `[0.0, 1.0]`
        progress: f32,
        /// Current download speed in bytes per second
        speed_bps: u64,
        peers: usize,
        /// Estimated seconds to completion, when a speed estimate exists
        eta_seconds: Option<u64>,
        /// Swarm health in `[0.0, 1.0]`
        health_score: f32,
    },
    /// A session finished downloading and was verified.
    Complete { session: ContentId, verified: bool },
    /// A contained error; the subsystem keeps running.
    Error {
        session: Option<ContentId>,
        kind: ErrorKind,
        message: String,
    },
    /// A security-relevant observation.
    Security {
        kind: SecurityKind,
        peer: Option<SocketAddr>,
    },
    /// Resource governance changed upload/seeding behavior.
    BandwidthChange {
        action: BandwidthAction,
        reason: String,
    },
    /// Terminal event for a stopped session; emitted exactly once.
    Stopped { session: ContentId },
}

/// Error classification carried on [`SwarmEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Peer,
    Verification,
    SecureChannel,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Peer => "peer",
            ErrorKind::Verification => "verification",
            ErrorKind::SecureChannel => "secure_channel",
            ErrorKind::Storage => "storage",
        };
        write!(f, "{name}")
    }
}

/// Security event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityKind {
    /// Encrypted payload failed to decrypt.
    DecryptionFailure,
    /// Decrypted payload failed to parse as a known message.
    MalformedMessage,
    /// A blacklisted peer attempted to connect.
    BlacklistedPeer,
    /// A completed session failed verification.
    VerificationFailure,
    /// Peer exceeded the secure-channel failure threshold and was dropped.
    PeerIsolated,
}

impl fmt::Display for SecurityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityKind::DecryptionFailure => "decryption_failure",
            SecurityKind::MalformedMessage => "malformed_message",
            SecurityKind::BlacklistedPeer => "blacklisted_peer",
            SecurityKind::VerificationFailure => "verification_failure",
            SecurityKind::PeerIsolated => "peer_isolated",
        };
        write!(f, "{name}")
    }
}

/// Bandwidth governance actions carried on [`SwarmEvent::BandwidthChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthAction {
    PauseSeeding,
    ResumeSeeding,
    AdjustLimits,
}

impl fmt::Display for BandwidthAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BandwidthAction::PauseSeeding => "pause_seeding",
            BandwidthAction::ResumeSeeding => "resume_seeding",
            BandwidthAction::AdjustLimits => "adjust_limits",
        };
        write!(f, "{name}")
    }
}
