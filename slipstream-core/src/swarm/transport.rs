//! Transport engine seam.
//!
//! The wire protocol, handshakes, and tracker/DHT communication live in an
//! external engine behind this trait. The coordinator drives it and
//! consumes its event stream; tests substitute a scripted mock.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::scheduler::PiecePriority;
use super::{ContentId, ContentLocator, SwarmError};

/// Options for creating a transport session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Fetch for progressive playback rather than bulk completion.
    pub streaming: bool,
    /// Sink receiving assembled in-order content bytes (streaming sessions).
    pub sink: Option<mpsc::Sender<Bytes>>,
}

/// Descriptor for a created transport session.
#[derive(Debug, Clone)]
pub struct TransportSession {
    pub content_id: ContentId,
    pub name: String,
    pub total_size: u64,
    pub piece_size: u32,
    pub piece_count: u32,
    /// Backing file for seeded sessions.
    pub file_path: Option<PathBuf>,
}

/// Session-wide limits applied by the resource governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    pub max_peers: usize,
    pub upload_limit_bps: u64,
}

/// Events emitted by the transport engine, per session.
#[derive(Debug, Clone)]
pub struct TransportEvent {
    pub session: ContentId,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone)]
pub enum TransportEventKind {
    /// Bytes downloaded from a peer.
    Download {
        peer: std::net::SocketAddr,
        bytes: u64,
    },
    /// Bytes uploaded to a peer.
    Upload {
        peer: std::net::SocketAddr,
        bytes: u64,
    },
    /// A piece finished downloading and passed the wire-level check.
    PieceCompleted { piece: u32 },
    /// The session finished downloading.
    Done,
    PeerConnected { peer: std::net::SocketAddr },
    PeerDisconnected { peer: std::net::SocketAddr },
    /// Encrypted metadata payload from a peer.
    PeerMessage {
        peer: std::net::SocketAddr,
        payload: Bytes,
    },
    /// A tracker answered an announce.
    TrackerResponse { peer_count: u32 },
    /// A transport-level failure for this session.
    Error { message: String },
}

/// External transport engine contract.
#[async_trait]
pub trait TransportEngine: Send + Sync {
    /// Creates a download session from a locator.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Engine rejected the session
    async fn add_session(
        &mut self,
        locator: &ContentLocator,
        options: SessionOptions,
    ) -> Result<TransportSession, SwarmError>;

    /// Creates a seeding session from a local file.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - File unreadable or engine rejected it
    async fn seed_session(
        &mut self,
        file: PathBuf,
        options: SessionOptions,
    ) -> Result<TransportSession, SwarmError>;

    /// Removes a session, closing its connections.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Engine failed to tear the session down
    async fn remove_session(&mut self, content_id: ContentId) -> Result<(), SwarmError>;

    /// Re-announces to the session's trackers to discover fresh peers.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - All trackers unreachable
    async fn reannounce(&mut self, content_id: ContentId) -> Result<(), SwarmError>;

    /// Disconnects a single peer from a session.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Engine failed to disconnect
    async fn disconnect_peer(
        &mut self,
        content_id: ContentId,
        peer: std::net::SocketAddr,
    ) -> Result<(), SwarmError>;

    /// Stops upload activity for a session, preserving downloaded state and
    /// peer metadata.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Engine failed to pause
    async fn pause_session(&mut self, content_id: ContentId) -> Result<(), SwarmError>;

    /// Re-enables upload without re-handshaking existing peers.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Engine failed to resume
    async fn resume_session(&mut self, content_id: ContentId) -> Result<(), SwarmError>;

    /// Applies governor-derived limits engine-wide.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Engine rejected the limits
    async fn apply_limits(&mut self, limits: TransportLimits) -> Result<(), SwarmError>;

    /// Hands the session's per-piece priorities to the engine's piece
    /// picker.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Unknown session
    async fn update_piece_priorities(
        &mut self,
        content_id: ContentId,
        priorities: &[PiecePriority],
    ) -> Result<(), SwarmError>;

    /// Sends an opaque (already encrypted) metadata payload to a peer.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Peer not connected or send failed
    async fn send_peer_message(
        &mut self,
        content_id: ContentId,
        peer: std::net::SocketAddr,
        payload: Bytes,
    ) -> Result<(), SwarmError>;

    /// Lightweight round-trip probe against a peer.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Peer unreachable
    async fn ping_peer(
        &mut self,
        content_id: ContentId,
        peer: std::net::SocketAddr,
    ) -> Result<Duration, SwarmError>;

    /// Takes the engine's event stream. Yields `Some` exactly once; the
    /// coordinator claims it at startup.
    fn take_event_stream(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
}
