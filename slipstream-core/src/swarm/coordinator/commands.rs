//! Command definitions for the swarm coordinator actor model.

use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::swarm::governor::UserPolicy;
use crate::swarm::session::{SessionMetadata, SessionSummary};
use crate::swarm::stats::AggregateStats;
use crate::swarm::{ContentId, SwarmError};

/// Opaque handle to a started session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub content_id: ContentId,
    pub name: String,
}

/// Commands that can be sent to the swarm coordinator actor.
///
/// Each command encapsulates an operation request along with a response
/// channel for the actor to send back results. This message-passing approach
/// eliminates the need for shared state locks and prevents deadlocks.
pub enum SwarmCommand {
    /// Seed a local file to the swarm.
    StartSeeding {
        path: PathBuf,
        metadata: SessionMetadata,
        responder: oneshot::Sender<Result<SessionHandle, SwarmError>>,
    },
    /// Download content identified by a locator.
    StartDownload {
        locator: String,
        metadata: SessionMetadata,
        responder: oneshot::Sender<Result<SessionHandle, SwarmError>>,
    },
    /// Download content with streaming prioritization, delivering in-order
    /// bytes to the sink.
    StartStreaming {
        locator: String,
        sink: mpsc::Sender<Bytes>,
        metadata: SessionMetadata,
        responder: oneshot::Sender<Result<SessionHandle, SwarmError>>,
    },
    /// Stop a session and release its connections.
    Stop {
        content_id: ContentId,
        responder: oneshot::Sender<Result<(), SwarmError>>,
    },
    /// Report a playback position change for a streaming session.
    UpdatePlaybackPosition {
        content_id: ContentId,
        position_secs: f64,
        responder: oneshot::Sender<Result<(), SwarmError>>,
    },
    /// Snapshot all sessions.
    ListSessions {
        responder: oneshot::Sender<Vec<SessionSummary>>,
    },
    /// Aggregate transfer statistics.
    Stats {
        responder: oneshot::Sender<AggregateStats>,
    },
    /// Replace the user policy; validated and persisted.
    UpdatePolicy {
        policy: UserPolicy,
        responder: oneshot::Sender<Result<(), SwarmError>>,
    },
    /// Shutdown the coordinator actor gracefully.
    Shutdown { responder: oneshot::Sender<()> },
    /// Internal: a periodic governance task fired.
    Tick(TickKind),
    /// Internal: a delayed re-announce for a session that hit a transport
    /// failure.
    Reannounce { content_id: ContentId },
}

/// Periodic governance tick kinds, one per named task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    RotatePeers,
    EvaluateResources,
    SampleStats,
    FlushStats,
    Cleanup,
    RotateIdentity,
}
