//! Handle for communicating with the swarm coordinator actor.

use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::swarm::events::SwarmEvent;
use crate::swarm::governor::UserPolicy;
use crate::swarm::session::{SessionMetadata, SessionSummary};
use crate::swarm::stats::AggregateStats;
use crate::swarm::{ContentId, SwarmError};

use super::commands::{SessionHandle, SwarmCommand};

/// Handle for communicating with the swarm coordinator actor.
///
/// Provides an ergonomic async API for sending commands to the coordinator.
/// Can be cloned and shared across tasks safely.
#[derive(Clone)]
pub struct SwarmHandle {
    sender: mpsc::Sender<SwarmCommand>,
    events: broadcast::Sender<SwarmEvent>,
}

impl SwarmHandle {
    /// Creates a new handle with the given command sender and event channel.
    pub(crate) fn new(
        sender: mpsc::Sender<SwarmCommand>,
        events: broadcast::Sender<SwarmEvent>,
    ) -> Self {
        Self { sender, events }
    }

    /// Subscribes to the coordinator's lifecycle event stream.
    ///
    /// Slow subscribers may lag and miss events; they never block the
    /// coordinator.
    pub fn subscribe(&self) -> broadcast::Receiver<SwarmEvent> {
        self.events.subscribe()
    }

    /// Seeds a local file to the swarm.
    ///
    /// The file is registered with the transport engine, verified, and
    /// promoted to seeding.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Engine could not create the session
    /// - `SwarmError::DuplicateSession` - Content is already active
    /// - `SwarmError::VerificationFailed` - Seed content failed verification
    pub async fn start_seeding(
        &self,
        path: impl Into<PathBuf>,
        metadata: SessionMetadata,
    ) -> Result<SessionHandle, SwarmError> {
        let (responder, rx) = oneshot::channel();
        self.send(SwarmCommand::StartSeeding {
            path: path.into(),
            metadata,
            responder,
        })
        .await?;
        rx.await.map_err(|_| SwarmError::CoordinatorShutdown)?
    }

    /// Starts downloading content identified by a locator.
    ///
    /// # Errors
    /// - `SwarmError::InvalidLocator` - Malformed locator, surfaced before
    ///   any transport call
    /// - `SwarmError::DuplicateSession` - Content is already active
    /// - `SwarmError::Transport` - Engine could not create the session
    pub async fn start_download(
        &self,
        locator: &str,
        metadata: SessionMetadata,
    ) -> Result<SessionHandle, SwarmError> {
        let (responder, rx) = oneshot::channel();
        self.send(SwarmCommand::StartDownload {
            locator: locator.to_string(),
            metadata,
            responder,
        })
        .await?;
        rx.await.map_err(|_| SwarmError::CoordinatorShutdown)?
    }

    /// Starts a streaming download, prioritizing pieces around the playback
    /// position and delivering in-order bytes to `sink`.
    ///
    /// # Errors
    /// - `SwarmError::InvalidLocator` - Malformed locator
    /// - `SwarmError::DuplicateSession` - Content is already active
    /// - `SwarmError::Transport` - Engine could not create the session
    pub async fn start_streaming(
        &self,
        locator: &str,
        sink: mpsc::Sender<Bytes>,
        metadata: SessionMetadata,
    ) -> Result<SessionHandle, SwarmError> {
        let (responder, rx) = oneshot::channel();
        self.send(SwarmCommand::StartStreaming {
            locator: locator.to_string(),
            sink,
            metadata,
            responder,
        })
        .await?;
        rx.await.map_err(|_| SwarmError::CoordinatorShutdown)?
    }

    /// Stops a session, closing its peer connections within a bounded grace
    /// period. Emits a single terminal `Stopped` event.
    ///
    /// # Errors
    /// - `SwarmError::SessionNotFound` - Unknown or already stopped session
    pub async fn stop(&self, content_id: ContentId) -> Result<(), SwarmError> {
        let (responder, rx) = oneshot::channel();
        self.send(SwarmCommand::Stop {
            content_id,
            responder,
        })
        .await?;
        rx.await.map_err(|_| SwarmError::CoordinatorShutdown)?
    }

    /// Reports a playback position change, triggering a priority
    /// recomputation for the session.
    ///
    /// # Errors
    /// - `SwarmError::SessionNotFound` - Unknown session
    pub async fn update_playback_position(
        &self,
        content_id: ContentId,
        position_secs: f64,
    ) -> Result<(), SwarmError> {
        let (responder, rx) = oneshot::channel();
        self.send(SwarmCommand::UpdatePlaybackPosition {
            content_id,
            position_secs,
            responder,
        })
        .await?;
        rx.await.map_err(|_| SwarmError::CoordinatorShutdown)?
    }

    /// Snapshots all active sessions.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SwarmError> {
        let (responder, rx) = oneshot::channel();
        self.send(SwarmCommand::ListSessions { responder }).await?;
        rx.await.map_err(|_| SwarmError::CoordinatorShutdown)
    }

    /// Returns aggregate transfer statistics.
    pub async fn stats(&self) -> Result<AggregateStats, SwarmError> {
        let (responder, rx) = oneshot::channel();
        self.send(SwarmCommand::Stats { responder }).await?;
        rx.await.map_err(|_| SwarmError::CoordinatorShutdown)
    }

    /// Replaces the user policy.
    ///
    /// # Errors
    /// - `SwarmError::GovernorMisconfiguration` - Policy fails validation;
    ///   the previous policy stays in effect
    pub async fn update_policy(&self, policy: UserPolicy) -> Result<(), SwarmError> {
        let (responder, rx) = oneshot::channel();
        self.send(SwarmCommand::UpdatePolicy { policy, responder })
            .await?;
        rx.await.map_err(|_| SwarmError::CoordinatorShutdown)?
    }

    /// Shuts down the coordinator actor gracefully, flushing persisted
    /// state first.
    pub async fn shutdown(&self) -> Result<(), SwarmError> {
        let (responder, rx) = oneshot::channel();
        self.send(SwarmCommand::Shutdown { responder }).await?;
        rx.await.map_err(|_| SwarmError::CoordinatorShutdown)
    }

    /// Whether the coordinator actor is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn send(&self, command: SwarmCommand) -> Result<(), SwarmError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| SwarmError::CoordinatorShutdown)
    }
}
