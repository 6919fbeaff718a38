//! Core swarm coordinator implementation for the actor model.
//!
//! This is the private implementation that runs inside the actor. It owns
//! every session, wires the scheduler, health monitor, governor, verifier,
//! and stats aggregator to the transport engine's event stream, and is
//! single-threaded: commands are processed sequentially, so no state needs
//! locking.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use crate::config::SlipstreamConfig;
use crate::crypto::CryptoProvider;
use crate::platform::ResourceProfile;
use crate::storage::{self, KvStore, keys};
use crate::swarm::events::{BandwidthAction, ErrorKind, SecurityKind, SwarmEvent};
use crate::swarm::governor::{GovernorDecision, ResourceGovernor, Transition, UserPolicy};
use crate::swarm::health::PeerHealthMonitor;
use crate::swarm::identity::{Identity, IdentityManager};
use crate::swarm::scheduler::PieceScheduler;
use crate::swarm::secure::{Capabilities, PeerMessage, SecureChannel, pack_bitfield};
use crate::swarm::session::{
    ContentSession, SessionMetadata, SessionMode, SessionParams, SessionStatus, SessionSummary,
};
use crate::swarm::stats::{AggregateStats, PersistedStats, StatsAggregator};
use crate::swarm::transport::{
    SessionOptions, TransportEngine, TransportEvent, TransportEventKind, TransportLimits,
    TransportSession,
};
use crate::swarm::verifier::{ContentVerifier, VerificationRecord};
use crate::swarm::{ContentId, ContentLocator, SwarmError};

use super::commands::{SessionHandle, SwarmCommand};

/// Core swarm coordinator state.
///
/// Sessions are owned exclusively here; the scheduler, monitor, and
/// governor only ever see borrowed views.
pub struct SwarmCoordinator<T: TransportEngine> {
    config: SlipstreamConfig,
    transport: T,
    crypto: Arc<dyn CryptoProvider>,
    store: Arc<dyn KvStore>,
    sessions: HashMap<ContentId, ContentSession>,
    channels: HashMap<ContentId, SecureChannel>,
    scheduler: PieceScheduler,
    monitor: PeerHealthMonitor,
    governor: ResourceGovernor,
    verifier: ContentVerifier,
    stats: StatsAggregator,
    identity: IdentityManager,
    profile: ResourceProfile,
    last_limits: Option<TransportLimits>,
    events: broadcast::Sender<SwarmEvent>,
    internal_tx: mpsc::UnboundedSender<SwarmCommand>,
}

impl<T: TransportEngine + 'static> SwarmCoordinator<T> {
    /// Creates the coordinator, validating the governor policy.
    ///
    /// # Errors
    /// - `SwarmError::GovernorMisconfiguration` - Invalid policy values
    pub fn new(
        config: SlipstreamConfig,
        transport: T,
        crypto: Arc<dyn CryptoProvider>,
        store: Arc<dyn KvStore>,
        events: broadcast::Sender<SwarmEvent>,
        internal_tx: mpsc::UnboundedSender<SwarmCommand>,
    ) -> Result<Self, SwarmError> {
        let governor = ResourceGovernor::new(config.governor.policy.clone())?;
        let scheduler = PieceScheduler::new(config.scheduler.clone());
        let monitor = PeerHealthMonitor::new(config.health.clone());
        let verifier = ContentVerifier::new(crypto.clone());
        let stats = StatsAggregator::new(&config.stats);
        let identity = IdentityManager::new(crypto.clone(), config.identity.rotation_interval);

        Ok(Self {
            config,
            transport,
            crypto,
            store,
            sessions: HashMap::new(),
            channels: HashMap::new(),
            scheduler,
            monitor,
            governor,
            verifier,
            stats,
            identity,
            profile: ResourceProfile::default(),
            last_limits: None,
            events,
            internal_tx,
        })
    }

    /// Loads persisted records. Each record is independent; a missing or
    /// corrupt one is logged and skipped.
    pub async fn load_persisted(&mut self) {
        let store = self.store.as_ref();

        match storage::get_json::<PersistedStats>(store, keys::STATS).await {
            Ok(Some(persisted)) => self.stats.load(persisted),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load stats record: {e}"),
        }

        match storage::get_json::<HashMap<ContentId, VerificationRecord>>(store, keys::VERIFICATION)
            .await
        {
            Ok(Some(cache)) => self.verifier.load_cache(cache),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load verification cache: {e}"),
        }

        match storage::get_json::<Vec<SocketAddr>>(store, keys::BLACKLIST).await {
            Ok(Some(addresses)) => self.monitor.load_blacklist(addresses),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load blacklist: {e}"),
        }

        match storage::get_json::<UserPolicy>(store, keys::POLICY).await {
            Ok(Some(policy)) => {
                if let Err(e) = self.governor.update_policy(policy) {
                    tracing::warn!("Persisted policy invalid, keeping configured one: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load policy: {e}"),
        }

        match storage::get_json::<Identity>(store, keys::IDENTITY).await {
            Ok(Some(identity)) => {
                self.identity = IdentityManager::with_identity(
                    self.crypto.clone(),
                    identity,
                    self.config.identity.rotation_interval,
                );
            }
            Ok(None) => self.persist_identity().await,
            Err(e) => tracing::warn!("Failed to load identity: {e}"),
        }
    }

    /// Sets the initial platform snapshot before the actor loop starts.
    pub fn set_profile(&mut self, profile: ResourceProfile) {
        self.profile = profile;
    }

    // ---- session lifecycle -------------------------------------------------

    /// Registers a local file for seeding. The session is verified before
    /// it is promoted to seeding.
    pub async fn start_seeding(
        &mut self,
        path: PathBuf,
        metadata: SessionMetadata,
    ) -> Result<SessionHandle, SwarmError> {
        let descriptor = self
            .transport
            .seed_session(path, SessionOptions::default())
            .await?;
        let content_id = descriptor.content_id;
        let handle = match self
            .install_session(descriptor, SessionMode::Seed, metadata)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.cleanup_rejected(content_id).await;
                return Err(e);
            }
        };

        let verified = match self.sessions.get(&handle.content_id) {
            Some(session) => self.verifier.verify(session).await?,
            None => false,
        };
        if !verified {
            self.emit(SwarmEvent::Security {
                kind: SecurityKind::VerificationFailure,
                peer: None,
            });
            self.discard_session(handle.content_id).await;
            return Err(SwarmError::VerificationFailed {
                content_id: handle.content_id,
            });
        }

        if let Some(session) = self.sessions.get_mut(&handle.content_id) {
            session.status = SessionStatus::Seeding;
        }
        self.pause_if_governed(handle.content_id).await;

        tracing::info!("Seeding {} as {}", handle.name, handle.content_id);
        Ok(handle)
    }

    /// Starts a bulk download from a locator.
    pub async fn start_download(
        &mut self,
        locator: &str,
        metadata: SessionMetadata,
    ) -> Result<SessionHandle, SwarmError> {
        let locator = ContentLocator::parse(locator)?;
        self.reject_duplicate(locator.content_id)?;

        let descriptor = self
            .transport
            .add_session(&locator, SessionOptions::default())
            .await?;
        let handle = self
            .install_session(descriptor, SessionMode::Download, metadata)
            .await?;

        tracing::info!("Downloading {} as {}", handle.name, handle.content_id);
        Ok(handle)
    }

    /// Starts a streaming download, delivering in-order bytes to `sink`.
    pub async fn start_streaming(
        &mut self,
        locator: &str,
        sink: mpsc::Sender<Bytes>,
        metadata: SessionMetadata,
    ) -> Result<SessionHandle, SwarmError> {
        let locator = ContentLocator::parse(locator)?;
        self.reject_duplicate(locator.content_id)?;

        let descriptor = self
            .transport
            .add_session(
                &locator,
                SessionOptions {
                    streaming: true,
                    sink: Some(sink),
                },
            )
            .await?;
        let content_id = descriptor.content_id;
        let handle = match self
            .install_session(descriptor, SessionMode::Stream, metadata)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.cleanup_rejected(content_id).await;
                return Err(e);
            }
        };

        tracing::info!("Streaming {} as {}", handle.name, handle.content_id);
        Ok(handle)
    }

    /// Removes a transport session whose installation was rejected, so the
    /// engine does not keep an orphan.
    async fn cleanup_rejected(&mut self, content_id: ContentId) {
        if let Err(e) = self.transport.remove_session(content_id).await {
            tracing::warn!("Cleanup of rejected session {content_id} failed: {e}");
        }
    }

    fn reject_duplicate(&self, content_id: ContentId) -> Result<(), SwarmError> {
        if self.sessions.contains_key(&content_id) {
            return Err(SwarmError::DuplicateSession { content_id });
        }
        Ok(())
    }

    async fn install_session(
        &mut self,
        descriptor: TransportSession,
        mode: SessionMode,
        metadata: SessionMetadata,
    ) -> Result<SessionHandle, SwarmError> {
        self.reject_duplicate(descriptor.content_id)?;

        // Each session gets its own ephemeral channel keyed with the
        // identity live at creation; later rotations do not touch it.
        let channel = SecureChannel::new(self.crypto.clone(), self.identity.current().key);
        let mut session = ContentSession::new(
            SessionParams {
                content_id: descriptor.content_id,
                name: descriptor.name,
                total_size: descriptor.total_size,
                piece_size: descriptor.piece_size,
                piece_count: descriptor.piece_count,
                mode,
                metadata,
                file_path: descriptor.file_path,
            },
            channel.channel_id().to_string(),
        )?;

        if mode == SessionMode::Stream {
            self.scheduler.recompute(&mut session, 0.0);
            self.transport
                .update_piece_priorities(session.content_id, &session.piece_priorities)
                .await?;
        }

        let handle = SessionHandle {
            content_id: session.content_id,
            name: session.name.clone(),
        };
        self.channels.insert(session.content_id, channel);
        self.sessions.insert(session.content_id, session);
        Ok(handle)
    }

    /// Stops a session: unregisters it everywhere, closes its connections
    /// within the grace period, and emits a single terminal event.
    pub async fn stop(&mut self, content_id: ContentId) -> Result<(), SwarmError> {
        if self.sessions.remove(&content_id).is_none() {
            return Err(SwarmError::SessionNotFound { content_id });
        }
        self.channels.remove(&content_id);
        let orphaned = self.monitor.remove_session(content_id);
        if !orphaned.is_empty() {
            tracing::debug!("Dropped {} peers with no remaining session", orphaned.len());
        }

        match tokio::time::timeout(
            self.config.swarm.stop_grace,
            self.transport.remove_session(content_id),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Transport removal of {content_id} failed: {e}"),
            Err(_) => tracing::warn!("Transport removal of {content_id} exceeded grace period"),
        }

        self.emit(SwarmEvent::Stopped {
            session: content_id,
        });
        Ok(())
    }

    async fn discard_session(&mut self, content_id: ContentId) {
        self.sessions.remove(&content_id);
        self.channels.remove(&content_id);
        self.monitor.remove_session(content_id);
        if let Err(e) = self.transport.remove_session(content_id).await {
            tracing::warn!("Transport removal of discarded {content_id} failed: {e}");
        }
    }

    /// Recomputes piece priorities for a new playback position and hands
    /// them to the transport's piece picker.
    pub async fn update_playback_position(
        &mut self,
        content_id: ContentId,
        position_secs: f64,
    ) -> Result<(), SwarmError> {
        let priorities = {
            let session = self
                .sessions
                .get_mut(&content_id)
                .ok_or(SwarmError::SessionNotFound { content_id })?;
            self.scheduler.recompute(session, position_secs);
            session.piece_priorities.clone()
        };
        self.transport
            .update_piece_priorities(content_id, &priorities)
            .await
    }

    pub fn session_summaries(&self) -> Vec<SessionSummary> {
        self.sessions.values().map(|s| s.summary()).collect()
    }

    pub fn aggregate_stats(&mut self) -> AggregateStats {
        let active = self.sessions.len();
        let seeding = self
            .sessions
            .values()
            .filter(|s| s.status.is_seeding())
            .count();
        let peers = self.monitor.connected_peer_count();
        self.stats.aggregate(active, seeding, peers)
    }

    /// Replaces the user policy, persisting it and re-evaluating limits.
    pub async fn update_policy(&mut self, policy: UserPolicy) -> Result<(), SwarmError> {
        self.governor.update_policy(policy)?;
        if let Err(e) =
            storage::put_json(self.store.as_ref(), keys::POLICY, self.governor.policy()).await
        {
            tracing::warn!("Failed to persist policy: {e}");
        }
        let decision = self.governor.evaluate(&self.profile.clone());
        self.apply_decision(decision).await;
        Ok(())
    }

    // ---- transport events --------------------------------------------------

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        let content_id = event.session;
        match event.kind {
            TransportEventKind::Download { peer, bytes } => {
                self.monitor.record_download(peer, bytes);
                self.stats.record_transfer(content_id, bytes, 0);
                if let Some(session) = self.sessions.get_mut(&content_id) {
                    session.bytes_downloaded += bytes;
                }
            }
            TransportEventKind::Upload { peer, bytes } => {
                self.monitor.record_upload(peer, bytes);
                self.stats.record_transfer(content_id, 0, bytes);
                if let Some(session) = self.sessions.get_mut(&content_id) {
                    session.bytes_uploaded += bytes;
                }
            }
            TransportEventKind::PieceCompleted { piece } => {
                if let Some(session) = self.sessions.get_mut(&content_id) {
                    session.complete_piece(piece);
                }
            }
            TransportEventKind::Done => self.handle_session_done(content_id).await,
            TransportEventKind::PeerConnected { peer } => {
                self.handle_peer_connected(content_id, peer).await;
            }
            TransportEventKind::PeerDisconnected { peer } => {
                self.monitor.peer_disconnected(peer, content_id);
                self.emit(SwarmEvent::Disconnect {
                    session: content_id,
                    peer,
                });
            }
            TransportEventKind::PeerMessage { peer, payload } => {
                self.handle_peer_message(content_id, peer, payload).await;
            }
            TransportEventKind::TrackerResponse { peer_count } => {
                if let Some(session) = self.sessions.get_mut(&content_id) {
                    session.announce_retries = 0;
                }
                tracing::debug!("Tracker answered for {content_id} with {peer_count} peers");
            }
            TransportEventKind::Error { message } => {
                self.handle_transport_failure(content_id, message).await;
            }
        }
    }

    /// Runs verification when the transport reports a session done, and
    /// promotes it to seeding on success.
    async fn handle_session_done(&mut self, content_id: ContentId) {
        let verified = {
            let Some(session) = self.sessions.get(&content_id) else {
                return;
            };
            if !session.status.is_fetching() {
                return;
            }
            match self.verifier.verify(session).await {
                Ok(verified) => verified,
                Err(e) => {
                    tracing::warn!("Verification of {content_id} errored: {e}");
                    false
                }
            }
        };

        if verified {
            if let Some(session) = self.sessions.get_mut(&content_id) {
                session.status = SessionStatus::Seeding;
                session.completed_at = Some(Instant::now());
            }
            self.emit(SwarmEvent::Complete {
                session: content_id,
                verified: true,
            });
            self.pause_if_governed(content_id).await;
        } else {
            // Verification failure discards the session; never retried
            self.emit(SwarmEvent::Complete {
                session: content_id,
                verified: false,
            });
            self.emit(SwarmEvent::Security {
                kind: SecurityKind::VerificationFailure,
                peer: None,
            });
            self.emit(SwarmEvent::Error {
                session: Some(content_id),
                kind: ErrorKind::Verification,
                message: "completed session failed verification".to_string(),
            });
            self.discard_session(content_id).await;
        }
    }

    /// Pauses a freshly seeding session immediately when the governor is
    /// already in a paused state.
    async fn pause_if_governed(&mut self, content_id: ContentId) {
        let Some(reason) = self.governor.paused_reason() else {
            return;
        };
        if let Err(e) = self.transport.pause_session(content_id).await {
            tracing::warn!("Failed to pause {content_id}: {e}");
            return;
        }
        if let Some(session) = self.sessions.get_mut(&content_id) {
            session.paused = Some(reason);
        }
        self.emit(SwarmEvent::BandwidthChange {
            action: BandwidthAction::PauseSeeding,
            reason: reason.to_string(),
        });
    }

    async fn handle_peer_connected(&mut self, content_id: ContentId, peer: SocketAddr) {
        if !self.sessions.contains_key(&content_id) {
            return;
        }

        match self.monitor.peer_connected(peer, content_id) {
            Ok(()) => {
                self.emit(SwarmEvent::Connect {
                    session: content_id,
                    peer,
                });
                self.send_handshake(content_id, peer).await;
            }
            Err(SwarmError::PeerBlacklisted { .. }) => {
                // Refused before any handshake is attempted
                if let Err(e) = self.transport.disconnect_peer(content_id, peer).await {
                    tracing::debug!("Disconnect of blacklisted {peer} failed: {e}");
                }
                self.emit(SwarmEvent::Security {
                    kind: SecurityKind::BlacklistedPeer,
                    peer: Some(peer),
                });
            }
            Err(e) => tracing::warn!("Peer registration failed for {peer}: {e}"),
        }
    }

    async fn send_handshake(&mut self, content_id: ContentId, peer: SocketAddr) {
        let payload = match self.channels.get(&content_id) {
            Some(channel) => channel.handshake(&Capabilities::default()),
            None => return,
        };
        match payload {
            Ok(bytes) => {
                if let Err(e) = self
                    .transport
                    .send_peer_message(content_id, peer, bytes)
                    .await
                {
                    tracing::debug!("Handshake send to {peer} failed: {e}");
                }
            }
            Err(e) => tracing::warn!("Handshake encryption failed: {e}"),
        }
    }

    async fn handle_peer_message(&mut self, content_id: ContentId, peer: SocketAddr, payload: Bytes) {
        let Some(channel) = self.channels.get(&content_id) else {
            return;
        };

        let plaintext = match channel.decrypt_raw(&payload) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                self.note_secure_failure(peer, SecurityKind::DecryptionFailure)
                    .await;
                return;
            }
        };

        // The first good payload from a peer is its handshake
        if !self.monitor.capabilities_known(&peer) {
            if let Ok(capabilities) = channel.parse_handshake(&plaintext) {
                self.monitor.set_capabilities(peer, capabilities);
                self.monitor.record_secure_success(peer);
                return;
            }
        }

        match channel.parse_message(&plaintext) {
            Ok(message) => {
                self.monitor.record_secure_success(peer);
                self.handle_peer_payload(content_id, peer, message).await;
            }
            Err(_) => {
                self.note_secure_failure(peer, SecurityKind::MalformedMessage)
                    .await;
            }
        }
    }

    async fn note_secure_failure(&mut self, peer: SocketAddr, kind: SecurityKind) {
        self.emit(SwarmEvent::Security {
            kind,
            peer: Some(peer),
        });
        // The connection survives isolated failures; repeated ones cross
        // the threshold and drop the peer
        if self.monitor.record_secure_failure(peer) {
            self.isolate_peer(peer).await;
        }
    }

    async fn isolate_peer(&mut self, peer: SocketAddr) {
        self.monitor.blacklist_peer(peer);
        for session in self.monitor.peer_sessions(&peer) {
            if let Err(e) = self.transport.disconnect_peer(session, peer).await {
                tracing::debug!("Disconnect of {peer} from {session} failed: {e}");
            }
            self.monitor.peer_disconnected(peer, session);
            self.emit(SwarmEvent::Disconnect { session, peer });
        }
        self.emit(SwarmEvent::Security {
            kind: SecurityKind::PeerIsolated,
            peer: Some(peer),
        });
    }

    async fn handle_peer_payload(
        &mut self,
        content_id: ContentId,
        peer: SocketAddr,
        message: PeerMessage,
    ) {
        match message {
            PeerMessage::RequestMetadata { content } => {
                let replies = self.sessions.get(&content).map(|session| {
                    [
                        PeerMessage::HaveMetadata {
                            content: session.content_id,
                            piece_count: session.piece_count,
                            piece_size: session.piece_size,
                            total_size: session.total_size,
                        },
                        PeerMessage::BitfieldUpdate {
                            content: session.content_id,
                            bitfield: pack_bitfield(&session.completed_pieces),
                        },
                    ]
                });
                let Some(replies) = replies else {
                    tracing::debug!("Peer {peer} requested metadata for unknown {content}");
                    return;
                };
                for reply in replies {
                    let encrypted = match self.channels.get(&content_id) {
                        Some(channel) => channel.encrypt_message(&reply),
                        None => return,
                    };
                    match encrypted {
                        Ok(bytes) => {
                            if let Err(e) = self
                                .transport
                                .send_peer_message(content_id, peer, bytes)
                                .await
                            {
                                tracing::debug!("Metadata reply to {peer} failed: {e}");
                            }
                        }
                        Err(e) => tracing::warn!("Metadata reply encryption failed: {e}"),
                    }
                }
            }
            PeerMessage::HaveMetadata { content, .. } => {
                tracing::debug!("Peer {peer} advertised metadata for {content}");
            }
            PeerMessage::StreamingStats {
                content,
                position_secs,
                ..
            } => {
                tracing::debug!("Peer {peer} streams {content} at {position_secs:.1}s");
            }
            PeerMessage::BitfieldUpdate { content, bitfield } => {
                tracing::debug!(
                    "Peer {peer} bitfield for {content}: {} bytes",
                    bitfield.len()
                );
            }
            PeerMessage::NetworkInfo {
                upload_limit_bps, ..
            } => {
                tracing::debug!("Peer {peer} reports upload limit {upload_limit_bps} B/s");
            }
        }
    }

    /// Mid-session transport failure: bounded re-announce retries with
    /// exponential backoff before the session error becomes fatal.
    async fn handle_transport_failure(&mut self, content_id: ContentId, message: String) {
        let Some(session) = self.sessions.get_mut(&content_id) else {
            return;
        };
        if session.status == SessionStatus::Error {
            return;
        }

        session.announce_retries += 1;
        let attempt = session.announce_retries;

        if attempt <= self.config.swarm.max_announce_retries {
            let delay = retry_backoff(
                self.config.swarm.announce_backoff_base,
                self.config.swarm.announce_backoff_max,
                attempt,
            );
            tracing::warn!(
                "Transport failure for {content_id} (attempt {attempt}): {message}; \
                 re-announcing in {delay:?}"
            );
            let tx = self.internal_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(SwarmCommand::Reannounce { content_id });
            });
        } else {
            session.status = SessionStatus::Error;
            self.emit(SwarmEvent::Error {
                session: Some(content_id),
                kind: ErrorKind::Transport,
                message,
            });
        }
    }

    pub async fn handle_reannounce(&mut self, content_id: ContentId) {
        let known = self
            .sessions
            .get(&content_id)
            .is_some_and(|s| s.status != SessionStatus::Error);
        if !known {
            return;
        }
        if let Err(e) = self.transport.reannounce(content_id).await {
            self.handle_transport_failure(content_id, e.to_string())
                .await;
        }
    }

    // ---- periodic governance ----------------------------------------------

    /// Probes peer latencies and rotates out the slowest connections of
    /// over-threshold sessions.
    pub async fn tick_rotate_peers(&mut self) {
        for address in self.monitor.peer_addresses() {
            let Some(session) = self.monitor.peer_sessions(&address).into_iter().next() else {
                continue;
            };
            match self.transport.ping_peer(session, address).await {
                Ok(rtt) => self.monitor.record_latency(address, rtt),
                Err(e) => tracing::debug!("Latency probe to {address} failed: {e}"),
            }
        }

        for (session, victims) in self.monitor.rotation_victims() {
            tracing::debug!("Rotating {} slow peers out of {session}", victims.len());
            for peer in victims {
                if let Err(e) = self.transport.disconnect_peer(session, peer).await {
                    tracing::debug!("Rotation disconnect of {peer} failed: {e}");
                }
                self.monitor.peer_disconnected(peer, session);
                self.emit(SwarmEvent::Disconnect { session, peer });
            }
            // Replacement peers come from a fresh announce
            if let Err(e) = self.transport.reannounce(session).await {
                tracing::warn!("Post-rotation re-announce for {session} failed: {e}");
            }
        }
    }

    pub async fn platform_changed(&mut self, profile: ResourceProfile) {
        tracing::debug!(
            "Platform change: {:?}, metered={}, battery={:.0}%, charging={}",
            profile.network,
            profile.metered,
            profile.battery_level * 100.0,
            profile.charging
        );
        self.profile = profile.clone();
        let decision = self.governor.evaluate(&profile);
        self.apply_decision(decision).await;
    }

    pub async fn tick_evaluate_resources(&mut self) {
        let decision = self.governor.evaluate(&self.profile);
        self.apply_decision(decision).await;
    }

    async fn apply_decision(&mut self, decision: GovernorDecision) {
        let limits = TransportLimits {
            max_peers: decision.max_peers,
            upload_limit_bps: decision.upload_limit_bps,
        };
        if self.last_limits != Some(limits) {
            match self.transport.apply_limits(limits).await {
                Ok(()) => {
                    if self.last_limits.is_some() {
                        self.emit(SwarmEvent::BandwidthChange {
                            action: BandwidthAction::AdjustLimits,
                            reason: format!(
                                "max_peers={}, upload_limit={}B/s",
                                limits.max_peers, limits.upload_limit_bps
                            ),
                        });
                    }
                    self.last_limits = Some(limits);
                }
                Err(e) => tracing::warn!("Failed to apply transport limits: {e}"),
            }
        }

        match decision.transition {
            Transition::PauseSeeding(reason) => {
                let ids: Vec<ContentId> = self
                    .sessions
                    .values()
                    .filter(|s| s.status.is_seeding() && s.paused.is_none())
                    .map(|s| s.content_id)
                    .collect();
                for content_id in ids {
                    if let Err(e) = self.transport.pause_session(content_id).await {
                        tracing::warn!("Failed to pause {content_id}: {e}");
                        continue;
                    }
                    if let Some(session) = self.sessions.get_mut(&content_id) {
                        session.paused = Some(reason);
                    }
                    self.emit(SwarmEvent::BandwidthChange {
                        action: BandwidthAction::PauseSeeding,
                        reason: reason.to_string(),
                    });
                }
            }
            Transition::ResumeSeeding(reason) => {
                let ids: Vec<ContentId> = self
                    .sessions
                    .values()
                    .filter(|s| s.paused.is_some())
                    .map(|s| s.content_id)
                    .collect();
                for content_id in ids {
                    if let Err(e) = self.transport.resume_session(content_id).await {
                        tracing::warn!("Failed to resume {content_id}: {e}");
                        continue;
                    }
                    if let Some(session) = self.sessions.get_mut(&content_id) {
                        session.paused = None;
                    }
                    self.emit(SwarmEvent::BandwidthChange {
                        action: BandwidthAction::ResumeSeeding,
                        reason: reason.to_string(),
                    });
                }
            }
            Transition::None => {}
        }
    }

    /// Folds current speeds into the stats window and emits per-session
    /// progress events.
    pub fn tick_sample_stats(&mut self) {
        let ids: Vec<ContentId> = self.sessions.keys().copied().collect();
        let mut total_down = 0u64;
        let mut total_up = 0u64;
        let mut progress = Vec::with_capacity(ids.len());

        for content_id in ids {
            let (down, up) = self.monitor.session_speeds(content_id);
            total_down += down;
            total_up += up;

            let Some(session) = self.sessions.get(&content_id) else {
                continue;
            };
            if session.status == SessionStatus::Error {
                continue;
            }
            let remaining = session.remaining_bytes();
            let eta_seconds = if down > 0 && remaining > 0 {
                Some(remaining / down)
            } else {
                None
            };
            progress.push(SwarmEvent::Progress {
                session: content_id,
                progress: session.progress(),
                speed_bps: down,
                peers: self.monitor.session_peer_count(content_id),
                eta_seconds,
                health_score: self.monitor.session_health_score(content_id),
            });
        }

        self.stats.sample(total_down, total_up);
        for event in progress {
            self.emit(event);
        }
    }

    /// Persists dirty records on the long period to bound write
    /// amplification.
    pub async fn tick_flush(&mut self) {
        let store = self.store.as_ref();

        if let Some(totals) = self.stats.take_flush() {
            if let Err(e) = storage::put_json(store, keys::STATS, &totals).await {
                tracing::warn!("Stats flush failed: {e}");
            }
        }
        if let Some(cache) = self.verifier.take_cache_flush() {
            if let Err(e) = storage::put_json(store, keys::VERIFICATION, &cache).await {
                tracing::warn!("Verification cache flush failed: {e}");
            }
        }
        if let Some(blacklist) = self.monitor.take_blacklist_flush() {
            if let Err(e) = storage::put_json(store, keys::BLACKLIST, &blacklist).await {
                tracing::warn!("Blacklist flush failed: {e}");
            }
        }
    }

    pub fn tick_cleanup(&mut self) {
        let pruned = self.monitor.prune_reputation();
        if pruned > 0 {
            tracing::debug!("Pruned {pruned} stale reputation entries");
        }
    }

    /// Rotates the identity when due. Existing session channels keep the
    /// key they captured; only new sessions use the new identity.
    pub async fn tick_rotate_identity(&mut self) {
        if self.identity.rotate_if_due() {
            self.persist_identity().await;
        }
    }

    async fn persist_identity(&mut self) {
        if let Err(e) =
            storage::put_json(self.store.as_ref(), keys::IDENTITY, self.identity.current()).await
        {
            tracing::warn!("Failed to persist identity: {e}");
        }
    }

    /// Flushes all dirty state ahead of shutdown.
    pub async fn shutdown_flush(&mut self) {
        self.tick_flush().await;
    }

    fn emit(&self, event: SwarmEvent) {
        // Returns Err only when no subscriber exists, which is fine
        let _ = self.events.send(event);
    }
}

/// Exponential backoff capped at `max`, first attempt waits `base`.
fn retry_backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let millis = (base.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_millis(millis.min(max.as_millis() as u64))
}
