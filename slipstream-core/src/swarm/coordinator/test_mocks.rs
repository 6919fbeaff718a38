//! Mock implementations for testing the swarm coordinator.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use crate::swarm::scheduler::PiecePriority;
use crate::swarm::transport::{
    SessionOptions, TransportEngine, TransportEvent, TransportEventKind, TransportLimits,
    TransportSession,
};
use crate::swarm::{ContentId, ContentLocator, SwarmError};

const MOCK_PIECE_SIZE: u32 = 16384;

struct MockTransportState {
    sessions: HashMap<ContentId, TransportSession>,
    removed: Vec<ContentId>,
    paused: Vec<ContentId>,
    resumed: Vec<ContentId>,
    disconnected: Vec<(ContentId, SocketAddr)>,
    reannounces: Vec<ContentId>,
    limits: Vec<TransportLimits>,
    priorities: HashMap<ContentId, Vec<PiecePriority>>,
    sent_messages: Vec<(ContentId, SocketAddr, Bytes)>,
    fail_session_creation: bool,
    piece_count: u32,
    duration_hint: Option<f64>,
    ping_latency: Duration,
    event_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

/// Scripted transport engine double.
///
/// Clones share state, so a test can keep one clone as a controller while
/// the coordinator owns the other.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(MockTransportState {
                sessions: HashMap::new(),
                removed: Vec::new(),
                paused: Vec::new(),
                resumed: Vec::new(),
                disconnected: Vec::new(),
                reannounces: Vec::new(),
                limits: Vec::new(),
                priorities: HashMap::new(),
                sent_messages: Vec::new(),
                fail_session_creation: false,
                piece_count: 10,
                duration_hint: None,
                ping_latency: Duration::from_millis(50),
                event_rx: Some(event_rx),
            })),
            event_tx,
        }
    }

    /// Creates a mock whose session creation always fails.
    pub fn new_with_creation_failure() -> Self {
        let mock = Self::new();
        mock.state.lock().fail_session_creation = true;
        mock
    }

    /// Pieces per created session.
    pub fn set_piece_count(&self, piece_count: u32) {
        self.state.lock().piece_count = piece_count;
    }

    /// Injects a transport event into the coordinator.
    pub fn push_event(&self, session: ContentId, kind: TransportEventKind) {
        let _ = self.event_tx.send(TransportEvent { session, kind });
    }

    pub fn paused_sessions(&self) -> Vec<ContentId> {
        self.state.lock().paused.clone()
    }

    pub fn resumed_sessions(&self) -> Vec<ContentId> {
        self.state.lock().resumed.clone()
    }

    pub fn removed_sessions(&self) -> Vec<ContentId> {
        self.state.lock().removed.clone()
    }

    pub fn disconnected_peers(&self) -> Vec<(ContentId, SocketAddr)> {
        self.state.lock().disconnected.clone()
    }

    pub fn reannounce_count(&self, content_id: ContentId) -> usize {
        self.state
            .lock()
            .reannounces
            .iter()
            .filter(|id| **id == content_id)
            .count()
    }

    pub fn applied_limits(&self) -> Vec<TransportLimits> {
        self.state.lock().limits.clone()
    }

    pub fn piece_priorities(&self, content_id: ContentId) -> Option<Vec<PiecePriority>> {
        self.state.lock().priorities.get(&content_id).cloned()
    }

    pub fn sent_messages(&self) -> Vec<(ContentId, SocketAddr, Bytes)> {
        self.state.lock().sent_messages.clone()
    }

    fn descriptor(
        &self,
        content_id: ContentId,
        name: String,
        file_path: Option<PathBuf>,
    ) -> TransportSession {
        let state = self.state.lock();
        TransportSession {
            content_id,
            name,
            total_size: state.piece_count as u64 * MOCK_PIECE_SIZE as u64,
            piece_size: MOCK_PIECE_SIZE,
            piece_count: state.piece_count,
            file_path,
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportEngine for MockTransport {
    async fn add_session(
        &mut self,
        locator: &ContentLocator,
        _options: SessionOptions,
    ) -> Result<TransportSession, SwarmError> {
        if self.state.lock().fail_session_creation {
            return Err(SwarmError::Transport {
                reason: "mock refuses session creation".to_string(),
            });
        }
        let name = locator
            .display_name
            .clone()
            .unwrap_or_else(|| locator.content_id.to_string());
        let descriptor = self.descriptor(locator.content_id, name, None);
        self.state
            .lock()
            .sessions
            .insert(locator.content_id, descriptor.clone());
        Ok(descriptor)
    }

    async fn seed_session(
        &mut self,
        file: PathBuf,
        _options: SessionOptions,
    ) -> Result<TransportSession, SwarmError> {
        if self.state.lock().fail_session_creation {
            return Err(SwarmError::Transport {
                reason: "mock refuses session creation".to_string(),
            });
        }
        // Deterministic content id derived from the path
        let digest = Sha256::digest(file.to_string_lossy().as_bytes());
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest[..20]);
        let content_id = ContentId::new(hash);

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "seed".to_string());
        let descriptor = self.descriptor(content_id, name, Some(file));
        self.state
            .lock()
            .sessions
            .insert(content_id, descriptor.clone());
        Ok(descriptor)
    }

    async fn remove_session(&mut self, content_id: ContentId) -> Result<(), SwarmError> {
        let mut state = self.state.lock();
        state.sessions.remove(&content_id);
        state.removed.push(content_id);
        Ok(())
    }

    async fn reannounce(&mut self, content_id: ContentId) -> Result<(), SwarmError> {
        self.state.lock().reannounces.push(content_id);
        Ok(())
    }

    async fn disconnect_peer(
        &mut self,
        content_id: ContentId,
        peer: SocketAddr,
    ) -> Result<(), SwarmError> {
        self.state.lock().disconnected.push((content_id, peer));
        Ok(())
    }

    async fn pause_session(&mut self, content_id: ContentId) -> Result<(), SwarmError> {
        self.state.lock().paused.push(content_id);
        Ok(())
    }

    async fn resume_session(&mut self, content_id: ContentId) -> Result<(), SwarmError> {
        self.state.lock().resumed.push(content_id);
        Ok(())
    }

    async fn apply_limits(&mut self, limits: TransportLimits) -> Result<(), SwarmError> {
        self.state.lock().limits.push(limits);
        Ok(())
    }

    async fn update_piece_priorities(
        &mut self,
        content_id: ContentId,
        priorities: &[PiecePriority],
    ) -> Result<(), SwarmError> {
        self.state
            .lock()
            .priorities
            .insert(content_id, priorities.to_vec());
        Ok(())
    }

    async fn send_peer_message(
        &mut self,
        content_id: ContentId,
        peer: SocketAddr,
        payload: Bytes,
    ) -> Result<(), SwarmError> {
        self.state
            .lock()
            .sent_messages
            .push((content_id, peer, payload));
        Ok(())
    }

    async fn ping_peer(
        &mut self,
        _content_id: ContentId,
        _peer: SocketAddr,
    ) -> Result<Duration, SwarmError> {
        Ok(self.state.lock().ping_latency)
    }

    fn take_event_stream(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.state.lock().event_rx.take()
    }
}
