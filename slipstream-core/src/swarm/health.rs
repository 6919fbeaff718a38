//! Peer health monitoring: rolling throughput, latency, rotation, and
//! blacklisting.
//!
//! The monitor observes per-peer transfer events fed by the coordinator and
//! periodically rotates out the slowest connections so re-announcing can
//! discover better replacements.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::config::HealthConfig;

use super::secure::Capabilities;
use super::{ContentId, SwarmError};

/// Sliding-window throughput estimator.
#[derive(Debug)]
pub struct RateEstimator {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl RateEstimator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    fn record_at(&mut self, at: Instant, bytes: u64) {
        self.samples.push_back((at, bytes));
        self.evict(at);
    }

    /// Current speed over the window, in bytes per second.
    pub fn bytes_per_second(&mut self) -> u64 {
        let now = Instant::now();
        self.evict(now);
        let total: u64 = self.samples.iter().map(|(_, bytes)| bytes).sum();
        let secs = self.window.as_secs_f64();
        (total as f64 / secs) as u64
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.samples.front() {
            if now.duration_since(at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Simple moving average over the last N latency probes.
#[derive(Debug)]
pub struct LatencyTracker {
    capacity: usize,
    samples: VecDeque<Duration>,
}

impl LatencyTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, rtt: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt);
    }

    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }
}

/// One network peer participating in one or more sessions.
///
/// Removed as soon as its session set becomes empty.
pub struct PeerConnection {
    pub address: SocketAddr,
    pub capabilities: Option<Capabilities>,
    pub download: RateEstimator,
    pub upload: RateEstimator,
    pub latency: LatencyTracker,
    pub bytes_downloaded: u64,
    pub bytes_uploaded: u64,
    pub sessions: HashSet<ContentId>,
    pub connected_at: Instant,
    /// Consecutive secure-channel failures since the last good message.
    pub secure_failures: u32,
}

impl PeerConnection {
    fn new(address: SocketAddr, config: &HealthConfig) -> Self {
        Self {
            address,
            capabilities: None,
            download: RateEstimator::new(config.rate_window),
            upload: RateEstimator::new(config.rate_window),
            latency: LatencyTracker::new(config.latency_samples),
            bytes_downloaded: 0,
            bytes_uploaded: 0,
            sessions: HashSet::new(),
            connected_at: Instant::now(),
            secure_failures: 0,
        }
    }

    /// Combined transfer speed used for rotation ranking.
    pub fn combined_speed(&mut self) -> u64 {
        self.download.bytes_per_second() + self.upload.bytes_per_second()
    }
}

/// Per-address aggregate surviving across sessions.
#[derive(Debug, Clone)]
pub struct PeerReputationEntry {
    pub total_bytes: u64,
    pub successful_connections: u32,
    pub failed_connections: u32,
    pub last_seen: Instant,
}

impl PeerReputationEntry {
    fn new() -> Self {
        Self {
            total_bytes: 0,
            successful_connections: 0,
            failed_connections: 0,
            last_seen: Instant::now(),
        }
    }
}

/// Tracks per-peer health, rotates low performers, and refuses blacklisted
/// addresses before any handshake is attempted.
pub struct PeerHealthMonitor {
    config: HealthConfig,
    peers: HashMap<SocketAddr, PeerConnection>,
    reputation: HashMap<SocketAddr, PeerReputationEntry>,
    blacklist: HashSet<SocketAddr>,
    blacklist_dirty: bool,
}

impl PeerHealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            peers: HashMap::new(),
            reputation: HashMap::new(),
            blacklist: HashSet::new(),
            blacklist_dirty: false,
        }
    }

    /// Registers a peer joining a session.
    ///
    /// # Errors
    /// - `SwarmError::PeerBlacklisted` - Address is on the rejection set;
    ///   refused before any handshake
    pub fn peer_connected(
        &mut self,
        address: SocketAddr,
        session: ContentId,
    ) -> Result<(), SwarmError> {
        if self.blacklist.contains(&address) {
            self.reputation
                .entry(address)
                .or_insert_with(PeerReputationEntry::new)
                .failed_connections += 1;
            return Err(SwarmError::PeerBlacklisted { address });
        }

        let peer = self
            .peers
            .entry(address)
            .or_insert_with(|| PeerConnection::new(address, &self.config));
        peer.sessions.insert(session);

        let entry = self
            .reputation
            .entry(address)
            .or_insert_with(PeerReputationEntry::new);
        entry.successful_connections += 1;
        entry.last_seen = Instant::now();

        Ok(())
    }

    /// Removes a session from a peer; drops the peer once it participates
    /// in no session.
    pub fn peer_disconnected(&mut self, address: SocketAddr, session: ContentId) {
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.sessions.remove(&session);
            if peer.sessions.is_empty() {
                self.peers.remove(&address);
            }
        }
        if let Some(entry) = self.reputation.get_mut(&address) {
            entry.last_seen = Instant::now();
        }
    }

    /// Removes a stopping session from every peer, returning peers left
    /// with no sessions (which are dropped).
    pub fn remove_session(&mut self, session: ContentId) -> Vec<SocketAddr> {
        let mut orphaned = Vec::new();
        self.peers.retain(|address, peer| {
            peer.sessions.remove(&session);
            if peer.sessions.is_empty() {
                orphaned.push(*address);
                false
            } else {
                true
            }
        });
        orphaned
    }

    pub fn record_download(&mut self, address: SocketAddr, bytes: u64) {
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.download.record(bytes);
            peer.bytes_downloaded += bytes;
        }
        if let Some(entry) = self.reputation.get_mut(&address) {
            entry.total_bytes += bytes;
            entry.last_seen = Instant::now();
        }
    }

    pub fn record_upload(&mut self, address: SocketAddr, bytes: u64) {
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.upload.record(bytes);
            peer.bytes_uploaded += bytes;
        }
        if let Some(entry) = self.reputation.get_mut(&address) {
            entry.total_bytes += bytes;
            entry.last_seen = Instant::now();
        }
    }

    pub fn record_latency(&mut self, address: SocketAddr, rtt: Duration) {
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.latency.record(rtt);
        }
    }

    pub fn set_capabilities(&mut self, address: SocketAddr, capabilities: Capabilities) {
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.capabilities = Some(capabilities);
        }
    }

    /// Whether the peer already completed capability negotiation.
    pub fn capabilities_known(&self, address: &SocketAddr) -> bool {
        self.peers
            .get(address)
            .is_some_and(|peer| peer.capabilities.is_some())
    }

    /// Records a secure-channel failure; returns true once the peer crossed
    /// the isolation threshold and should be dropped and blacklisted.
    pub fn record_secure_failure(&mut self, address: SocketAddr) -> bool {
        let Some(peer) = self.peers.get_mut(&address) else {
            return false;
        };
        peer.secure_failures += 1;
        peer.secure_failures >= self.config.secure_failure_limit
    }

    /// Resets the failure counter after a good message.
    pub fn record_secure_success(&mut self, address: SocketAddr) {
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.secure_failures = 0;
        }
    }

    /// Adds an address to the persistent rejection set and records whether
    /// it was newly added.
    pub fn blacklist_peer(&mut self, address: SocketAddr) -> bool {
        let added = self.blacklist.insert(address);
        if added {
            self.blacklist_dirty = true;
            tracing::warn!("Blacklisted peer {address}");
        }
        added
    }

    pub fn is_blacklisted(&self, address: &SocketAddr) -> bool {
        self.blacklist.contains(address)
    }

    /// Seeds the rejection set from persisted state.
    pub fn load_blacklist(&mut self, addresses: impl IntoIterator<Item = SocketAddr>) {
        self.blacklist.extend(addresses);
    }

    /// Returns the blacklist for persistence when it changed since the last
    /// flush.
    pub fn take_blacklist_flush(&mut self) -> Option<Vec<SocketAddr>> {
        if !self.blacklist_dirty {
            return None;
        }
        self.blacklist_dirty = false;
        Some(self.blacklist.iter().copied().collect())
    }

    /// Computes rotation victims: for each session with more peers than the
    /// threshold, the bottom `ceil(fraction * n)` by combined speed.
    pub fn rotation_victims(&mut self) -> Vec<(ContentId, Vec<SocketAddr>)> {
        let mut by_session: HashMap<ContentId, Vec<SocketAddr>> = HashMap::new();
        for (address, peer) in &self.peers {
            for session in &peer.sessions {
                by_session.entry(*session).or_default().push(*address);
            }
        }

        let mut victims = Vec::new();
        for (session, addresses) in by_session {
            if addresses.len() <= self.config.rotation_peer_threshold {
                continue;
            }

            let mut ranked: Vec<(SocketAddr, u64)> = addresses
                .into_iter()
                .map(|address| {
                    let speed = self
                        .peers
                        .get_mut(&address)
                        .map(|p| p.combined_speed())
                        .unwrap_or(0);
                    (address, speed)
                })
                .collect();
            ranked.sort_by_key(|&(_, speed)| speed);

            let count = (ranked.len() as f64 * self.config.rotation_fraction).ceil() as usize;
            let slowest = ranked
                .into_iter()
                .take(count)
                .map(|(address, _)| address)
                .collect();
            victims.push((session, slowest));
        }
        victims
    }

    /// Sum of peer speeds attributed to a session, in bytes per second.
    pub fn session_speeds(&mut self, session: ContentId) -> (u64, u64) {
        let mut down = 0;
        let mut up = 0;
        for peer in self.peers.values_mut() {
            if peer.sessions.contains(&session) {
                down += peer.download.bytes_per_second();
                up += peer.upload.bytes_per_second();
            }
        }
        (down, up)
    }

    pub fn session_peer_count(&self, session: ContentId) -> usize {
        self.peers
            .values()
            .filter(|peer| peer.sessions.contains(&session))
            .count()
    }

    /// Addresses of every connected peer, for latency probing.
    pub fn peer_addresses(&self) -> Vec<SocketAddr> {
        self.peers.keys().copied().collect()
    }

    /// Sessions a peer currently participates in.
    pub fn peer_sessions(&self, address: &SocketAddr) -> Vec<ContentId> {
        self.peers
            .get(address)
            .map(|peer| peer.sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Health score for a session's swarm in `[0.0, 1.0]`.
    ///
    /// Scores reputation (connect success ratio) and latency; an empty swarm
    /// scores zero.
    pub fn session_health_score(&self, session: ContentId) -> f32 {
        let peers: Vec<&PeerConnection> = self
            .peers
            .values()
            .filter(|peer| peer.sessions.contains(&session))
            .collect();
        if peers.is_empty() {
            return 0.0;
        }

        let total: f32 = peers
            .iter()
            .map(|peer| {
                let latency_score = match peer.latency.average() {
                    Some(avg) => (1.0 - (avg.as_millis() as f32 / 1000.0)).clamp(0.0, 1.0),
                    None => 0.5,
                };
                let reputation_score = self
                    .reputation
                    .get(&peer.address)
                    .map(|entry| {
                        let attempts = entry.successful_connections + entry.failed_connections;
                        if attempts == 0 {
                            0.5
                        } else {
                            entry.successful_connections as f32 / attempts as f32
                        }
                    })
                    .unwrap_or(0.5);
                (latency_score + reputation_score) / 2.0
            })
            .sum();
        total / peers.len() as f32
    }

    /// Drops reputation entries idle longer than the configured TTL.
    pub fn prune_reputation(&mut self) -> usize {
        let ttl = self.config.reputation_ttl;
        let now = Instant::now();
        let before = self.reputation.len();
        self.reputation
            .retain(|_, entry| now.duration_since(entry.last_seen) <= ttl);
        before - self.reputation.len()
    }

    pub fn reputation(&self, address: &SocketAddr) -> Option<&PeerReputationEntry> {
        self.reputation.get(address)
    }

    pub fn connected_peer_count(&self) -> usize {
        self.peers.len()
    }
}
