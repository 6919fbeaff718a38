//! Transfer statistics: sliding-window moving averages, monotonic peaks,
//! and periodically persisted cumulative totals.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::StatsConfig;

use super::ContentId;

/// Cumulative per-content byte totals.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContentTotals {
    pub downloaded: u64,
    pub uploaded: u64,
}

/// Durable statistics record flushed on the long period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedStats {
    pub total_downloaded: u64,
    pub total_uploaded: u64,
    pub peak_download_bps: u64,
    pub peak_upload_bps: u64,
    pub per_content: HashMap<ContentId, ContentTotals>,
}

/// Aggregate snapshot exposed through the public API.
#[derive(Debug, Clone, Default)]
pub struct AggregateStats {
    pub active_sessions: usize,
    pub seeding_sessions: usize,
    pub connected_peers: usize,
    pub total_downloaded: u64,
    pub total_uploaded: u64,
    pub average_download_bps: u64,
    pub average_upload_bps: u64,
    pub peak_download_bps: u64,
    pub peak_upload_bps: u64,
}

#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    at: Instant,
    download_bps: u64,
    upload_bps: u64,
}

/// Maintains moving averages, peaks, and per-content totals.
///
/// `sample` runs on the short period; `take_flush` hands out a persistence
/// snapshot on the long period to bound write amplification.
pub struct StatsAggregator {
    window: Duration,
    samples: VecDeque<SpeedSample>,
    totals: PersistedStats,
    dirty: bool,
}

impl StatsAggregator {
    pub fn new(config: &StatsConfig) -> Self {
        Self {
            window: config.window,
            samples: VecDeque::new(),
            totals: PersistedStats::default(),
            dirty: false,
        }
    }

    /// Seeds cumulative totals from persisted state.
    pub fn load(&mut self, persisted: PersistedStats) {
        self.totals = persisted;
    }

    /// Accounts transferred bytes against cumulative and per-content totals.
    pub fn record_transfer(&mut self, content_id: ContentId, downloaded: u64, uploaded: u64) {
        if downloaded == 0 && uploaded == 0 {
            return;
        }
        self.totals.total_downloaded += downloaded;
        self.totals.total_uploaded += uploaded;
        let entry = self.totals.per_content.entry(content_id).or_default();
        entry.downloaded += downloaded;
        entry.uploaded += uploaded;
        self.dirty = true;
    }

    /// Folds current speeds into the sliding window and updates peaks.
    pub fn sample(&mut self, download_bps: u64, upload_bps: u64) {
        let now = Instant::now();
        self.samples.push_back(SpeedSample {
            at: now,
            download_bps,
            upload_bps,
        });
        self.evict(now);

        if download_bps > self.totals.peak_download_bps {
            self.totals.peak_download_bps = download_bps;
            self.dirty = true;
        }
        if upload_bps > self.totals.peak_upload_bps {
            self.totals.peak_upload_bps = upload_bps;
            self.dirty = true;
        }
    }

    /// Evicts samples older than the window; runs before every average.
    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn average_download_bps(&mut self) -> u64 {
        self.evict(Instant::now());
        if self.samples.is_empty() {
            return 0;
        }
        let sum: u64 = self.samples.iter().map(|s| s.download_bps).sum();
        sum / self.samples.len() as u64
    }

    pub fn average_upload_bps(&mut self) -> u64 {
        self.evict(Instant::now());
        if self.samples.is_empty() {
            return 0;
        }
        let sum: u64 = self.samples.iter().map(|s| s.upload_bps).sum();
        sum / self.samples.len() as u64
    }

    /// Estimated seconds until `remaining_bytes` drain at the current
    /// average download speed.
    pub fn eta_seconds(&mut self, remaining_bytes: u64) -> Option<u64> {
        let speed = self.average_download_bps();
        if speed == 0 || remaining_bytes == 0 {
            return None;
        }
        Some(remaining_bytes / speed)
    }

    /// Returns the totals for persistence when they changed since the last
    /// flush.
    pub fn take_flush(&mut self) -> Option<PersistedStats> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.totals.clone())
    }

    pub fn totals(&self) -> &PersistedStats {
        &self.totals
    }

    pub fn content_totals(&self, content_id: &ContentId) -> ContentTotals {
        self.totals
            .per_content
            .get(content_id)
            .copied()
            .unwrap_or_default()
    }

    /// Builds the public aggregate snapshot.
    pub fn aggregate(
        &mut self,
        active_sessions: usize,
        seeding_sessions: usize,
        connected_peers: usize,
    ) -> AggregateStats {
        AggregateStats {
            active_sessions,
            seeding_sessions,
            connected_peers,
            total_downloaded: self.totals.total_downloaded,
            total_uploaded: self.totals.total_uploaded,
            average_download_bps: self.average_download_bps(),
            average_upload_bps: self.average_upload_bps(),
            peak_download_bps: self.totals.peak_download_bps,
            peak_upload_bps: self.totals.peak_upload_bps,
        }
    }
}
