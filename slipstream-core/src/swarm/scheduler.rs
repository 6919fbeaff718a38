//! Piece prioritization for progressive streaming.
//!
//! Recomputation is a pure function of session layout plus playback
//! position: it holds no network state and mutates only the session's
//! per-piece priority field, which the transport engine reads when deciding
//! which piece to request from which peer. Stale priorities are harmless,
//! only suboptimal, so recomputation is commutative with piece-completion
//! events.

use crate::config::SchedulerConfig;

use super::session::ContentSession;

/// Priority tiers for piece selection. Strictly ordered: any piece in the
/// pre-buffer window outranks the lookahead window, which outranks baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PiecePriority {
    /// Baseline - everything is still eventually fetched
    Low = 1,
    /// Extended lookahead window ahead of the pre-buffer
    Normal = 2,
    /// Small window behind the playback position, for backward seeks
    High = 3,
    /// Forward pre-buffer window that must never stall playback
    Critical = 4,
}

/// Computes per-piece fetch priorities from the playback position.
///
/// Triggered on every playback-position change rather than continuously,
/// to bound overhead.
#[derive(Debug, Clone)]
pub struct PieceScheduler {
    config: SchedulerConfig,
}

impl PieceScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Recomputes the session's piece priorities for the given playback
    /// position.
    pub fn recompute(&self, session: &mut ContentSession, position_secs: f64) {
        session.playback_position_secs = position_secs;
        session.piece_priorities = self.assign_priorities(
            session.total_size,
            session.piece_size,
            session.piece_count,
            session.metadata.duration_secs,
            position_secs,
        );

        tracing::debug!(
            "Recomputed priorities for {} at position {position_secs:.1}s",
            session.content_id
        );
    }

    /// Pure priority assignment over a piece space.
    pub fn assign_priorities(
        &self,
        total_size: u64,
        piece_size: u32,
        piece_count: u32,
        duration_secs: Option<f64>,
        position_secs: f64,
    ) -> Vec<PiecePriority> {
        let bytes_per_sec = self.estimate_byte_rate(total_size, duration_secs);

        let current_piece = self.position_to_piece(position_secs, bytes_per_sec, piece_size);
        let current_piece = current_piece.min(piece_count.saturating_sub(1));

        let prebuffer = self.window_pieces(self.config.prebuffer_secs, bytes_per_sec, piece_size);
        let lookahead = self.window_pieces(self.config.lookahead_secs, bytes_per_sec, piece_size);
        let rewind = self.config.rewind_pieces;

        (0..piece_count)
            .map(|piece| {
                if piece >= current_piece {
                    let distance = piece - current_piece;
                    if distance < prebuffer {
                        PiecePriority::Critical
                    } else if distance < prebuffer + lookahead {
                        PiecePriority::Normal
                    } else {
                        PiecePriority::Low
                    }
                } else {
                    let distance = current_piece - piece;
                    if distance <= rewind {
                        PiecePriority::High
                    } else {
                        PiecePriority::Low
                    }
                }
            })
            .collect()
    }

    /// Estimates playback bytes per second from declared duration, falling
    /// back to the configured default when unknown.
    fn estimate_byte_rate(&self, total_size: u64, duration_secs: Option<f64>) -> f64 {
        let duration = duration_secs
            .filter(|&d| d > 0.0)
            .unwrap_or(self.config.default_duration_secs);
        (total_size as f64 / duration).max(1.0)
    }

    fn position_to_piece(&self, position_secs: f64, bytes_per_sec: f64, piece_size: u32) -> u32 {
        let byte_position = (position_secs.max(0.0) * bytes_per_sec) as u64;
        (byte_position / piece_size as u64) as u32
    }

    /// Converts a window in playback seconds to a piece count, at least one.
    fn window_pieces(&self, seconds: f64, bytes_per_sec: f64, piece_size: u32) -> u32 {
        let bytes = seconds * bytes_per_sec;
        ((bytes / piece_size as f64).ceil() as u32).max(1)
    }
}
