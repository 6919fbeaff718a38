//! Content session state: one content item being seeded, downloaded, or
//! streamed.
//!
//! Sessions are owned exclusively by the coordinator actor; every other
//! component sees at most a borrowed view.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use super::governor::PauseReason;
use super::scheduler::PiecePriority;
use super::{ContentId, SwarmError};

/// Lifecycle status of a content session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Queued,
    Downloading,
    Streaming,
    Seeding,
    Completed,
    Error,
}

impl SessionStatus {
    /// Whether the session is uploading to other peers.
    pub fn is_seeding(self) -> bool {
        matches!(self, SessionStatus::Seeding)
    }

    /// Whether the session is still fetching pieces.
    pub fn is_fetching(self) -> bool {
        matches!(self, SessionStatus::Downloading | SessionStatus::Streaming)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Queued => "queued",
            SessionStatus::Downloading => "downloading",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Seeding => "seeding",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Caller-supplied metadata attached to a session.
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    pub category: Option<String>,
    pub quality: Option<String>,
    /// Declared playback duration; the scheduler falls back to a default
    /// when absent.
    pub duration_secs: Option<f64>,
    /// Expected content digest; enables hash verification on completion.
    pub content_digest: Option<[u8; 32]>,
}

/// How the session was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Seed,
    Download,
    Stream,
}

/// Parameters for constructing a [`ContentSession`].
pub struct SessionParams {
    pub content_id: ContentId,
    pub name: String,
    pub total_size: u64,
    pub piece_size: u32,
    pub piece_count: u32,
    pub mode: SessionMode,
    pub metadata: SessionMetadata,
    /// Local file backing a seeded session, when known.
    pub file_path: Option<PathBuf>,
}

/// One content item being seeded, downloaded, or streamed.
pub struct ContentSession {
    pub content_id: ContentId,
    pub name: String,
    pub total_size: u64,
    pub piece_size: u32,
    pub piece_count: u32,
    /// Completion bits; length always equals `piece_count`.
    pub completed_pieces: Vec<bool>,
    /// Per-piece fetch priority read by the transport engine.
    pub piece_priorities: Vec<PiecePriority>,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub metadata: SessionMetadata,
    pub file_path: Option<PathBuf>,
    pub created_at: Instant,
    pub completed_at: Option<Instant>,
    /// Current playback position for streaming sessions, in seconds.
    pub playback_position_secs: f64,
    /// Session-scoped ephemeral identifier used in metadata exchanges.
    pub channel_id: String,
    pub bytes_downloaded: u64,
    pub bytes_uploaded: u64,
    /// Re-announce attempts since the last successful tracker response.
    pub announce_retries: u32,
    /// Set while the governor has paused this session's uploads.
    pub paused: Option<PauseReason>,
}

impl ContentSession {
    /// Creates a new session, establishing the bit-vector length invariant.
    ///
    /// # Errors
    /// - `SwarmError::Transport` - Transport reported a zero-piece session
    pub fn new(params: SessionParams, channel_id: String) -> Result<Self, SwarmError> {
        if params.piece_count == 0 {
            return Err(SwarmError::Transport {
                reason: format!("session {} has no pieces", params.content_id),
            });
        }

        let piece_count = params.piece_count as usize;
        let completed = params.mode == SessionMode::Seed;
        let status = match params.mode {
            SessionMode::Seed => SessionStatus::Queued,
            SessionMode::Download => SessionStatus::Downloading,
            SessionMode::Stream => SessionStatus::Streaming,
        };

        Ok(Self {
            content_id: params.content_id,
            name: params.name,
            total_size: params.total_size,
            piece_size: params.piece_size,
            piece_count: params.piece_count,
            completed_pieces: vec![completed; piece_count],
            piece_priorities: vec![PiecePriority::Normal; piece_count],
            status,
            mode: params.mode,
            metadata: params.metadata,
            file_path: params.file_path,
            created_at: Instant::now(),
            completed_at: None,
            playback_position_secs: 0.0,
            channel_id,
            bytes_downloaded: 0,
            bytes_uploaded: 0,
            announce_retries: 0,
            paused: None,
        })
    }

    /// Marks a piece complete; out-of-range indices are ignored and logged.
    pub fn complete_piece(&mut self, piece_index: u32) {
        match self.completed_pieces.get_mut(piece_index as usize) {
            Some(bit) => *bit = true,
            None => {
                tracing::warn!(
                    "Piece index {piece_index} out of range for session {}",
                    self.content_id
                );
            }
        }
    }

    /// Whether every completion bit is set.
    pub fn is_complete(&self) -> bool {
        self.completed_pieces.iter().all(|&bit| bit)
    }

    /// Completion ratio in `[0.0, 1.0]`.
    pub fn progress(&self) -> f32 {
        let completed = self.completed_pieces.iter().filter(|&&bit| bit).count();
        completed as f32 / self.piece_count as f32
    }

    /// Bytes still missing, derived from incomplete pieces.
    pub fn remaining_bytes(&self) -> u64 {
        let missing = self.completed_pieces.iter().filter(|&&bit| !bit).count() as u64;
        (missing * self.piece_size as u64).min(self.total_size)
    }

    /// Snapshot for the public API.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            content_id: self.content_id,
            name: self.name.clone(),
            status: self.status,
            progress: self.progress(),
            total_size: self.total_size,
            bytes_downloaded: self.bytes_downloaded,
            bytes_uploaded: self.bytes_uploaded,
        }
    }
}

/// Read-only session snapshot returned by `list_sessions`.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub content_id: ContentId,
    pub name: String,
    pub status: SessionStatus,
    pub progress: f32,
    pub total_size: u64,
    pub bytes_downloaded: u64,
    pub bytes_uploaded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_id() -> ContentId {
        ContentId::new([3u8; 20])
    }

    fn download_params(piece_count: u32) -> SessionParams {
        SessionParams {
            content_id: test_id(),
            name: "clip.mp4".to_string(),
            total_size: piece_count as u64 * 16384,
            piece_size: 16384,
            piece_count,
            mode: SessionMode::Download,
            metadata: SessionMetadata::default(),
            file_path: None,
        }
    }

    #[test]
    fn bit_vector_length_matches_piece_count() {
        let session = ContentSession::new(download_params(12), "chan".to_string()).unwrap();
        assert_eq!(session.completed_pieces.len(), 12);
        assert_eq!(session.piece_priorities.len(), 12);
        assert_eq!(session.status, SessionStatus::Downloading);
    }

    #[test]
    fn rejects_zero_piece_session() {
        assert!(ContentSession::new(download_params(0), "chan".to_string()).is_err());
    }

    #[test]
    fn seed_sessions_start_fully_complete() {
        let params = SessionParams {
            mode: SessionMode::Seed,
            ..download_params(4)
        };
        let session = ContentSession::new(params, "chan".to_string()).unwrap();
        assert!(session.is_complete());
        assert_eq!(session.progress(), 1.0);
        assert_eq!(session.remaining_bytes(), 0);
    }

    #[test]
    fn progress_tracks_completed_pieces() {
        let mut session = ContentSession::new(download_params(4), "chan".to_string()).unwrap();
        assert_eq!(session.progress(), 0.0);

        session.complete_piece(0);
        session.complete_piece(1);
        assert_eq!(session.progress(), 0.5);
        assert_eq!(session.remaining_bytes(), 2 * 16384);

        // Out of range is ignored
        session.complete_piece(99);
        assert_eq!(session.progress(), 0.5);
    }
}
