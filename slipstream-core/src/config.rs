//! Centralized configuration for Slipstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

use crate::swarm::SwarmError;
use crate::swarm::governor::UserPolicy;

/// Central configuration for all Slipstream components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SlipstreamConfig {
    pub swarm: SwarmConfig,
    pub scheduler: SchedulerConfig,
    pub health: HealthConfig,
    pub governor: GovernorConfig,
    pub stats: StatsConfig,
    pub identity: IdentityConfig,
}

/// Coordinator-wide configuration.
///
/// Controls channel capacities, retry behavior, and shutdown timing.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Command channel capacity for the coordinator actor
    pub command_capacity: usize,
    /// Event broadcast channel capacity
    pub event_capacity: usize,
    /// Re-announce attempts before a transport failure becomes fatal
    pub max_announce_retries: u32,
    /// Base delay for re-announce exponential backoff
    pub announce_backoff_base: Duration,
    /// Upper bound on re-announce backoff
    pub announce_backoff_max: Duration,
    /// Grace period when closing a session's connections
    pub stop_grace: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            command_capacity: 100,
            event_capacity: 256,
            max_announce_retries: 3,
            announce_backoff_base: Duration::from_millis(500),
            announce_backoff_max: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// Piece prioritization configuration.
///
/// Window sizes are expressed in playback seconds and converted to pieces
/// using the session's estimated byte rate.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Forward pre-buffer window that must never stall playback
    pub prebuffer_secs: f64,
    /// Extended lookahead window beyond the pre-buffer
    pub lookahead_secs: f64,
    /// Pieces behind the playback position kept warm for backward seeks
    pub rewind_pieces: u32,
    /// Assumed duration when the caller supplied none.
    /// Known approximation: misprioritizes very short or very long content.
    pub default_duration_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            prebuffer_secs: 30.0,
            lookahead_secs: 120.0,
            rewind_pieces: 2,
            default_duration_secs: 5400.0, // 90 minutes
        }
    }
}

/// Peer health monitoring and rotation configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Interval between rotation passes
    pub rotation_interval: Duration,
    /// Sessions with more peers than this are eligible for rotation
    pub rotation_peer_threshold: usize,
    /// Fraction of a session's peers dropped per rotation, rounded up
    pub rotation_fraction: f64,
    /// Sliding window for per-peer speed estimation
    pub rate_window: Duration,
    /// Samples kept in the latency moving average
    pub latency_samples: usize,
    /// Secure channel failures tolerated before a peer is dropped
    pub secure_failure_limit: u32,
    /// Reputation entries idle longer than this are pruned
    pub reputation_ttl: Duration,
    /// Interval between cleanup passes
    pub cleanup_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(30),
            rotation_peer_threshold: 8,
            rotation_fraction: 0.2,
            rate_window: Duration::from_secs(10),
            latency_samples: 8,
            secure_failure_limit: 5,
            reputation_ttl: Duration::from_secs(7 * 24 * 3600),
            cleanup_interval: Duration::from_secs(600),
        }
    }
}

/// Resource governance configuration.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// User policy; validated, never silently clamped
    pub policy: UserPolicy,
    /// Safety re-evaluation interval on top of platform change signals
    pub reevaluate_interval: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            policy: UserPolicy::default(),
            reevaluate_interval: Duration::from_secs(60),
        }
    }
}

/// Statistics aggregation configuration.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Sampling period for moving averages
    pub sample_interval: Duration,
    /// Sliding window over which averages are computed
    pub window: Duration,
    /// Persistence period for cumulative totals
    pub flush_interval: Duration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            window: Duration::from_secs(30),
            flush_interval: Duration::from_secs(300),
        }
    }
}

/// Rotating identity configuration.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Maximum identity age before rotation
    pub rotation_interval: Duration,
    /// How often rotation eligibility is checked
    pub check_interval: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(6 * 3600),
            check_interval: Duration::from_secs(600),
        }
    }
}

impl SlipstreamConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(max_peers) = std::env::var("SLIPSTREAM_MAX_PEERS") {
            if let Ok(count) = max_peers.parse::<usize>() {
                config.governor.policy.max_peers = count;
            }
        }

        if let Ok(limit) = std::env::var("SLIPSTREAM_UPLOAD_LIMIT") {
            if let Ok(bps) = limit.parse::<u64>() {
                config.governor.policy.upload_limit_bps = bps;
            }
        }

        if let Ok(wifi_only) = std::env::var("SLIPSTREAM_ONLY_ON_WIFI") {
            config.governor.policy.only_on_wifi = wifi_only.parse().unwrap_or(false);
        }

        if let Ok(save_battery) = std::env::var("SLIPSTREAM_SAVE_BATTERY") {
            config.governor.policy.save_battery = save_battery.parse().unwrap_or(false);
        }

        config
    }

    /// Creates a configuration with short timers for fast tests.
    pub fn for_testing() -> Self {
        Self {
            swarm: SwarmConfig {
                max_announce_retries: 2,
                announce_backoff_base: Duration::from_millis(10),
                announce_backoff_max: Duration::from_millis(50),
                stop_grace: Duration::from_millis(100),
                ..SwarmConfig::default()
            },
            health: HealthConfig {
                rotation_interval: Duration::from_millis(50),
                rate_window: Duration::from_millis(500),
                cleanup_interval: Duration::from_millis(200),
                ..HealthConfig::default()
            },
            stats: StatsConfig {
                sample_interval: Duration::from_millis(20),
                window: Duration::from_millis(500),
                flush_interval: Duration::from_millis(200),
            },
            identity: IdentityConfig {
                rotation_interval: Duration::from_secs(3600),
                check_interval: Duration::from_millis(200),
            },
            ..Self::default()
        }
    }

    /// Validates every section, rejecting misconfiguration instead of
    /// clamping it.
    ///
    /// # Errors
    /// - `SwarmError::GovernorMisconfiguration` - Invalid policy or interval values
    pub fn validate(&self) -> Result<(), SwarmError> {
        self.governor.policy.validate()?;

        if !(0.0..=1.0).contains(&self.health.rotation_fraction) {
            return Err(SwarmError::GovernorMisconfiguration {
                reason: format!(
                    "rotation_fraction {} outside [0.0, 1.0]",
                    self.health.rotation_fraction
                ),
            });
        }

        if self.scheduler.prebuffer_secs <= 0.0 || self.scheduler.default_duration_secs <= 0.0 {
            return Err(SwarmError::GovernorMisconfiguration {
                reason: "scheduler windows must be positive".to_string(),
            });
        }

        if self.stats.window < self.stats.sample_interval {
            return Err(SwarmError::GovernorMisconfiguration {
                reason: "stats window shorter than sample interval".to_string(),
            });
        }

        Ok(())
    }
}
