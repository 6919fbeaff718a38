//! Resource governance: adapts concurrency, throttles, and pause/resume
//! decisions to network and battery conditions.
//!
//! The governor is a pure state machine; the coordinator applies its
//! decisions to the transport engine and emits the corresponding bandwidth
//! events.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::platform::ResourceProfile;

use super::SwarmError;

/// User-configured sharing policy. Persisted as the `policy` record.
///
/// Invalid values are rejected at configuration time, never silently
/// clamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPolicy {
    /// Seed only on unmetered (Wi-Fi class) connections
    pub only_on_wifi: bool,
    /// Pause seeding while discharging below the low-battery threshold
    pub save_battery: bool,
    /// Battery charge in `[0.0, 1.0]` under which battery saving engages
    pub low_battery_threshold: f32,
    /// Upper bound on concurrent peer connections
    pub max_peers: usize,
    /// Upload throttle in bytes per second
    pub upload_limit_bps: u64,
}

impl Default for UserPolicy {
    fn default() -> Self {
        Self {
            only_on_wifi: false,
            save_battery: true,
            low_battery_threshold: 0.25,
            max_peers: 50,
            upload_limit_bps: 512 * 1024,
        }
    }
}

impl UserPolicy {
    /// Validates policy values.
    ///
    /// # Errors
    /// - `SwarmError::GovernorMisconfiguration` - Zero caps or out-of-range threshold
    pub fn validate(&self) -> Result<(), SwarmError> {
        if self.max_peers == 0 {
            return Err(SwarmError::GovernorMisconfiguration {
                reason: "max_peers must be at least 1".to_string(),
            });
        }
        if self.upload_limit_bps == 0 {
            return Err(SwarmError::GovernorMisconfiguration {
                reason: "upload_limit_bps must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.low_battery_threshold) {
            return Err(SwarmError::GovernorMisconfiguration {
                reason: format!(
                    "low_battery_threshold {} outside [0.0, 1.0]",
                    self.low_battery_threshold
                ),
            });
        }
        Ok(())
    }
}

/// Why seeding is currently paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    MeteredNetwork,
    LowBattery,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PauseReason::MeteredNetwork => "metered_network",
            PauseReason::LowBattery => "low_battery",
        };
        write!(f, "{name}")
    }
}

/// Paused/running edge produced by an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    PauseSeeding(PauseReason),
    ResumeSeeding(PauseReason),
    None,
}

/// Output of one governor evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernorDecision {
    pub sharing_allowed: bool,
    pub max_peers: usize,
    pub upload_limit_bps: u64,
    pub transition: Transition,
}

/// State machine over platform inputs and user policy.
pub struct ResourceGovernor {
    policy: UserPolicy,
    paused: Option<PauseReason>,
}

impl ResourceGovernor {
    /// Creates a governor with a validated policy.
    ///
    /// # Errors
    /// - `SwarmError::GovernorMisconfiguration` - Policy fails validation
    pub fn new(policy: UserPolicy) -> Result<Self, SwarmError> {
        policy.validate()?;
        Ok(Self {
            policy,
            paused: None,
        })
    }

    pub fn policy(&self) -> &UserPolicy {
        &self.policy
    }

    /// Replaces the policy after validating it.
    ///
    /// # Errors
    /// - `SwarmError::GovernorMisconfiguration` - Policy fails validation
    pub fn update_policy(&mut self, policy: UserPolicy) -> Result<(), SwarmError> {
        policy.validate()?;
        self.policy = policy;
        Ok(())
    }

    /// Evaluates the transition rules against a platform snapshot.
    ///
    /// Runs whenever any input changes. When the pause reason changes while
    /// already paused (metered, then battery drops too), the stored reason
    /// updates without a second pause edge, keeping pause events
    /// once-per-edge.
    pub fn evaluate(&mut self, profile: &ResourceProfile) -> GovernorDecision {
        let pause = self.required_pause(profile);

        let transition = match (self.paused, pause) {
            (None, Some(reason)) => Transition::PauseSeeding(reason),
            (Some(reason), None) => Transition::ResumeSeeding(reason),
            _ => Transition::None,
        };
        self.paused = pause;

        let scale = profile.network.quality_factor();
        let max_peers = ((self.policy.max_peers as f64 * scale) as usize).max(1);
        let upload_limit_bps = ((self.policy.upload_limit_bps as f64 * scale) as u64).max(1);

        GovernorDecision {
            sharing_allowed: pause.is_none(),
            max_peers,
            upload_limit_bps,
            transition,
        }
    }

    fn required_pause(&self, profile: &ResourceProfile) -> Option<PauseReason> {
        if profile.metered && self.policy.only_on_wifi {
            return Some(PauseReason::MeteredNetwork);
        }
        // Battery rule applies regardless of network
        if self.policy.save_battery
            && !profile.charging
            && profile.battery_level < self.policy.low_battery_threshold
        {
            return Some(PauseReason::LowBattery);
        }
        None
    }

    pub fn paused_reason(&self) -> Option<PauseReason> {
        self.paused
    }
}
