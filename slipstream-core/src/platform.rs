//! Platform information seam: network class, metered flag, battery state.
//!
//! The host application observes OS connectivity/battery signals and pushes
//! snapshots through a [`PlatformFeed`]; the coordinator reacts to every
//! change via the watch channel.

use tokio::sync::watch;

/// Coarse network classification used to scale resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkClass {
    Wifi,
    Ethernet,
    Cellular5g,
    Cellular4g,
    Cellular3g,
    Unknown,
}

impl NetworkClass {
    /// Scaling factor applied to peer-count and upload caps on lower-quality
    /// network classes.
    pub fn quality_factor(self) -> f64 {
        match self {
            NetworkClass::Wifi | NetworkClass::Ethernet => 1.0,
            NetworkClass::Cellular5g => 0.9,
            NetworkClass::Cellular4g => 0.6,
            NetworkClass::Cellular3g => 0.3,
            NetworkClass::Unknown => 0.5,
        }
    }
}

/// Transient snapshot of platform conditions.
///
/// Recomputed on every platform signal; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceProfile {
    pub network: NetworkClass,
    pub metered: bool,
    /// Battery charge in `[0.0, 1.0]`.
    pub battery_level: f32,
    pub charging: bool,
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self {
            network: NetworkClass::Wifi,
            metered: false,
            battery_level: 1.0,
            charging: true,
        }
    }
}

/// Source of platform snapshots and change notifications.
pub trait PlatformMonitor: Send + Sync {
    /// Current snapshot of platform conditions.
    fn profile(&self) -> ResourceProfile;

    /// Change notifications; the receiver yields whenever any input changes.
    fn watch(&self) -> watch::Receiver<ResourceProfile>;
}

/// Channel-backed monitor fed by the embedding application.
///
/// Host code translates OS callbacks (connectivity changed, battery level
/// changed) into [`PlatformFeed::publish`] calls. Also serves as the test
/// double for platform-driven scenarios.
#[derive(Debug)]
pub struct PlatformFeed {
    sender: watch::Sender<ResourceProfile>,
}

impl PlatformFeed {
    pub fn new(initial: ResourceProfile) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Publishes a new snapshot to all watchers.
    pub fn publish(&self, profile: ResourceProfile) {
        // send_replace never fails even with no active receivers
        self.sender.send_replace(profile);
    }
}

impl Default for PlatformFeed {
    fn default() -> Self {
        Self::new(ResourceProfile::default())
    }
}

impl PlatformMonitor for PlatformFeed {
    fn profile(&self) -> ResourceProfile {
        self.sender.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<ResourceProfile> {
        self.sender.subscribe()
    }
}
