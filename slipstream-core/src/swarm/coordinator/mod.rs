//! Actor-model swarm coordinator.
//!
//! The coordinator owns every content session and processes commands
//! sequentially. [`SwarmHandle`] is the cloneable public API;
//! [`spawn_swarm_coordinator`] wires the injected collaborators (transport
//! engine, platform monitor, crypto provider, durable store) and starts the
//! actor.

mod actor;
mod commands;
mod core;
mod handle;

#[cfg(test)]
pub mod test_mocks;

#[cfg(test)]
mod integration_tests;

pub use actor::spawn_swarm_coordinator;
pub use commands::{SessionHandle, SwarmCommand, TickKind};
pub use handle::SwarmHandle;
