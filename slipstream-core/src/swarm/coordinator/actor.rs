//! Actor implementation for the swarm coordinator.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use crate::config::SlipstreamConfig;
use crate::crypto::CryptoProvider;
use crate::platform::{PlatformMonitor, ResourceProfile};
use crate::storage::KvStore;
use crate::swarm::SwarmError;
use crate::swarm::transport::{TransportEngine, TransportEvent};
use crate::tasks::TaskScheduler;

use super::commands::{SwarmCommand, TickKind};
use super::core::SwarmCoordinator;
use super::handle::SwarmHandle;

/// Spawns the swarm coordinator actor and returns its handle.
///
/// Creates a coordinator with the injected collaborators, loads persisted
/// state, wires the periodic governance tasks, then runs the actor loop in
/// a separate task. The actor processes commands sequentially, eliminating
/// lock contention and race conditions.
///
/// # Errors
/// - `SwarmError::GovernorMisconfiguration` - Invalid configuration
/// - `SwarmError::Initialization` - Transport engine failed to provide its
///   event stream
pub async fn spawn_swarm_coordinator<T>(
    config: SlipstreamConfig,
    mut transport: T,
    platform: Arc<dyn PlatformMonitor>,
    crypto: Arc<dyn CryptoProvider>,
    store: Arc<dyn KvStore>,
) -> Result<SwarmHandle, SwarmError>
where
    T: TransportEngine + 'static,
{
    config.validate()?;

    let transport_events =
        transport
            .take_event_stream()
            .ok_or_else(|| SwarmError::Initialization {
                reason: "transport engine event stream unavailable".to_string(),
            })?;

    let (sender, receiver) = mpsc::channel(config.swarm.command_capacity);
    let (events_tx, _) = broadcast::channel(config.swarm.event_capacity);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let mut core = SwarmCoordinator::new(
        config.clone(),
        transport,
        crypto,
        store,
        events_tx.clone(),
        internal_tx.clone(),
    )?;
    core.load_persisted().await;
    core.set_profile(platform.profile());
    let platform_watch = platform.watch();

    let tasks = spawn_governance_tasks(&config, internal_tx);

    tokio::spawn(async move {
        run_actor_loop(core, receiver, internal_rx, transport_events, platform_watch, tasks).await;
    });

    Ok(SwarmHandle::new(sender, events_tx))
}

/// Registers the named periodic governance tasks, each feeding a typed tick
/// into the coordinator's internal channel.
fn spawn_governance_tasks(
    config: &SlipstreamConfig,
    internal_tx: mpsc::UnboundedSender<SwarmCommand>,
) -> TaskScheduler {
    let mut tasks = TaskScheduler::new();

    let schedule = [
        ("peer-rotation", config.health.rotation_interval, TickKind::RotatePeers),
        (
            "governor-eval",
            config.governor.reevaluate_interval,
            TickKind::EvaluateResources,
        ),
        ("stats-sample", config.stats.sample_interval, TickKind::SampleStats),
        ("stats-flush", config.stats.flush_interval, TickKind::FlushStats),
        ("cleanup", config.health.cleanup_interval, TickKind::Cleanup),
        (
            "identity-rotation",
            config.identity.check_interval,
            TickKind::RotateIdentity,
        ),
    ];

    for (name, period, kind) in schedule {
        let tx = internal_tx.clone();
        tasks.spawn_periodic(name, period, move || {
            tx.send(SwarmCommand::Tick(kind)).is_ok()
        });
    }

    tasks
}

/// Runs the main actor message processing loop.
///
/// Commands, internal ticks, transport events, and platform changes are
/// processed one at a time in order, so state never needs locking. The loop
/// ends when the command channel closes or a shutdown command arrives.
async fn run_actor_loop<T>(
    mut core: SwarmCoordinator<T>,
    mut receiver: mpsc::Receiver<SwarmCommand>,
    mut internal: mpsc::UnboundedReceiver<SwarmCommand>,
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    mut platform_watch: watch::Receiver<ResourceProfile>,
    mut tasks: TaskScheduler,
) where
    T: TransportEngine + 'static,
{
    tracing::debug!("Swarm coordinator actor started");
    let mut platform_alive = true;

    loop {
        tokio::select! {
            Some(command) = receiver.recv() => {
                if !handle_command(&mut core, command).await {
                    break;
                }
            }
            Some(command) = internal.recv() => {
                if !handle_command(&mut core, command).await {
                    break;
                }
            }
            Some(event) = transport_events.recv() => {
                core.handle_transport_event(event).await;
            }
            changed = platform_watch.changed(), if platform_alive => {
                match changed {
                    Ok(()) => {
                        let profile = platform_watch.borrow_and_update().clone();
                        core.platform_changed(profile).await;
                    }
                    Err(_) => platform_alive = false,
                }
            }
            else => break,
        }
    }

    tasks.shutdown();
    tracing::debug!("Swarm coordinator actor stopped");
}

/// Handles a single command. Returns true to continue processing, false to
/// shut down.
async fn handle_command<T>(core: &mut SwarmCoordinator<T>, command: SwarmCommand) -> bool
where
    T: TransportEngine + 'static,
{
    match command {
        SwarmCommand::StartSeeding {
            path,
            metadata,
            responder,
        } => {
            let result = core.start_seeding(path, metadata).await;
            let _ = responder.send(result);
        }

        SwarmCommand::StartDownload {
            locator,
            metadata,
            responder,
        } => {
            let result = core.start_download(&locator, metadata).await;
            let _ = responder.send(result);
        }

        SwarmCommand::StartStreaming {
            locator,
            sink,
            metadata,
            responder,
        } => {
            let result = core.start_streaming(&locator, sink, metadata).await;
            let _ = responder.send(result);
        }

        SwarmCommand::Stop {
            content_id,
            responder,
        } => {
            let result = core.stop(content_id).await;
            let _ = responder.send(result);
        }

        SwarmCommand::UpdatePlaybackPosition {
            content_id,
            position_secs,
            responder,
        } => {
            let result = core.update_playback_position(content_id, position_secs).await;
            let _ = responder.send(result);
        }

        SwarmCommand::ListSessions { responder } => {
            let _ = responder.send(core.session_summaries());
        }

        SwarmCommand::Stats { responder } => {
            let _ = responder.send(core.aggregate_stats());
        }

        SwarmCommand::UpdatePolicy { policy, responder } => {
            let result = core.update_policy(policy).await;
            let _ = responder.send(result);
        }

        SwarmCommand::Shutdown { responder } => {
            core.shutdown_flush().await;
            let _ = responder.send(());
            return false;
        }

        SwarmCommand::Tick(kind) => match kind {
            TickKind::RotatePeers => core.tick_rotate_peers().await,
            TickKind::EvaluateResources => core.tick_evaluate_resources().await,
            TickKind::SampleStats => core.tick_sample_stats(),
            TickKind::FlushStats => core.tick_flush().await,
            TickKind::Cleanup => core.tick_cleanup(),
            TickKind::RotateIdentity => core.tick_rotate_identity().await,
        },

        SwarmCommand::Reannounce { content_id } => {
            core.handle_reannounce(content_id).await;
        }
    }

    true
}
