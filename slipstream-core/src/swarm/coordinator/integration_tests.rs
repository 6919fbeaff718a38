//! Integration tests for swarm coordination, streaming prioritization, and
//! resource governance.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{broadcast, mpsc};

    use crate::config::SlipstreamConfig;
    use crate::crypto::ChaChaCrypto;
    use crate::platform::{PlatformFeed, ResourceProfile};
    use crate::storage::{KvStore, MemoryStore, keys};
    use crate::swarm::coordinator::test_mocks::MockTransport;
    use crate::swarm::coordinator::spawn_swarm_coordinator;
    use crate::swarm::events::{BandwidthAction, ErrorKind, SecurityKind, SwarmEvent};
    use crate::swarm::scheduler::PiecePriority;
    use crate::swarm::session::{SessionMetadata, SessionStatus};
    use crate::swarm::transport::TransportEventKind;
    use crate::swarm::{Identity, PeerMessage, SecureChannel, SwarmError, SwarmHandle};

    fn hex_id(tag: u8) -> String {
        hex::encode([tag; 20])
    }

    fn locator(tag: u8) -> String {
        format!("swarm:?id={}&dn=clip-{tag}", hex_id(tag))
    }

    fn peer(port: u16) -> SocketAddr {
        format!("10.1.1.1:{port}").parse().unwrap()
    }

    struct Harness {
        handle: SwarmHandle,
        transport: MockTransport,
        platform: Arc<PlatformFeed>,
        store: Arc<MemoryStore>,
    }

    async fn spawn_with(config: SlipstreamConfig, transport: MockTransport) -> Harness {
        let platform = Arc::new(PlatformFeed::default());
        let store = Arc::new(MemoryStore::new());
        let handle = spawn_swarm_coordinator(
            config,
            transport.clone(),
            platform.clone(),
            Arc::new(ChaChaCrypto::new()),
            store.clone(),
        )
        .await
        .expect("coordinator spawns");
        Harness {
            handle,
            transport,
            platform,
            store,
        }
    }

    async fn spawn_default() -> Harness {
        spawn_with(SlipstreamConfig::for_testing(), MockTransport::new()).await
    }

    /// Collects events until the deadline; lagged receivers keep reading.
    async fn collect_events(
        rx: &mut broadcast::Receiver<SwarmEvent>,
        window: Duration,
    ) -> Vec<SwarmEvent> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Ok(event)) => events.push(event),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                _ => break,
            }
        }
        events
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    #[tokio::test]
    async fn malformed_locator_is_a_typed_error_before_transport() {
        let harness = spawn_default().await;

        let result = harness
            .handle
            .start_download("swarm:?dn=no-id-here", SessionMetadata::default())
            .await;
        assert!(matches!(result, Err(SwarmError::InvalidLocator { .. })));

        let result = harness
            .handle
            .start_download("http://not-a-swarm/", SessionMetadata::default())
            .await;
        assert!(matches!(result, Err(SwarmError::InvalidLocator { .. })));
    }

    #[tokio::test]
    async fn session_creation_failure_surfaces_immediately() {
        let harness = spawn_with(
            SlipstreamConfig::for_testing(),
            MockTransport::new_with_creation_failure(),
        )
        .await;

        let result = harness
            .handle
            .start_download(&locator(1), SessionMetadata::default())
            .await;
        assert!(matches!(result, Err(SwarmError::Transport { .. })));
    }

    #[tokio::test]
    async fn duplicate_session_is_rejected() {
        let harness = spawn_default().await;

        harness
            .handle
            .start_download(&locator(1), SessionMetadata::default())
            .await
            .unwrap();
        let result = harness
            .handle
            .start_download(&locator(1), SessionMetadata::default())
            .await;
        assert!(matches!(result, Err(SwarmError::DuplicateSession { .. })));
    }

    #[tokio::test]
    async fn streaming_priority_window_shifts_with_playback() {
        let mut config = SlipstreamConfig::for_testing();
        // 10 pieces over a 10-second clip: one piece per playback second
        config.scheduler.prebuffer_secs = 3.0;
        config.scheduler.lookahead_secs = 2.0;
        config.scheduler.rewind_pieces = 0;
        config.scheduler.default_duration_secs = 10.0;
        let harness = spawn_with(config, MockTransport::new()).await;

        let (sink, _sink_rx) = mpsc::channel(16);
        let metadata = SessionMetadata {
            duration_secs: Some(10.0),
            ..SessionMetadata::default()
        };
        let session = harness
            .handle
            .start_streaming(&locator(7), sink, metadata)
            .await
            .unwrap();

        // Position 0: pre-buffer covers pieces {0..3}
        let priorities = harness
            .transport
            .piece_priorities(session.content_id)
            .expect("initial priorities pushed");
        assert!(
            priorities[0..3]
                .iter()
                .all(|p| *p == PiecePriority::Critical)
        );
        assert!(
            priorities[3..5].iter().all(|p| *p == PiecePriority::Normal)
        );
        assert!(priorities[5..].iter().all(|p| *p == PiecePriority::Low));

        // Advance playback to the piece-5 equivalent
        harness
            .handle
            .update_playback_position(session.content_id, 5.0)
            .await
            .unwrap();

        let shifted = harness
            .transport
            .piece_priorities(session.content_id)
            .expect("recomputed priorities pushed");
        assert!(
            shifted[5..8].iter().all(|p| *p == PiecePriority::Critical),
            "pre-buffer window must move to {{5..8}}"
        );
        assert!(
            shifted[0..5].iter().all(|p| *p == PiecePriority::Low),
            "passed pieces must drop to baseline"
        );
    }

    #[tokio::test]
    async fn completed_download_is_verified_and_promoted_to_seeding() {
        let harness = spawn_default().await;
        let mut events = harness.handle.subscribe();

        let session = harness
            .handle
            .start_download(&locator(3), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;

        for piece in 0..10 {
            harness
                .transport
                .push_event(id, TransportEventKind::PieceCompleted { piece });
        }
        harness.transport.push_event(id, TransportEventKind::Done);

        let seen = collect_events(&mut events, Duration::from_millis(300)).await;
        assert!(
            seen.iter().any(|e| matches!(
                e,
                SwarmEvent::Complete { session, verified: true } if *session == id
            )),
            "expected a verified completion event"
        );

        let sessions = harness.handle.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Seeding);
    }

    #[tokio::test]
    async fn incomplete_session_reported_done_is_discarded() {
        let harness = spawn_default().await;
        let mut events = harness.handle.subscribe();

        let session = harness
            .handle
            .start_download(&locator(4), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;

        // Only half the pieces arrive before the engine claims completion
        for piece in 0..5 {
            harness
                .transport
                .push_event(id, TransportEventKind::PieceCompleted { piece });
        }
        harness.transport.push_event(id, TransportEventKind::Done);

        let seen = collect_events(&mut events, Duration::from_millis(300)).await;
        assert!(seen.iter().any(|e| matches!(
            e,
            SwarmEvent::Security { kind: SecurityKind::VerificationFailure, .. }
        )));
        assert!(seen.iter().any(|e| matches!(
            e,
            SwarmEvent::Error { kind: ErrorKind::Verification, .. }
        )));

        // Discarded, not retried
        assert!(harness.handle.list_sessions().await.unwrap().is_empty());
        assert!(harness.transport.removed_sessions().contains(&id));
    }

    #[tokio::test]
    async fn metered_network_pauses_then_resumes_seeding() {
        let mut config = SlipstreamConfig::for_testing();
        config.governor.policy.only_on_wifi = true;
        let harness = spawn_with(config, MockTransport::new()).await;
        let mut events = harness.handle.subscribe();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.mp4");
        tokio::fs::write(&path, b"content").await.unwrap();
        let session = harness
            .handle
            .start_seeding(&path, SessionMetadata::default())
            .await
            .unwrap();

        harness.platform.publish(ResourceProfile {
            metered: true,
            ..ResourceProfile::default()
        });
        settle().await;

        assert_eq!(
            harness.transport.paused_sessions(),
            vec![session.content_id]
        );
        let seen = collect_events(&mut events, Duration::from_millis(100)).await;
        let pauses = seen
            .iter()
            .filter(|e| matches!(
                e,
                SwarmEvent::BandwidthChange { action: BandwidthAction::PauseSeeding, .. }
            ))
            .count();
        assert_eq!(pauses, 1, "one pause event for the one seeding session");

        harness.platform.publish(ResourceProfile::default());
        settle().await;

        assert_eq!(
            harness.transport.resumed_sessions(),
            vec![session.content_id]
        );
        let seen = collect_events(&mut events, Duration::from_millis(100)).await;
        assert!(seen.iter().any(|e| matches!(
            e,
            SwarmEvent::BandwidthChange { action: BandwidthAction::ResumeSeeding, .. }
        )));
    }

    #[tokio::test]
    async fn battery_drop_pauses_every_seeding_session_exactly_once() {
        let harness = spawn_default().await;

        let dir = tempfile::tempdir().unwrap();
        for name in ["a.mp4", "b.mp4"] {
            let path = dir.path().join(name);
            tokio::fs::write(&path, name.as_bytes()).await.unwrap();
            harness
                .handle
                .start_seeding(&path, SessionMetadata::default())
                .await
                .unwrap();
        }

        let mut events = harness.handle.subscribe();

        // Healthy battery while discharging: nothing pauses
        harness.platform.publish(ResourceProfile {
            battery_level: 0.6,
            charging: false,
            ..ResourceProfile::default()
        });
        settle().await;
        assert!(harness.transport.paused_sessions().is_empty());

        // Battery drops under the threshold
        harness.platform.publish(ResourceProfile {
            battery_level: 0.2,
            charging: false,
            ..ResourceProfile::default()
        });
        settle().await;

        let seen = collect_events(&mut events, Duration::from_millis(150)).await;
        let pauses = seen
            .iter()
            .filter(|e| matches!(
                e,
                SwarmEvent::BandwidthChange { action: BandwidthAction::PauseSeeding, .. }
            ))
            .count();
        assert_eq!(pauses, 2, "exactly one pause event per seeding session");
        assert_eq!(harness.transport.paused_sessions().len(), 2);
    }

    #[tokio::test]
    async fn stop_emits_exactly_one_terminal_event() {
        let harness = spawn_default().await;
        let mut events = harness.handle.subscribe();

        let session = harness
            .handle
            .start_download(&locator(5), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;

        harness.handle.stop(id).await.unwrap();

        let seen = collect_events(&mut events, Duration::from_millis(200)).await;
        let stops = seen
            .iter()
            .filter(|e| matches!(e, SwarmEvent::Stopped { session } if *session == id))
            .count();
        assert_eq!(stops, 1);
        assert!(harness.transport.removed_sessions().contains(&id));

        // A second stop is a typed error, not a second event
        let result = harness.handle.stop(id).await;
        assert!(matches!(result, Err(SwarmError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn peer_connect_emits_event_and_encrypted_handshake() {
        let harness = spawn_default().await;
        let mut events = harness.handle.subscribe();

        let session = harness
            .handle
            .start_download(&locator(6), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;

        harness
            .transport
            .push_event(id, TransportEventKind::PeerConnected { peer: peer(1) });
        settle().await;

        let seen = collect_events(&mut events, Duration::from_millis(100)).await;
        assert!(
            seen.iter()
                .any(|e| matches!(e, SwarmEvent::Connect { session, .. } if *session == id))
        );

        let sent = harness.transport.sent_messages();
        assert_eq!(sent.len(), 1, "one handshake payload sent");
        assert!(!sent[0].2.is_empty());
    }

    #[tokio::test]
    async fn metadata_request_gets_encrypted_metadata_and_bitfield_reply() {
        let harness = spawn_default().await;

        let session = harness
            .handle
            .start_download(&locator(20), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;

        // Recover the identity key the coordinator persisted at startup to
        // act as the remote end of the secure channel
        let raw = harness
            .store
            .get(keys::IDENTITY)
            .await
            .unwrap()
            .expect("identity persisted at startup");
        let identity: Identity = serde_json::from_slice(&raw).unwrap();
        let remote = SecureChannel::new(Arc::new(ChaChaCrypto::new()), identity.key);

        harness
            .transport
            .push_event(id, TransportEventKind::PeerConnected { peer: peer(2) });
        settle().await;

        let request = remote
            .encrypt_message(&PeerMessage::RequestMetadata { content: id })
            .unwrap();
        harness.transport.push_event(
            id,
            TransportEventKind::PeerMessage {
                peer: peer(2),
                payload: request,
            },
        );
        settle().await;

        // Handshake, then metadata, then bitfield
        let sent = harness.transport.sent_messages();
        assert_eq!(sent.len(), 3, "sent {} messages", sent.len());

        let metadata = remote.decrypt_message(&sent[1].2).unwrap();
        assert!(matches!(
            metadata,
            PeerMessage::HaveMetadata { piece_count: 10, .. }
        ));
        let bitfield = remote.decrypt_message(&sent[2].2).unwrap();
        assert!(matches!(bitfield, PeerMessage::BitfieldUpdate { .. }));
    }

    #[tokio::test]
    async fn repeated_garbage_messages_isolate_and_blacklist_peer() {
        let mut config = SlipstreamConfig::for_testing();
        config.health.secure_failure_limit = 2;
        let harness = spawn_with(config, MockTransport::new()).await;
        let mut events = harness.handle.subscribe();

        let session = harness
            .handle
            .start_download(&locator(8), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;
        let bad_peer = peer(66);

        harness
            .transport
            .push_event(id, TransportEventKind::PeerConnected { peer: bad_peer });
        for _ in 0..2 {
            harness.transport.push_event(
                id,
                TransportEventKind::PeerMessage {
                    peer: bad_peer,
                    payload: bytes::Bytes::from_static(b"not even ciphertext"),
                },
            );
        }
        settle().await;

        let seen = collect_events(&mut events, Duration::from_millis(100)).await;
        assert!(seen.iter().any(|e| matches!(
            e,
            SwarmEvent::Security { kind: SecurityKind::DecryptionFailure, .. }
        )));
        assert!(seen.iter().any(|e| matches!(
            e,
            SwarmEvent::Security { kind: SecurityKind::PeerIsolated, .. }
        )));
        assert!(
            harness
                .transport
                .disconnected_peers()
                .contains(&(id, bad_peer))
        );

        // Reconnection attempts are refused before any handshake
        harness
            .transport
            .push_event(id, TransportEventKind::PeerConnected { peer: bad_peer });
        settle().await;

        let seen = collect_events(&mut events, Duration::from_millis(100)).await;
        assert!(seen.iter().any(|e| matches!(
            e,
            SwarmEvent::Security { kind: SecurityKind::BlacklistedPeer, .. }
        )));
    }

    #[tokio::test]
    async fn transport_failures_retry_reannounce_then_surface_fatal_error() {
        // for_testing: two retries, 10 ms backoff
        let harness = spawn_default().await;
        let mut events = harness.handle.subscribe();

        let session = harness
            .handle
            .start_download(&locator(9), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;

        harness.transport.push_event(
            id,
            TransportEventKind::Error {
                message: "tracker timeout".to_string(),
            },
        );
        settle().await;
        assert!(
            harness.transport.reannounce_count(id) >= 1,
            "first failure triggers a delayed re-announce"
        );

        for _ in 0..2 {
            harness.transport.push_event(
                id,
                TransportEventKind::Error {
                    message: "tracker timeout".to_string(),
                },
            );
            settle().await;
        }

        let seen = collect_events(&mut events, Duration::from_millis(150)).await;
        assert!(
            seen.iter().any(|e| matches!(
                e,
                SwarmEvent::Error { session: Some(s), kind: ErrorKind::Transport, .. } if *s == id
            )),
            "exhausted retries must surface a fatal session error"
        );
    }

    #[tokio::test]
    async fn rotation_drops_slowest_peers_of_oversized_swarm() {
        let harness = spawn_default().await;

        let session = harness
            .handle
            .start_download(&locator(10), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;

        // Eight peers, threshold is eight: no rotation yet
        for port in 1..=8 {
            harness
                .transport
                .push_event(id, TransportEventKind::PeerConnected { peer: peer(port) });
        }
        // Traffic for the first seven keeps them out of the bottom ranks
        for port in 1..=7 {
            harness.transport.push_event(
                id,
                TransportEventKind::Download {
                    peer: peer(port),
                    bytes: port as u64 * 100_000,
                },
            );
        }
        settle().await;
        assert!(harness.transport.disconnected_peers().is_empty());

        // A ninth silent peer tips the session over the threshold:
        // ceil(0.2 * 9) = 2 slowest peers rotate out
        harness
            .transport
            .push_event(id, TransportEventKind::PeerConnected { peer: peer(9) });
        tokio::time::sleep(Duration::from_millis(250)).await;

        let dropped = harness.transport.disconnected_peers();
        assert_eq!(dropped.len(), 2, "dropped {dropped:?}");
        assert!(dropped.contains(&(id, peer(8))));
        assert!(dropped.contains(&(id, peer(9))));
        assert!(harness.transport.reannounce_count(id) >= 1);
    }

    #[tokio::test]
    async fn progress_events_carry_speed_peers_and_health() {
        let harness = spawn_default().await;

        let session = harness
            .handle
            .start_download(&locator(11), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;

        harness
            .transport
            .push_event(id, TransportEventKind::PeerConnected { peer: peer(1) });
        harness.transport.push_event(
            id,
            TransportEventKind::Download {
                peer: peer(1),
                bytes: 500_000,
            },
        );
        for piece in 0..5 {
            harness
                .transport
                .push_event(id, TransportEventKind::PieceCompleted { piece });
        }
        settle().await;

        let mut events = harness.handle.subscribe();
        let seen = collect_events(&mut events, Duration::from_millis(200)).await;

        let progress = seen.iter().find_map(|e| match e {
            SwarmEvent::Progress {
                session,
                progress,
                speed_bps,
                peers,
                health_score,
                ..
            } if *session == id => Some((*progress, *speed_bps, *peers, *health_score)),
            _ => None,
        });
        let (progress, speed, peers, health) = progress.expect("progress event observed");
        assert!((progress - 0.5).abs() < f32::EPSILON);
        assert!(speed > 0);
        assert_eq!(peers, 1);
        assert!(health > 0.0);
    }

    #[tokio::test]
    async fn stats_are_flushed_to_the_store() {
        let harness = spawn_default().await;

        let session = harness
            .handle
            .start_download(&locator(12), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;

        harness
            .transport
            .push_event(id, TransportEventKind::PeerConnected { peer: peer(1) });
        harness.transport.push_event(
            id,
            TransportEventKind::Download {
                peer: peer(1),
                bytes: 123_456,
            },
        );

        // for_testing flushes every 200 ms
        tokio::time::sleep(Duration::from_millis(400)).await;

        let raw = harness.store.get(keys::STATS).await.unwrap();
        assert!(raw.is_some(), "stats record persisted");

        let stats = harness.handle.stats().await.unwrap();
        assert_eq!(stats.total_downloaded, 123_456);
        assert_eq!(stats.active_sessions, 1);
    }

    #[tokio::test]
    async fn invalid_policy_update_is_rejected_and_previous_stays() {
        let harness = spawn_default().await;

        let mut bad = crate::swarm::UserPolicy::default();
        bad.max_peers = 0;
        let result = harness.handle.update_policy(bad).await;
        assert!(matches!(
            result,
            Err(SwarmError::GovernorMisconfiguration { .. })
        ));

        // Coordinator still healthy afterwards
        assert!(harness.handle.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_accepting_commands() {
        let harness = spawn_default().await;

        harness.handle.shutdown().await.unwrap();
        settle().await;

        assert!(!harness.handle.is_running());
        let result = harness
            .handle
            .start_download(&locator(13), SessionMetadata::default())
            .await;
        assert!(matches!(result, Err(SwarmError::CoordinatorShutdown)));
    }

    #[tokio::test]
    async fn verified_content_is_not_reverified_after_restart() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(PlatformFeed::default());

        // First run: download completes and verifies
        let transport = MockTransport::new();
        let handle = spawn_swarm_coordinator(
            SlipstreamConfig::for_testing(),
            transport.clone(),
            platform.clone(),
            Arc::new(ChaChaCrypto::new()),
            store.clone(),
        )
        .await
        .unwrap();

        let session = handle
            .start_download(&locator(14), SessionMetadata::default())
            .await
            .unwrap();
        let id = session.content_id;
        for piece in 0..10 {
            transport.push_event(id, TransportEventKind::PieceCompleted { piece });
        }
        transport.push_event(id, TransportEventKind::Done);

        // Wait for the verdict to flush (200 ms flush interval in tests)
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(store.get(keys::VERIFICATION).await.unwrap().is_some());
        handle.shutdown().await.unwrap();

        // Second run against the same store: the cached verdict makes an
        // immediately-done session verify without any piece events
        let transport = MockTransport::new();
        let handle = spawn_swarm_coordinator(
            SlipstreamConfig::for_testing(),
            transport.clone(),
            platform,
            Arc::new(ChaChaCrypto::new()),
            store,
        )
        .await
        .unwrap();
        let mut events = handle.subscribe();

        let session = handle
            .start_download(&locator(14), SessionMetadata::default())
            .await
            .unwrap();
        transport.push_event(session.content_id, TransportEventKind::Done);

        let seen = collect_events(&mut events, Duration::from_millis(300)).await;
        assert!(
            seen.iter().any(|e| matches!(
                e,
                SwarmEvent::Complete { verified: true, .. }
            )),
            "cache hit verifies without re-checking pieces"
        );
    }

    #[tokio::test]
    async fn all_governance_tasks_are_registered() {
        // The consolidated scheduler owns one named task per periodic duty;
        // spawning must not panic and the coordinator must keep running
        // through several tick periods of every task.
        let harness = spawn_default().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(harness.handle.is_running());
    }
}
