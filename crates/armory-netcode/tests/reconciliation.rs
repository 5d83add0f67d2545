//! End-to-end prediction and reconciliation between a peer and the host

use armory_core::{
    Clock, FireModeRecord, GeometryQuery, HolderConfig, HolderId, MountPoint, Pose, RecordingEffects,
    ReloadKind, Tag, Timestamp, TraceHit, TraceProfile, Vec3, WeaponArchetype,
};
use armory_netcode::{
    recv_envelope, send_envelope, ActionKind, Address, AttachmentAction, CorrelationId,
    HostAuthority, HostMessage, MemoryTransport, NetcodeConfig, PeerEvent, PeerId, PeerMessage,
    PeerSession, RejectReason, ShotRequest,
};
use armory_script::Loader;

const PEER: PeerId = PeerId(1);
const GUN: HolderId = HolderId(100);

/// A target dummy standing 50 units down the x axis
struct Range;

impl GeometryQuery for Range {
    fn trace_line(&self, origin: Vec3, end: Vec3, _profile: &TraceProfile) -> Vec<TraceHit> {
        let dir = (end - origin).normalized();
        if end.x < 50.0 || dir.x <= 0.0 {
            return Vec::new();
        }
        let distance = (50.0 - origin.x) / dir.x;
        vec![TraceHit {
            target: Some(HolderId(500)),
            location: origin + dir * distance,
            distance,
        }]
    }

    fn resolve_aim_point(&self, _holder: HolderId, max_range: f64) -> Vec3 {
        Vec3::FORWARD * max_range
    }
}

struct Match {
    host: HostAuthority<RecordingEffects>,
    peer: PeerSession,
}

impl Match {
    fn new(host_config: HolderConfig, peer_config: HolderConfig) -> Self {
        Self::with_netcode(NetcodeConfig::default(), host_config, peer_config)
    }

    fn with_netcode(netcode: NetcodeConfig, host_config: HolderConfig, peer_config: HolderConfig) -> Self {
        let pose = Pose::new(Vec3::ZERO, Vec3::FORWARD);
        let mut host = HostAuthority::new(netcode.clone(), RecordingEffects::new());
        host.connect_peer(PEER);
        host.spawn_holder(GUN, host_config, PEER, None).unwrap();
        host.set_pose(GUN, pose).unwrap();

        let mut peer = PeerSession::new(PEER, netcode, 7);
        peer.add_holder(GUN, peer_config).unwrap();
        peer.set_pose(GUN, pose).unwrap();
        Self { host, peer }
    }

    fn symmetric(config: HolderConfig) -> Self {
        Self::new(config.clone(), config)
    }

    /// Peer requests to the host, then host answers to the peer
    fn exchange(&mut self, peer_now: f64, host_now: f64) {
        for envelope in self.peer.drain_outbox() {
            self.host
                .handle(envelope.peer, envelope.message, t(host_now), &Range);
        }
        self.deliver(peer_now);
    }

    /// Host outbox to the peer
    fn deliver(&mut self, peer_now: f64) {
        for outbound in self.host.drain_outbox() {
            if outbound.peer == PEER {
                self.peer.handle(outbound.message, t(peer_now));
            }
        }
    }

    fn peer_loaded(&self) -> (f64, f64) {
        let ledger = self.peer.holder(GUN).unwrap().ledger();
        (ledger.loaded(), ledger.reserve())
    }

    fn host_loaded(&self) -> (f64, f64) {
        let ledger = self.host.holder(GUN).unwrap().ledger();
        (ledger.loaded(), ledger.reserve())
    }
}

fn t(secs: f64) -> Timestamp {
    Timestamp::from_secs(secs)
}

fn rifle() -> HolderConfig {
    HolderConfig::for_archetype(WeaponArchetype::Rifle, "ammo.556")
}

fn raw_shot(key: u32, time: f64) -> PeerMessage {
    PeerMessage::Shot(ShotRequest {
        correlation_id: CorrelationId(key),
        holder: GUN,
        origin: Vec3::ZERO,
        direction: Vec3::FORWARD,
        spread_angle: 0.0,
        issued_client_time: t(time),
        random_seed: 1,
        trace_count: 1,
    })
}

#[test]
fn test_accepted_shot_settles_on_host_state() {
    let mut game = Match::symmetric(rifle());
    let key = game.peer.fire(GUN, t(0.0)).unwrap();
    assert_eq!(game.peer_loaded(), (29.0, 90.0));

    game.exchange(0.05, 0.03);
    assert_eq!(game.host_loaded(), (29.0, 90.0));
    assert_eq!(game.peer_loaded(), (29.0, 90.0));
    assert!(game.peer.predictions(GUN).unwrap().is_empty());

    let events = game.peer.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PeerEvent::Confirmed { key: k, kind: ActionKind::Fire, .. } if *k == key
    )));
}

#[test]
fn test_shot_hits_come_from_request_geometry() {
    let mut game = Match::symmetric(rifle());
    game.peer.fire(GUN, t(0.0)).unwrap();
    let envelope = game.peer.drain_outbox().remove(0);
    let response = game.host.handle(envelope.peer, envelope.message, t(0.0), &Range);
    let HostMessage::ShotResult(result) = response else {
        panic!("expected shot result");
    };
    assert!(result.accepted);
    assert_eq!(result.hits.len(), 1);
    assert_eq!(result.hits[0].target, Some(HolderId(500)));
}

#[test]
fn test_two_shots_with_one_round_left() {
    let mut game = Match::symmetric(rifle().with_ammo(1.0, 0.0));

    let first = game.host.handle(PEER, raw_shot(1, 0.0), t(0.0), &Range);
    let second = game.host.handle(PEER, raw_shot(2, 1.0), t(1.0), &Range);

    let accepted = [&first, &second]
        .iter()
        .filter(|r| r.reject_reason().is_none())
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(second.reject_reason(), Some(RejectReason::InsufficientResource));
    assert_eq!(game.host_loaded(), (0.0, 0.0));
}

#[test]
fn test_stale_request_is_rejected_and_rolled_back() {
    let mut game = Match::symmetric(rifle());
    game.peer.fire(GUN, t(0.0)).unwrap();

    // Host clock is 5 s ahead of the request; allowed skew is 2 s
    game.exchange(0.1, 5.0);
    assert_eq!(game.host_loaded(), (30.0, 90.0));
    assert_eq!(game.peer_loaded(), (30.0, 90.0));

    let events = game.peer.drain_events();
    assert!(matches!(events[0], PeerEvent::ShotPredicted { .. }));
    assert!(events.iter().any(|e| matches!(
        e,
        PeerEvent::RolledBack {
            reason: Some(RejectReason::StaleOrFutureTimestamp),
            ..
        }
    )));
}

#[test]
fn test_expired_prediction_then_late_result() {
    let mut game = Match::symmetric(rifle());
    let key = game.peer.fire(GUN, t(0.0)).unwrap();
    let requests = game.peer.drain_outbox();

    game.peer.update(t(2.5));
    assert_eq!(game.peer_loaded(), (30.0, 90.0));
    assert!(game
        .peer
        .drain_events()
        .iter()
        .any(|e| matches!(e, PeerEvent::Expired { key: k, .. } if *k == key)));

    // The host did accept it after all
    for envelope in requests {
        game.host.handle(envelope.peer, envelope.message, t(0.5), &Range);
    }
    game.deliver(3.0);
    assert_eq!(game.peer.predictions(GUN).unwrap().stats().late_results, 1);
    assert_eq!(game.peer_loaded(), (29.0, 90.0));
}

#[test]
fn test_full_reload_from_empty() {
    let mut game = Match::symmetric(rifle().with_ammo(0.0, 90.0));
    let mut clock = Clock::with_tick_interval(0.05);

    game.peer.reload(GUN, false, clock.now()).unwrap();
    clock.advance();
    game.exchange(clock.now().as_secs(), clock.now().as_secs());

    assert!(game.peer.holder(GUN).unwrap().ledger().is_reloading());
    let reload = game.host.holder(GUN).unwrap().ledger().reload().copied().unwrap();
    assert_eq!(reload.kind, ReloadKind::Full);

    // 3.5 s full reload started at 0.05
    while clock.now().as_secs() < 3.5 {
        game.host.update(clock.now());
        game.deliver(clock.now().as_secs());
        assert_eq!(game.peer_loaded(), (0.0, 90.0));
        clock.advance();
    }

    clock.advance_secs(0.1);
    game.host.update(clock.now());
    game.deliver(clock.now().as_secs());
    assert_eq!(game.host_loaded(), (30.0, 60.0));
    assert_eq!(game.peer_loaded(), (30.0, 60.0));
    assert!(!game.peer.holder(GUN).unwrap().ledger().is_reloading());
    assert!(game
        .peer
        .drain_events()
        .iter()
        .any(|e| matches!(e, PeerEvent::ReloadCompleted { transferred, .. } if *transferred == 30.0)));
}

#[test]
fn test_reload_not_needed_when_full() {
    let mut game = Match::symmetric(rifle());
    let err = game.peer.reload(GUN, false, t(0.0)).unwrap_err();
    assert!(matches!(err, armory_netcode::Error::Core(armory_core::Error::NotNeeded)));

    let response = game.host.handle(
        PEER,
        PeerMessage::ReloadStart(armory_netcode::ReloadStartRequest {
            correlation_id: CorrelationId(1),
            holder: GUN,
            force: false,
        }),
        t(0.0),
        &Range,
    );
    assert_eq!(response.reject_reason(), Some(RejectReason::NotNeeded));
}

#[test]
fn test_resent_request_is_replayed_not_reapplied() {
    let mut game = Match::symmetric(rifle());
    game.peer.fire(GUN, t(0.0)).unwrap();
    let original = game.peer.drain_outbox();
    game.peer.resend_unconfirmed();
    let resent = game.peer.drain_outbox();

    let a = game
        .host
        .handle(PEER, original[0].message.clone(), t(0.0), &Range);
    let b = game.host.handle(PEER, resent[0].message.clone(), t(0.2), &Range);
    assert_eq!(a, b);
    assert_eq!(game.host_loaded(), (29.0, 90.0));

    game.deliver(0.3);
    assert_eq!(game.peer_loaded(), (29.0, 90.0));
}

#[test]
fn test_forgotten_correlation_id_is_duplicate() {
    let netcode = NetcodeConfig::from_ron("(dedup: (capacity: 1))").unwrap();
    let mut game = Match::with_netcode(netcode, rifle(), rifle());

    game.host.handle(PEER, raw_shot(1, 0.0), t(0.0), &Range);
    game.host.handle(PEER, raw_shot(2, 1.0), t(1.0), &Range);
    let response = game.host.handle(PEER, raw_shot(1, 2.0), t(2.0), &Range);

    assert_eq!(response.reject_reason(), Some(RejectReason::DuplicateCorrelationId));
    assert_eq!(game.host_loaded(), (28.0, 90.0));
}

#[test]
fn test_readded_holder_is_still_accepted() {
    let mut game = Match::symmetric(rifle());
    for i in 0..3 {
        let now = i as f64;
        game.peer.fire(GUN, t(now)).unwrap();
        game.exchange(now, now);
    }
    assert_eq!(game.host_loaded(), (27.0, 90.0));

    game.peer.remove_holder(GUN);
    game.peer.add_holder(GUN, rifle()).unwrap();
    game.peer.set_pose(GUN, Pose::new(Vec3::ZERO, Vec3::FORWARD)).unwrap();
    game.peer.drain_events();

    let key = game.peer.fire(GUN, t(5.0)).unwrap();
    game.exchange(5.0, 5.0);
    assert_eq!(game.host_loaded(), (26.0, 90.0));
    assert_eq!(game.peer_loaded(), (26.0, 90.0));
    assert!(game.peer.drain_events().iter().any(|e| matches!(
        e,
        PeerEvent::Confirmed { key: k, .. } if *k == key
    )));
}

#[test]
fn test_request_for_despawned_holder_keeps_local_state() {
    let mut game = Match::symmetric(rifle().with_ammo(20.0, 40.0));
    game.host.despawn_holder(GUN);

    game.peer.fire(GUN, t(0.0)).unwrap();
    game.exchange(0.1, 0.05);

    let ledger = game.peer.holder(GUN).unwrap().ledger();
    assert_eq!(ledger.state().kind, Tag::new("ammo.556"));
    assert_eq!(game.peer_loaded(), (20.0, 40.0));
    assert!(game.peer.drain_events().iter().any(|e| matches!(
        e,
        PeerEvent::RolledBack {
            reason: Some(RejectReason::UnknownHolder),
            ..
        }
    )));
}

#[test]
fn test_unavailable_mode_switch_reverts() {
    let modes = vec![
        FireModeRecord::new("mode.single", "Single"),
        FireModeRecord::new("mode.auto", "Auto"),
    ];
    let peer_config = rifle().with_fire_modes(modes.clone());
    let mut host_modes = modes;
    host_modes[1].enabled = false;
    let host_config = rifle().with_fire_modes(host_modes);
    let mut game = Match::new(host_config, peer_config);

    game.peer.next_mode(GUN, t(0.0)).unwrap();
    assert_eq!(game.peer.holder(GUN).unwrap().modes().current_index(), 1);

    game.exchange(0.1, 0.05);
    assert_eq!(game.peer.holder(GUN).unwrap().modes().current_index(), 0);
    assert!(game.peer.drain_events().iter().any(|e| matches!(
        e,
        PeerEvent::RolledBack {
            kind: ActionKind::SwitchMode,
            reason: Some(RejectReason::ModeUnavailable),
            ..
        }
    )));
}

#[test]
fn test_attachment_without_host_mount_reverts() {
    let mut game = Match::symmetric(rifle());
    let local_surface = vec![MountPoint::new("hand_r")];

    game.peer
        .attach(
            GUN,
            AttachmentAction::Attach {
                active: true,
                mount: None,
            },
            t(0.0),
            &local_surface,
        )
        .unwrap();
    assert!(game.peer.holder(GUN).unwrap().attachment().is_attached());

    game.exchange(0.1, 0.05);
    assert!(!game.peer.holder(GUN).unwrap().attachment().is_attached());

    // Same request once the host body exposes the mount
    game.host
        .set_mount_surface(GUN, [MountPoint::new("spine_03"), MountPoint::new("hand_r")])
        .unwrap();
    game.peer
        .attach(
            GUN,
            AttachmentAction::Attach {
                active: true,
                mount: None,
            },
            t(1.0),
            &local_surface,
        )
        .unwrap();
    game.exchange(1.1, 1.05);
    let record = game.peer.holder(GUN).unwrap().attachment().record().cloned().unwrap();
    assert_eq!(record.mount, MountPoint::new("hand_r"));
    assert!(record.is_active);
}

#[test]
fn test_envelopes_over_memory_transport() {
    let mut game = Match::symmetric(rifle());
    let (peer_end, host_end) = MemoryTransport::pair(PEER, "host");
    let host_addr = Address::from("host");
    let peer_addr = Address::from(PEER);

    game.peer.fire(GUN, t(0.0)).unwrap();
    for envelope in game.peer.drain_outbox() {
        send_envelope(&peer_end, &envelope, &host_addr).unwrap();
    }

    let mut sequence = 0;
    while let Some((envelope, source)) = recv_envelope::<_, PeerMessage>(&host_end).unwrap() {
        assert_eq!(source, peer_addr);
        game.host
            .handle(envelope.peer, envelope.message, t(0.02), &Range);
        for outbound in game.host.drain_outbox() {
            sequence += 1;
            let reply = armory_netcode::Envelope::new(PeerId(0), sequence, outbound.message);
            send_envelope(&host_end, &reply, &peer_addr).unwrap();
        }
    }

    while let Some((envelope, _)) = recv_envelope::<_, HostMessage>(&peer_end).unwrap() {
        game.peer.handle(envelope.message, t(0.04));
    }
    assert_eq!(game.peer_loaded(), (29.0, 90.0));
    assert!(game.peer.predictions(GUN).unwrap().is_empty());
}

#[test]
fn test_reinitialize_from_persisted_definition() {
    let mut loader = Loader::new();
    loader
        .load_str(
            r#"
            (
                weapons: [
                    (
                        id: "weapon.mp5",
                        name: "MP5",
                        archetype: Smg,
                        ammo: "ammo.9mm",
                        reload_modifier: Some("effect.reloading"),
                        fire_modes: [
                            (tag: "mode.single", name: "Single"),
                            (tag: "mode.auto", name: "Auto", capability: Some("ability.auto")),
                        ],
                        default_mode: Some("mode.auto"),
                    ),
                ]
            )
            "#,
        )
        .unwrap();
    let config = loader
        .finish()
        .holder_config(&Tag::new("weapon.mp5"))
        .unwrap();
    assert_eq!(config.capacity, 25.0);

    let mut game = Match::symmetric(config.clone());
    assert_eq!(game.host.holder(GUN).unwrap().modes().current_index(), 1);
    assert!(game.host.effects().has_capability(&Tag::new("ability.auto")));

    game.peer.fire(GUN, t(0.0)).unwrap();
    game.exchange(0.05, 0.0);
    game.peer.reload(GUN, false, t(1.0)).unwrap();
    game.exchange(1.05, 1.0);
    assert!(game.host.effects().has_modifier(&Tag::new("effect.reloading")));

    // Disconnect mid-reload: ammunition and mode survive, the reload does not
    let persisted = game.host.despawn_holder(GUN).unwrap();
    assert_eq!(persisted.resource.loaded, 24.0);
    assert_eq!(persisted.current_index, 1);
    assert_eq!(game.host.effects().capability_count(), 0);
    assert_eq!(game.host.effects().modifier_count(), 0);

    game.host
        .spawn_holder(GUN, config, PEER, Some(&persisted))
        .unwrap();
    game.peer.reset();
    let holder = game.host.holder(GUN).unwrap();
    assert_eq!(holder.ledger().loaded(), 24.0);
    assert!(!holder.ledger().is_reloading());
    assert_eq!(holder.modes().current_index(), 1);
    assert!(game.host.effects().has_capability(&Tag::new("ability.auto")));
    assert_eq!(game.host.pending_tasks(), 0);
}
