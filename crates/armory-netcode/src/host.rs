//! Host authority
//!
//! The host owns the canonical [`Holder`] of every weapon and is the only
//! place authoritative state changes. All mutation goes through
//! [`HostAuthority::handle`] and [`HostAuthority::update`], both taking
//! `&mut self`, so requests for one holder are strictly serialized.
//!
//! ```text
//! PeerMessage ─▶ owner check ─▶ dedup window ─▶ validate ─▶ mutate ─▶ result
//!                                    │                                  │
//!                                    └── replay cached result           ├─▶ requester
//!                                                                       └─▶ snapshots to all peers
//! ```
//!
//! Reload completion is not driven by timers: starting a reload schedules a
//! task that [`HostAuthority::update`] picks up once its deadline passes.

use crate::config::NetcodeConfig;
use crate::dedup::{CorrelationWindow, DedupDecision};
use crate::error::{Error, Result};
use crate::messages::{
    AttachmentConfirm, AttachmentRequest, FireModeRequest, FireModeResult,
    FireModeSnapshot, HostMessage, PeerId, PeerMessage, RejectReason, ReloadCompleteNotice,
    ReloadStartRequest, ReloadStartResult, ResourceSnapshot, ShotRequest, ShotResult,
};
use crate::validator::{resolve_hits, ActionValidator, GroundTruth};
use armory_core::{
    EffectEngine, GeometryQuery, Holder, HolderConfig, HolderEvent, HolderId, MountPoint,
    PersistedHolderState, Pose, Scheduler, TaskId, Timestamp,
};
use indexmap::{IndexMap, IndexSet};

/// A message queued for one peer
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub peer: PeerId,
    pub message: HostMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostTask {
    CompleteReload(HolderId),
}

#[derive(Debug)]
struct HostedHolder {
    holder: Holder,
    owner: PeerId,
    locally_authoritative: bool,
    /// Mount points exposed by the holder's body
    mounts: IndexSet<MountPoint>,
    reload_task: Option<TaskId>,
}

/// What changed on a holder since the last drain
#[derive(Debug, Default, Clone, Copy)]
struct Changes {
    resource: bool,
    mode: bool,
}

impl Changes {
    fn collect(events: Vec<HolderEvent>) -> Self {
        let mut changes = Changes::default();
        for event in events {
            match event {
                HolderEvent::Ledger(_) => changes.resource = true,
                HolderEvent::Mode(_) => changes.mode = true,
                HolderEvent::Attachment(_) => {}
            }
        }
        changes
    }
}

/// Authoritative state for every holder, plus the validator and dedup window
pub struct HostAuthority<E: EffectEngine> {
    config: NetcodeConfig,
    holders: IndexMap<HolderId, HostedHolder>,
    validator: ActionValidator,
    dedup: CorrelationWindow<HostMessage>,
    scheduler: Scheduler<HostTask>,
    peers: IndexSet<PeerId>,
    outbox: Vec<Outbound>,
    effects: E,
}

impl<E: EffectEngine> HostAuthority<E> {
    pub fn new(config: NetcodeConfig, effects: E) -> Self {
        Self {
            validator: ActionValidator::new(config.validator.clone()),
            dedup: CorrelationWindow::new(config.dedup.clone()),
            config,
            holders: IndexMap::new(),
            scheduler: Scheduler::new(),
            peers: IndexSet::new(),
            outbox: Vec::new(),
            effects,
        }
    }

    // ========================================================================
    // Peers and holders
    // ========================================================================

    /// Register a peer so it receives snapshot pushes
    pub fn connect_peer(&mut self, peer: PeerId) {
        if self.peers.insert(peer) {
            tracing::info!(%peer, "peer connected");
        }
    }

    /// Drop a peer and re-initialize the holders it owns
    ///
    /// Ammunition and fire mode survive; running reloads and effect handles
    /// do not.
    pub fn disconnect_peer(&mut self, peer: PeerId) {
        if !self.peers.shift_remove(&peer) {
            return;
        }
        self.dedup.forget_peer(peer);
        for hosted in self.holders.values_mut().filter(|h| h.owner == peer) {
            if let Some(task) = hosted.reload_task.take() {
                self.scheduler.cancel(task);
            }
            hosted.holder.reinitialize(&mut self.effects);
            hosted.holder.drain_events();
        }
        tracing::info!(%peer, "peer disconnected");
    }

    /// Create a holder owned by `owner`, optionally from persisted state
    ///
    /// An existing holder with the same id is torn down and replaced.
    pub fn spawn_holder(
        &mut self,
        id: HolderId,
        config: HolderConfig,
        owner: PeerId,
        persisted: Option<&PersistedHolderState>,
    ) -> Result<()> {
        let mut holder = match persisted {
            Some(state) => Holder::from_persisted(id, config, state)?,
            None => Holder::new(id, config)?,
        };
        self.despawn_holder(id);
        holder.sync_effects(&mut self.effects);
        holder.drain_events();
        self.holders.insert(
            id,
            HostedHolder {
                holder,
                owner,
                locally_authoritative: false,
                mounts: IndexSet::new(),
                reload_task: None,
            },
        );
        tracing::info!(%id, %owner, "holder spawned");
        Ok(())
    }

    /// Remove a holder, returning the state worth persisting
    pub fn despawn_holder(&mut self, id: HolderId) -> Option<PersistedHolderState> {
        let mut hosted = self.holders.shift_remove(&id)?;
        if let Some(task) = hosted.reload_task.take() {
            self.scheduler.cancel(task);
        }
        hosted.holder.teardown(&mut self.effects);
        self.validator.forget(id);
        self.dedup.forget_holder(id);
        tracing::info!(%id, "holder despawned");
        Some(hosted.holder.persist())
    }

    pub fn set_pose(&mut self, id: HolderId, pose: Pose) -> Result<()> {
        self.hosted_mut(id)?.holder.set_pose(pose);
        Ok(())
    }

    /// Replace the mount points the holder's body exposes
    pub fn set_mount_surface(&mut self, id: HolderId, mounts: impl IntoIterator<Item = MountPoint>) -> Result<()> {
        self.hosted_mut(id)?.mounts = mounts.into_iter().collect();
        Ok(())
    }

    /// Mark the owner as the holder's local authority (listen-server player)
    pub fn set_locally_authoritative(&mut self, id: HolderId, local: bool) -> Result<()> {
        self.hosted_mut(id)?.locally_authoritative = local;
        Ok(())
    }

    // ========================================================================
    // Request handling
    // ========================================================================

    /// Process one peer request and return its result
    ///
    /// The result is also queued for the requester; resulting snapshots are
    /// queued for every connected peer.
    pub fn handle(
        &mut self,
        peer: PeerId,
        message: PeerMessage,
        now: Timestamp,
        geometry: &dyn GeometryQuery,
    ) -> HostMessage {
        let key = message.correlation_id();
        let id = message.holder();

        let Some(owner) = self.holders.get(&id).map(|h| h.owner) else {
            tracing::debug!(%peer, holder = %id, %key, "request for unknown holder");
            return self.respond(peer, rejection(&message, RejectReason::UnknownHolder, None));
        };
        if owner != peer {
            tracing::debug!(%peer, holder = %id, %key, "request from non-owner");
            let response = rejection(&message, RejectReason::NotOwner, self.holders.get(&id).map(|h| &h.holder));
            return self.respond(peer, response);
        }

        match self.dedup.check(peer, id, key, now) {
            DedupDecision::Replay(cached) => {
                tracing::debug!(%peer, holder = %id, %key, "replaying cached result");
                return self.respond(peer, cached);
            }
            DedupDecision::Duplicate => {
                tracing::debug!(%peer, holder = %id, %key, "stale correlation id");
                let response = rejection(
                    &message,
                    RejectReason::DuplicateCorrelationId,
                    self.holders.get(&id).map(|h| &h.holder),
                );
                return self.respond(peer, response);
            }
            DedupDecision::Fresh => {}
        }

        let response = match message {
            PeerMessage::Shot(request) => self.handle_shot(request, now, geometry),
            PeerMessage::ReloadStart(request) => self.handle_reload(request, now),
            PeerMessage::FireMode(request) => self.handle_fire_mode(request),
            PeerMessage::Attachment(request) => self.handle_attachment(request),
        };

        self.dedup.record(peer, id, key, response.clone(), now);
        let response = self.respond(peer, response);
        self.publish_changes(id);
        response
    }

    fn handle_shot(&mut self, request: ShotRequest, now: Timestamp, geometry: &dyn GeometryQuery) -> HostMessage {
        let Some(hosted) = self.holders.get_mut(&request.holder) else {
            return rejection(&PeerMessage::Shot(request), RejectReason::UnknownHolder, None);
        };

        let truth = GroundTruth {
            server_now: now,
            pose: hosted.holder.pose(),
            locally_authoritative: hosted.locally_authoritative,
            ledger: hosted.holder.ledger(),
            fire_rate_rpm: hosted.holder.fire_rate_rpm(),
            spread_angle: hosted.holder.spread_angle(),
        };
        let mut reason = self.validator.validate_shot(&request, &truth).reason();

        let mut hits = Vec::new();
        if reason.is_none() {
            match hosted.holder.ledger_mut().consume(1.0) {
                Ok(()) => {
                    self.validator.record_accepted(request.holder, now);
                    let range = hosted.holder.max_range();
                    hits = resolve_hits(&request, geometry, range, &hosted.holder.config().trace_profile);
                    tracing::trace!(holder = %request.holder, key = %request.correlation_id, hits = hits.len(), "shot accepted");
                }
                Err(err) => reason = Some(RejectReason::from(&err)),
            }
        }

        HostMessage::ShotResult(ShotResult {
            correlation_id: request.correlation_id,
            holder: request.holder,
            accepted: reason.is_none(),
            reason,
            hits,
            resource: Some(ResourceSnapshot::capture(request.holder, hosted.holder.ledger())),
        })
    }

    fn handle_reload(&mut self, request: ReloadStartRequest, now: Timestamp) -> HostMessage {
        let Some(hosted) = self.holders.get_mut(&request.holder) else {
            return rejection(&PeerMessage::ReloadStart(request), RejectReason::UnknownHolder, None);
        };

        let (reason, kind, duration) = match hosted.holder.start_reload(request.force, now, &mut self.effects) {
            Ok(kind) => {
                let duration = hosted.holder.ledger().reload_duration(kind);
                let task = self
                    .scheduler
                    .schedule(now + duration, HostTask::CompleteReload(request.holder));
                hosted.reload_task = Some(task);
                (None, Some(kind), duration)
            }
            Err(err) => {
                let reason = RejectReason::from(&err);
                tracing::debug!(holder = %request.holder, key = %request.correlation_id, %reason, "reload rejected");
                (Some(reason), None, 0.0)
            }
        };

        HostMessage::ReloadStartResult(ReloadStartResult {
            correlation_id: request.correlation_id,
            holder: request.holder,
            accepted: reason.is_none(),
            reason,
            kind,
            duration,
            resource: Some(ResourceSnapshot::capture(request.holder, hosted.holder.ledger())),
        })
    }

    fn handle_fire_mode(&mut self, request: FireModeRequest) -> HostMessage {
        let Some(hosted) = self.holders.get_mut(&request.holder) else {
            return rejection(&PeerMessage::FireMode(request), RejectReason::UnknownHolder, None);
        };

        let reason = if hosted.holder.ledger().is_reloading() {
            Some(RejectReason::AlreadyInProgress)
        } else if hosted.holder.modes_mut().set_by_index(request.index) {
            hosted.holder.sync_effects(&mut self.effects);
            None
        } else {
            Some(RejectReason::ModeUnavailable)
        };
        if let Some(reason) = reason {
            tracing::debug!(holder = %request.holder, index = request.index, %reason, "fire mode rejected");
        }

        HostMessage::FireModeResult(FireModeResult {
            correlation_id: request.correlation_id,
            holder: request.holder,
            accepted: reason.is_none(),
            reason,
            mode: Some(FireModeSnapshot {
                holder: request.holder,
                current_index: hosted.holder.modes().current_index(),
            }),
        })
    }

    fn handle_attachment(&mut self, request: AttachmentRequest) -> HostMessage {
        let Some(hosted) = self.holders.get_mut(&request.holder) else {
            return rejection(&PeerMessage::Attachment(request), RejectReason::UnknownHolder, None);
        };
        let HostedHolder { holder, mounts, .. } = hosted;
        let outcome = request
            .action
            .apply(holder.attachment_mut(), request.holder, &*mounts);
        let reason = outcome.err().map(|err| RejectReason::from(&err));
        if let Some(reason) = reason {
            tracing::debug!(holder = %request.holder, action = ?request.action, %reason, "attachment rejected");
        }

        HostMessage::AttachmentConfirm(AttachmentConfirm {
            correlation_id: request.correlation_id,
            holder: request.holder,
            accepted: reason.is_none(),
            reason,
            actual: holder.attachment().record().cloned(),
        })
    }

    // ========================================================================
    // Host-driven changes
    // ========================================================================

    /// Run due scheduled tasks (reload completions)
    pub fn update(&mut self, now: Timestamp) {
        for task in self.scheduler.poll(now) {
            match task {
                HostTask::CompleteReload(id) => self.finish_reload(id),
            }
        }
    }

    fn finish_reload(&mut self, id: HolderId) {
        let Some(hosted) = self.holders.get_mut(&id) else {
            return;
        };
        hosted.reload_task = None;
        match hosted.holder.complete_reload(&mut self.effects) {
            Ok(transferred) => {
                let notice = HostMessage::ReloadComplete(ReloadCompleteNotice {
                    transferred,
                    resource: ResourceSnapshot::capture(id, hosted.holder.ledger()),
                });
                let changes = Changes::collect(hosted.holder.drain_events());
                self.broadcast(notice);
                if changes.mode {
                    self.broadcast_mode(id);
                }
            }
            Err(err) => {
                tracing::warn!(%id, %err, "scheduled reload completion found no reload");
            }
        }
    }

    /// Abort a holder's reload (e.g. weapon swap); returns false if none ran
    pub fn cancel_reload(&mut self, id: HolderId) -> Result<bool> {
        let hosted = self.holders.get_mut(&id).ok_or(Error::UnknownHolder(id))?;
        let task = hosted.reload_task.take();
        let cancelled = hosted.holder.cancel_reload(&mut self.effects);
        if let Some(task) = task {
            self.scheduler.cancel(task);
        }
        self.publish_changes(id);
        Ok(cancelled)
    }

    /// Add rounds to a holder's reserve (pickups); returns the amount added
    pub fn replenish(&mut self, id: HolderId, amount: f64) -> Result<f64> {
        let added = self.hosted_mut(id)?.holder.ledger_mut().replenish(amount);
        self.publish_changes(id);
        Ok(added)
    }

    /// Take every queued outbound message
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn holder(&self, id: HolderId) -> Option<&Holder> {
        self.holders.get(&id).map(|h| &h.holder)
    }

    pub fn owner(&self, id: HolderId) -> Option<PeerId> {
        self.holders.get(&id).map(|h| h.owner)
    }

    pub fn holder_count(&self) -> usize {
        self.holders.len()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.iter()
    }

    pub fn effects(&self) -> &E {
        &self.effects
    }

    pub fn config(&self) -> &NetcodeConfig {
        &self.config
    }

    /// Number of pending scheduled tasks
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    fn hosted_mut(&mut self, id: HolderId) -> Result<&mut HostedHolder> {
        self.holders.get_mut(&id).ok_or(Error::UnknownHolder(id))
    }

    fn respond(&mut self, peer: PeerId, message: HostMessage) -> HostMessage {
        self.outbox.push(Outbound {
            peer,
            message: message.clone(),
        });
        message
    }

    fn broadcast(&mut self, message: HostMessage) {
        for peer in &self.peers {
            self.outbox.push(Outbound {
                peer: *peer,
                message: message.clone(),
            });
        }
    }

    fn broadcast_mode(&mut self, id: HolderId) {
        if let Some(hosted) = self.holders.get(&id) {
            let snapshot = FireModeSnapshot {
                holder: id,
                current_index: hosted.holder.modes().current_index(),
            };
            self.broadcast(HostMessage::FireModeSnapshot(snapshot));
        }
    }

    /// Push snapshots for whatever changed on a holder
    fn publish_changes(&mut self, id: HolderId) {
        let Some(hosted) = self.holders.get_mut(&id) else {
            return;
        };
        let changes = Changes::collect(hosted.holder.drain_events());
        let resource = ResourceSnapshot::capture(id, hosted.holder.ledger());
        if changes.resource {
            self.broadcast(HostMessage::ResourceSnapshot(resource));
        }
        if changes.mode {
            self.broadcast_mode(id);
        }
    }
}

/// Build the rejection response matching a request
///
/// Without a holder there is no authoritative state to report, so the
/// snapshot fields are left empty.
fn rejection(message: &PeerMessage, reason: RejectReason, holder: Option<&Holder>) -> HostMessage {
    let id = message.holder();
    let resource = holder.map(|h| ResourceSnapshot::capture(id, h.ledger()));

    match message {
        PeerMessage::Shot(r) => HostMessage::ShotResult(ShotResult {
            correlation_id: r.correlation_id,
            holder: id,
            accepted: false,
            reason: Some(reason),
            hits: Vec::new(),
            resource,
        }),
        PeerMessage::ReloadStart(r) => HostMessage::ReloadStartResult(ReloadStartResult {
            correlation_id: r.correlation_id,
            holder: id,
            accepted: false,
            reason: Some(reason),
            kind: None,
            duration: 0.0,
            resource,
        }),
        PeerMessage::FireMode(r) => HostMessage::FireModeResult(FireModeResult {
            correlation_id: r.correlation_id,
            holder: id,
            accepted: false,
            reason: Some(reason),
            mode: holder.map(|h| FireModeSnapshot {
                holder: id,
                current_index: h.modes().current_index(),
            }),
        }),
        PeerMessage::Attachment(r) => HostMessage::AttachmentConfirm(AttachmentConfirm {
            correlation_id: r.correlation_id,
            holder: id,
            accepted: false,
            reason: Some(reason),
            actual: holder.and_then(|h| h.attachment().record().cloned()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{AttachmentAction, CorrelationId};
    use armory_core::attributes::names;
    use armory_core::{
        FireModeRecord, Offset, RecordingEffects, ReloadKind, TraceHit, TraceProfile, Vec3, WeaponArchetype,
    };

    const OWNER: PeerId = PeerId(1);
    const OTHER: PeerId = PeerId(2);
    const H: HolderId = HolderId(7);

    struct Empty;

    impl GeometryQuery for Empty {
        fn trace_line(&self, _origin: Vec3, _end: Vec3, _profile: &TraceProfile) -> Vec<TraceHit> {
            Vec::new()
        }

        fn resolve_aim_point(&self, _holder: HolderId, max_range: f64) -> Vec3 {
            Vec3::FORWARD * max_range
        }
    }

    fn host(config: HolderConfig) -> HostAuthority<RecordingEffects> {
        let mut host = HostAuthority::new(NetcodeConfig::default(), RecordingEffects::new());
        host.connect_peer(OWNER);
        host.connect_peer(OTHER);
        host.spawn_holder(H, config, OWNER, None).unwrap();
        host.set_pose(H, Pose::new(Vec3::ZERO, Vec3::FORWARD)).unwrap();
        host
    }

    fn rifle() -> HolderConfig {
        HolderConfig::for_archetype(WeaponArchetype::Rifle, "ammo.556")
    }

    fn shot(key: u32, time: f64) -> PeerMessage {
        PeerMessage::Shot(ShotRequest {
            correlation_id: CorrelationId(key),
            holder: H,
            origin: Vec3::ZERO,
            direction: Vec3::FORWARD,
            spread_angle: 0.0,
            issued_client_time: Timestamp::from_secs(time),
            random_seed: key as u64,
            trace_count: 1,
        })
    }

    fn t(secs: f64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_shot_accepted_and_broadcast() {
        let mut host = host(rifle());
        let response = host.handle(OWNER, shot(1, 0.0), t(0.0), &Empty);
        let HostMessage::ShotResult(result) = &response else {
            panic!("expected shot result");
        };
        assert!(result.accepted);
        assert_eq!(result.resource.as_ref().unwrap().loaded(), 29.0);

        let outbox = host.drain_outbox();
        assert_eq!(outbox[0].peer, OWNER);
        assert_eq!(outbox[0].message, response);
        let snapshots = outbox
            .iter()
            .filter(|o| matches!(o.message, HostMessage::ResourceSnapshot(_)))
            .count();
        assert_eq!(snapshots, 2);
    }

    #[test]
    fn test_ownership_and_unknown_holder() {
        let mut host = host(rifle());
        let response = host.handle(OTHER, shot(1, 0.0), t(0.0), &Empty);
        assert_eq!(response.reject_reason(), Some(RejectReason::NotOwner));

        let mut message = shot(1, 0.0);
        if let PeerMessage::Shot(r) = &mut message {
            r.holder = HolderId(99);
        }
        let response = host.handle(OWNER, message, t(0.0), &Empty);
        assert_eq!(response.reject_reason(), Some(RejectReason::UnknownHolder));
        let HostMessage::ShotResult(result) = &response else {
            panic!("expected shot result");
        };
        assert_eq!(result.holder, HolderId(99));
        assert!(result.resource.is_none());
        assert_eq!(host.holder(H).unwrap().ledger().loaded(), 30.0);
    }

    /// A wall 100 units down the x axis
    struct Wall;

    impl GeometryQuery for Wall {
        fn trace_line(&self, origin: Vec3, end: Vec3, _profile: &TraceProfile) -> Vec<TraceHit> {
            if end.x < 100.0 {
                return Vec::new();
            }
            vec![TraceHit {
                target: None,
                location: Vec3::new(100.0, origin.y, origin.z),
                distance: 100.0 - origin.x,
            }]
        }

        fn resolve_aim_point(&self, _holder: HolderId, max_range: f64) -> Vec3 {
            Vec3::FORWARD * max_range
        }
    }

    #[test]
    fn test_item_range_bounds_hit_resolution() {
        let mut long = host(rifle());
        let response = long.handle(OWNER, shot(1, 0.0), t(0.0), &Wall);
        let HostMessage::ShotResult(result) = response else {
            panic!("expected shot result");
        };
        assert_eq!(result.hits.len(), 1);

        let mut config = rifle();
        config.attributes.insert(names::RANGE.to_string(), 50.0);
        let mut short = host(config);
        let response = short.handle(OWNER, shot(1, 0.0), t(0.0), &Wall);
        let HostMessage::ShotResult(result) = response else {
            panic!("expected shot result");
        };
        assert!(result.accepted);
        assert!(result.hits.is_empty());
    }

    #[test]
    fn test_shot_tighter_than_weapon_spread_is_refused() {
        let mut config = rifle();
        config.spread_angle = 2.0;
        let mut host = host(config);
        let response = host.handle(OWNER, shot(1, 0.0), t(0.0), &Empty);
        assert_eq!(response.reject_reason(), Some(RejectReason::Malformed));
        assert_eq!(host.holder(H).unwrap().ledger().loaded(), 30.0);
    }

    #[test]
    fn test_reload_completes_on_update() {
        let mut host = host(rifle().with_ammo(0.0, 90.0));
        let response = host.handle(
            OWNER,
            PeerMessage::ReloadStart(ReloadStartRequest {
                correlation_id: CorrelationId(1),
                holder: H,
                force: false,
            }),
            t(0.0),
            &Empty,
        );
        let HostMessage::ReloadStartResult(result) = response else {
            panic!("expected reload result");
        };
        assert!(result.accepted);
        assert_eq!(result.kind, Some(ReloadKind::Full));
        assert_eq!(result.duration, 3.5);
        host.drain_outbox();

        host.update(t(3.0));
        assert!(host.holder(H).unwrap().ledger().is_reloading());

        host.update(t(3.5));
        let ledger = host.holder(H).unwrap().ledger();
        assert_eq!((ledger.loaded(), ledger.reserve()), (30.0, 60.0));
        assert!(host
            .drain_outbox()
            .iter()
            .any(|o| matches!(&o.message, HostMessage::ReloadComplete(n) if n.transferred == 30.0)));
        assert_eq!(host.pending_tasks(), 0);
    }

    #[test]
    fn test_cancel_reload_removes_task() {
        let mut config = rifle().with_ammo(10.0, 90.0);
        config.reload_modifier = Some("effect.reload".into());
        let mut host = host(config);
        host.handle(
            OWNER,
            PeerMessage::ReloadStart(ReloadStartRequest {
                correlation_id: CorrelationId(1),
                holder: H,
                force: false,
            }),
            t(0.0),
            &Empty,
        );
        assert!(host.effects().has_modifier(&"effect.reload".into()));

        assert!(host.cancel_reload(H).unwrap());
        assert!(!host.cancel_reload(H).unwrap());
        assert_eq!(host.pending_tasks(), 0);
        assert!(!host.effects().has_modifier(&"effect.reload".into()));

        host.update(t(10.0));
        assert_eq!(host.holder(H).unwrap().ledger().loaded(), 10.0);
        assert!(matches!(host.cancel_reload(HolderId(99)), Err(Error::UnknownHolder(_))));
    }

    #[test]
    fn test_fire_mode_switch_and_reload_block() {
        let config = rifle().with_ammo(10.0, 90.0).with_fire_modes(vec![
            FireModeRecord::new("mode.single", "Single"),
            FireModeRecord::new("mode.auto", "Auto").with_capability("ability.auto"),
        ]);
        let mut host = host(config);

        let switch = |key| {
            PeerMessage::FireMode(FireModeRequest {
                correlation_id: CorrelationId(key),
                holder: H,
                index: 1,
            })
        };
        let response = host.handle(OWNER, switch(1), t(0.0), &Empty);
        assert!(response.reject_reason().is_none());
        assert!(host.effects().has_capability(&"ability.auto".into()));
        assert!(host
            .drain_outbox()
            .iter()
            .any(|o| matches!(&o.message, HostMessage::FireModeSnapshot(s) if s.current_index == 1)));

        host.handle(
            OWNER,
            PeerMessage::ReloadStart(ReloadStartRequest {
                correlation_id: CorrelationId(2),
                holder: H,
                force: false,
            }),
            t(0.0),
            &Empty,
        );
        let mut back = switch(3);
        if let PeerMessage::FireMode(r) = &mut back {
            r.index = 0;
        }
        let response = host.handle(OWNER, back, t(0.1), &Empty);
        assert_eq!(response.reject_reason(), Some(RejectReason::AlreadyInProgress));
        assert_eq!(host.holder(H).unwrap().modes().current_index(), 1);
    }

    #[test]
    fn test_attachment_requests() {
        let mut host = host(rifle());
        let attach = |key, active| {
            PeerMessage::Attachment(AttachmentRequest {
                correlation_id: CorrelationId(key),
                holder: H,
                action: AttachmentAction::Attach { active, mount: None },
                offset: Offset::IDENTITY,
            })
        };

        let response = host.handle(OWNER, attach(1, true), t(0.0), &Empty);
        assert_eq!(response.reject_reason(), Some(RejectReason::NoValidMount));

        host.set_mount_surface(H, [MountPoint::new("hand_r"), MountPoint::new("spine_03")])
            .unwrap();
        let response = host.handle(OWNER, attach(2, true), t(0.0), &Empty);
        let HostMessage::AttachmentConfirm(confirm) = response else {
            panic!("expected attachment confirm");
        };
        assert!(confirm.accepted);
        assert_eq!(confirm.actual.map(|r| r.is_active), Some(true));

        let detach = PeerMessage::Attachment(AttachmentRequest {
            correlation_id: CorrelationId(3),
            holder: H,
            action: AttachmentAction::Detach {
                keep_world_placement: false,
            },
            offset: Offset::IDENTITY,
        });
        assert!(host.handle(OWNER, detach, t(0.0), &Empty).reject_reason().is_none());
        assert!(!host.holder(H).unwrap().attachment().is_attached());
    }

    #[test]
    fn test_dedup_replays_without_mutation() {
        let mut host = host(rifle());
        let first = host.handle(OWNER, shot(1, 0.0), t(0.0), &Empty);
        let again = host.handle(OWNER, shot(1, 0.0), t(0.5), &Empty);
        assert_eq!(first, again);
        assert_eq!(host.holder(H).unwrap().ledger().loaded(), 29.0);
    }

    #[test]
    fn test_despawn_and_respawn_from_persisted() {
        let config = rifle().with_fire_modes(vec![
            FireModeRecord::new("mode.single", "Single"),
            FireModeRecord::new("mode.burst", "Burst"),
        ]);
        let mut host = host(config.clone());
        host.handle(OWNER, shot(1, 0.0), t(0.0), &Empty);
        host.handle(
            OWNER,
            PeerMessage::FireMode(FireModeRequest {
                correlation_id: CorrelationId(2),
                holder: H,
                index: 1,
            }),
            t(0.0),
            &Empty,
        );

        let persisted = host.despawn_holder(H).unwrap();
        assert_eq!(persisted.resource.loaded, 29.0);
        assert_eq!(persisted.current_index, 1);
        assert!(host.holder(H).is_none());

        host.spawn_holder(H, config, OWNER, Some(&persisted)).unwrap();
        let holder = host.holder(H).unwrap();
        assert_eq!(holder.ledger().loaded(), 29.0);
        assert_eq!(holder.modes().current_index(), 1);
        assert!(!holder.ledger().is_reloading());
    }

    #[test]
    fn test_disconnect_cancels_owned_reload() {
        let mut host = host(rifle().with_ammo(5.0, 90.0));
        host.handle(
            OWNER,
            PeerMessage::ReloadStart(ReloadStartRequest {
                correlation_id: CorrelationId(1),
                holder: H,
                force: false,
            }),
            t(0.0),
            &Empty,
        );
        host.disconnect_peer(OWNER);
        assert_eq!(host.pending_tasks(), 0);
        let ledger = host.holder(H).unwrap().ledger();
        assert!(!ledger.is_reloading());
        assert_eq!(ledger.loaded(), 5.0);
    }
}
