//! Peer session
//!
//! The peer mirrors the holders it cares about and predicts its own
//! actions: each action is applied locally through the holder's
//! [`PredictionLedger`], a request carrying the prediction key is queued for
//! the host, and the host's answer later confirms or rolls it back.
//!
//! Cosmetic feedback (muzzle flash, tracers) is emitted as
//! [`PeerEvent::ShotPredicted`] at fire time and is never undone; only the
//! ledger state is.

use crate::config::NetcodeConfig;
use crate::error::{Error, Result};
use crate::messages::{
    AttachmentAction, AttachmentRequest, CorrelationId, Envelope, FireModeRequest, HostMessage,
    PeerId, PeerMessage, RejectReason, ReloadStartRequest, ResourceSnapshot, ShotRequest,
};
use crate::prediction::{ActionKind, Confirmation, PredictionLedger, PredictionTarget, SlotValue};
use crate::validator::shot_directions;
use armory_core::{
    GameRng, Holder, HolderConfig, HolderId, MountSurface, Offset, Pose, ResourceState, Timestamp,
    Vec3,
};
use indexmap::IndexMap;

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A shot was predicted; play its cosmetic effects
    ShotPredicted {
        holder: HolderId,
        key: CorrelationId,
        origin: Vec3,
        directions: Vec<Vec3>,
    },
    Confirmed {
        holder: HolderId,
        key: CorrelationId,
        kind: ActionKind,
    },
    RolledBack {
        holder: HolderId,
        key: CorrelationId,
        kind: ActionKind,
        reason: Option<RejectReason>,
    },
    /// No answer within the timeout; treated as a rejection
    Expired {
        holder: HolderId,
        key: CorrelationId,
        kind: ActionKind,
    },
    ReloadCompleted {
        holder: HolderId,
        transferred: f64,
    },
    /// A host snapshot overwrote local state
    Corrected { holder: HolderId },
}

#[derive(Debug)]
struct Tracked {
    holder: Holder,
    predictions: PredictionLedger,
    /// Requests of live predictions, for resending
    requests: IndexMap<CorrelationId, PeerMessage>,
}

impl Tracked {
    fn prune_requests(&mut self) {
        let predictions = &self.predictions;
        self.requests.retain(|key, _| predictions.get(*key).is_some());
    }
}

/// Client-side state of one connected peer
#[derive(Debug)]
pub struct PeerSession {
    peer: PeerId,
    config: NetcodeConfig,
    holders: IndexMap<HolderId, Tracked>,
    /// Last prediction key per holder, kept across remove/add
    last_keys: IndexMap<HolderId, CorrelationId>,
    outbox: Vec<PeerMessage>,
    events: Vec<PeerEvent>,
    rng: GameRng,
    sequence: u64,
}

impl PeerSession {
    /// Create a session; `seed` drives shot spread seeds
    pub fn new(peer: PeerId, config: NetcodeConfig, seed: u64) -> Self {
        Self {
            peer,
            config,
            holders: IndexMap::new(),
            last_keys: IndexMap::new(),
            outbox: Vec::new(),
            events: Vec::new(),
            rng: GameRng::new(seed),
            sequence: 0,
        }
    }

    /// Start mirroring a holder
    ///
    /// Prediction keys continue from the holder's previous ledger, if any.
    pub fn add_holder(&mut self, id: HolderId, config: HolderConfig) -> Result<()> {
        let mut holder = Holder::new(id, config)?;
        holder.drain_events();
        let last_key = match self.holders.get(&id) {
            Some(tracked) => tracked.predictions.last_key(),
            None => self.last_keys.get(&id).copied().unwrap_or(CorrelationId(0)),
        };
        self.holders.insert(
            id,
            Tracked {
                holder,
                predictions: PredictionLedger::resume(self.config.prediction.clone(), last_key),
                requests: IndexMap::new(),
            },
        );
        Ok(())
    }

    pub fn remove_holder(&mut self, id: HolderId) -> Option<Holder> {
        let tracked = self.holders.shift_remove(&id)?;
        self.last_keys.insert(id, tracked.predictions.last_key());
        Some(tracked.holder)
    }

    pub fn set_pose(&mut self, id: HolderId, pose: Pose) -> Result<()> {
        self.tracked_mut(id)?.holder.set_pose(pose);
        Ok(())
    }

    // ========================================================================
    // Predicted actions
    // ========================================================================

    /// Fire one shot
    ///
    /// Fails locally, without contacting the host, when no mode is usable,
    /// a reload is running or the magazine is empty.
    pub fn fire(&mut self, id: HolderId, now: Timestamp) -> Result<CorrelationId> {
        let seed = self.rng.next_u64();
        let tracked = self.tracked_mut(id)?;
        let holder = &tracked.holder;

        if holder.modes().current().is_none() {
            return Err(armory_core::Error::ModeUnavailable.into());
        }
        if holder.ledger().is_reloading() {
            return Err(armory_core::Error::AlreadyInProgress.into());
        }
        let loaded = holder.ledger().loaded();
        if loaded < 1.0 {
            return Err(armory_core::Error::InsufficientResource {
                requested: 1.0,
                loaded,
            }
            .into());
        }

        let state = holder.ledger().state();
        let speculative = SlotValue::Resource {
            state: ResourceState::new(loaded - 1.0, state.reserve, state.kind.clone()),
            reload: None,
        };
        let pose = holder.pose();
        let spread = holder.spread_angle();
        let trace_count = holder.config().traces_per_shot;

        let key = tracked
            .predictions
            .predict(&mut tracked.holder, ActionKind::Fire, speculative, now)?;
        let request = ShotRequest {
            correlation_id: key,
            holder: id,
            origin: pose.position,
            direction: pose.forward,
            spread_angle: spread,
            issued_client_time: now,
            random_seed: seed,
            trace_count,
        };
        let directions = shot_directions(&request);
        tracing::trace!(holder = %id, %key, "shot predicted");

        self.events.push(PeerEvent::ShotPredicted {
            holder: id,
            key,
            origin: request.origin,
            directions,
        });
        self.submit(id, PeerMessage::Shot(request));
        Ok(key)
    }

    /// Start a reload
    pub fn reload(&mut self, id: HolderId, force: bool, now: Timestamp) -> Result<CorrelationId> {
        let tracked = self.tracked_mut(id)?;
        let mut probe = tracked.holder.ledger().clone();
        probe.start_reload(force, now)?;
        let speculative = SlotValue::Resource {
            state: probe.state().clone(),
            reload: probe.reload().copied(),
        };

        let key = tracked
            .predictions
            .predict(&mut tracked.holder, ActionKind::Reload, speculative, now)?;
        self.submit(
            id,
            PeerMessage::ReloadStart(ReloadStartRequest {
                correlation_id: key,
                holder: id,
                force,
            }),
        );
        Ok(key)
    }

    /// Cycle to the next available fire mode
    pub fn next_mode(&mut self, id: HolderId, now: Timestamp) -> Result<CorrelationId> {
        let index = {
            let holder = &self.tracked_mut(id)?.holder;
            let mut probe = holder.modes().clone();
            if !probe.next() {
                return Err(armory_core::Error::ModeUnavailable.into());
            }
            probe.current_index()
        };
        self.switch_mode(id, index, now)
    }

    /// Select a fire mode by index
    pub fn select_mode(&mut self, id: HolderId, index: usize, now: Timestamp) -> Result<CorrelationId> {
        let holder = &self.tracked_mut(id)?.holder;
        let mut probe = holder.modes().clone();
        if !probe.set_by_index(index) {
            return Err(armory_core::Error::ModeUnavailable.into());
        }
        self.switch_mode(id, index, now)
    }

    fn switch_mode(&mut self, id: HolderId, index: usize, now: Timestamp) -> Result<CorrelationId> {
        let tracked = self.tracked_mut(id)?;
        if tracked.holder.ledger().is_reloading() {
            return Err(armory_core::Error::AlreadyInProgress.into());
        }
        let key = tracked.predictions.predict(
            &mut tracked.holder,
            ActionKind::SwitchMode,
            SlotValue::FireMode(index),
            now,
        )?;
        self.submit(
            id,
            PeerMessage::FireMode(FireModeRequest {
                correlation_id: key,
                holder: id,
                index,
            }),
        );
        Ok(key)
    }

    /// Attach, detach or stow/unstow, resolved against the local mount surface
    pub fn attach(
        &mut self,
        id: HolderId,
        action: AttachmentAction,
        now: Timestamp,
        surface: &(impl MountSurface + ?Sized),
    ) -> Result<CorrelationId> {
        let tracked = self.tracked_mut(id)?;
        let mut probe = tracked.holder.attachment().clone();
        action.apply(&mut probe, id, surface)?;
        let record = probe.record().cloned();
        let offset = record.as_ref().map_or(Offset::IDENTITY, |r| r.offset);

        let key = tracked.predictions.predict(
            &mut tracked.holder,
            ActionKind::Attach,
            SlotValue::Attachment(record),
            now,
        )?;
        self.submit(
            id,
            PeerMessage::Attachment(AttachmentRequest {
                correlation_id: key,
                holder: id,
                action,
                offset,
            }),
        );
        Ok(key)
    }

    // ========================================================================
    // Host traffic
    // ========================================================================

    /// Apply one message from the host
    pub fn handle(&mut self, message: HostMessage, now: Timestamp) {
        match message {
            HostMessage::ShotResult(r) => {
                let value = r.resource.map(|snapshot| resource_value(&snapshot, now));
                self.resolve(r.holder, r.correlation_id, r.accepted, r.reason, value);
            }
            HostMessage::ReloadStartResult(r) => {
                let value = r.resource.map(|snapshot| resource_value(&snapshot, now));
                self.resolve(r.holder, r.correlation_id, r.accepted, r.reason, value);
            }
            HostMessage::FireModeResult(r) => {
                let value = r.mode.map(|mode| SlotValue::FireMode(mode.current_index));
                self.resolve(r.holder, r.correlation_id, r.accepted, r.reason, value);
            }
            HostMessage::AttachmentConfirm(r) => {
                let value = Some(SlotValue::Attachment(r.actual));
                self.resolve(r.holder, r.correlation_id, r.accepted, r.reason, value);
            }
            HostMessage::ReloadComplete(notice) => {
                let holder = notice.resource.holder;
                self.rebase(holder, resource_value(&notice.resource, now));
                self.events.push(PeerEvent::ReloadCompleted {
                    holder,
                    transferred: notice.transferred,
                });
            }
            HostMessage::ResourceSnapshot(snapshot) => {
                self.rebase(snapshot.holder, resource_value(&snapshot, now));
            }
            HostMessage::FireModeSnapshot(snapshot) => {
                self.rebase(snapshot.holder, SlotValue::FireMode(snapshot.current_index));
            }
        }
    }

    fn resolve(
        &mut self,
        id: HolderId,
        key: CorrelationId,
        accepted: bool,
        reason: Option<RejectReason>,
        value: Option<SlotValue>,
    ) {
        let Some(tracked) = self.holders.get_mut(&id) else {
            tracing::debug!(holder = %id, %key, "result for untracked holder");
            return;
        };
        let kind = tracked.predictions.get(key).map(|e| e.kind);
        // The host has no such holder: fall back to the baseline
        let value = value.filter(|_| reason != Some(RejectReason::UnknownHolder));

        match tracked.predictions.confirm(&mut tracked.holder, key, accepted, value) {
            Ok(outcome) => {
                tracked.requests.shift_remove(&key);
                let Some(kind) = kind else { return };
                let event = match outcome {
                    Confirmation::Accepted => PeerEvent::Confirmed { holder: id, key, kind },
                    Confirmation::RolledBack => PeerEvent::RolledBack {
                        holder: id,
                        key,
                        kind,
                        reason,
                    },
                };
                self.events.push(event);
            }
            // Late results carry nothing the snapshot pushes will not also bring
            Err(Error::PredictionExpired(_)) => {}
            Err(Error::UnknownCorrelationId(_)) => {
                tracing::debug!(holder = %id, %key, "result for unknown prediction");
            }
            Err(err) => {
                tracing::warn!(holder = %id, %key, %err, "failed to apply host result");
            }
        }
    }

    fn rebase(&mut self, id: HolderId, value: SlotValue) {
        let Some(tracked) = self.holders.get_mut(&id) else {
            return;
        };
        let slot = value.slot();
        let before = tracked.holder.capture(slot);
        let corrected = match tracked.predictions.rebase(&mut tracked.holder, value) {
            Ok(applied) => applied && tracked.holder.capture(slot) != before,
            Err(err) => {
                tracing::warn!(holder = %id, %err, "failed to apply host snapshot");
                false
            }
        };
        tracked.holder.drain_events();
        if corrected {
            self.events.push(PeerEvent::Corrected { holder: id });
        }
    }

    /// Roll back predictions the host never answered
    pub fn update(&mut self, now: Timestamp) {
        for (id, tracked) in self.holders.iter_mut() {
            let expired = tracked.predictions.expire_stale(&mut tracked.holder, now);
            tracked.holder.drain_events();
            if expired.is_empty() {
                continue;
            }
            tracked.prune_requests();
            self.events.extend(expired.into_iter().map(|e| PeerEvent::Expired {
                holder: *id,
                key: e.key,
                kind: e.kind,
            }));
        }
    }

    /// Queue every unanswered request again (at-least-once delivery)
    pub fn resend_unconfirmed(&mut self) -> usize {
        let mut count = 0;
        for tracked in self.holders.values_mut() {
            tracked.prune_requests();
            count += tracked.requests.len();
            self.outbox.extend(tracked.requests.values().cloned());
        }
        count
    }

    /// Forget every live prediction (re-initialization); local state stays
    pub fn reset(&mut self) {
        for tracked in self.holders.values_mut() {
            tracked.predictions.reset();
            tracked.requests.clear();
        }
        self.outbox.clear();
    }

    /// Take queued requests, framed for the wire
    pub fn drain_outbox(&mut self) -> Vec<Envelope<PeerMessage>> {
        let peer = self.peer;
        std::mem::take(&mut self.outbox)
            .into_iter()
            .map(|message| {
                self.sequence += 1;
                Envelope::new(peer, self.sequence, message)
            })
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<PeerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn holder(&self, id: HolderId) -> Option<&Holder> {
        self.holders.get(&id).map(|t| &t.holder)
    }

    pub fn predictions(&self, id: HolderId) -> Option<&PredictionLedger> {
        self.holders.get(&id).map(|t| &t.predictions)
    }

    fn tracked_mut(&mut self, id: HolderId) -> Result<&mut Tracked> {
        self.holders.get_mut(&id).ok_or(Error::UnknownHolder(id))
    }

    fn submit(&mut self, id: HolderId, message: PeerMessage) {
        if let Some(tracked) = self.holders.get_mut(&id) {
            tracked.prune_requests();
            tracked
                .requests
                .insert(message.correlation_id(), message.clone());
        }
        self.outbox.push(message);
    }
}

fn resource_value(snapshot: &ResourceSnapshot, received_at: Timestamp) -> SlotValue {
    SlotValue::Resource {
        state: snapshot.state.clone(),
        reload: snapshot.reload_state(received_at),
    }
}
