//! Holder composition
//!
//! A [`Holder`] bundles the per-weapon state components by value: the
//! ammunition ledger, the fire-mode selector, the attachment state and the
//! attribute cache. It also owns the effect handles the weapon holds in the
//! external effect engine (the current mode's capability and the reload
//! modifier) and keeps them aligned with the component state.

use crate::attachment::{AttachmentEvent, AttachmentState};
use crate::attributes::{names, AttributeCache, AttributeLayer};
use crate::config::HolderConfig;
use crate::effect::{CapabilityHandle, EffectEngine, EffectHandles, ModifierHandle};
use crate::error::Result;
use crate::fire_mode::{ModeEvent, ModeSelector};
use crate::geometry::Pose;
use crate::identity::{HolderId, ModeId};
use crate::ledger::{LedgerEvent, ReloadKind, ResourceLedger, ResourceState};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The state that survives a holder re-initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedHolderState {
    pub resource: ResourceState,
    pub current_index: usize,
}

/// Any notification produced by a holder's components
#[derive(Debug, Clone, PartialEq)]
pub enum HolderEvent {
    Ledger(LedgerEvent),
    Mode(ModeEvent),
    Attachment(AttachmentEvent),
}

/// One weapon instance and its state
#[derive(Debug)]
pub struct Holder {
    id: HolderId,
    config: HolderConfig,
    ledger: ResourceLedger,
    modes: ModeSelector,
    attachment: AttachmentState,
    attributes: Arc<AttributeCache>,
    pose: Pose,
    effects: EffectHandles,
    granted_mode: Option<(ModeId, CapabilityHandle)>,
    reload_modifier: Option<ModifierHandle>,
}

impl Holder {
    /// Build a holder from its config
    pub fn new(id: HolderId, config: HolderConfig) -> Result<Self> {
        config.validate()?;

        let ledger = ResourceLedger::new(
            ResourceState::new(config.initial_loaded, config.initial_reserve, config.kind.clone()),
            config.capacity,
            config.reserve_cap,
            config.reload,
        )?;
        let modes = ModeSelector::new(config.fire_modes.clone(), config.default_mode.as_ref())?;
        let attachment = AttachmentState::new(config.mounts.clone());

        let attributes = Arc::new(AttributeCache::new());
        attributes.set_many(
            AttributeLayer::Defaults,
            [
                (names::FIRE_RATE, config.fire_rate_rpm),
                (names::SPREAD, config.spread_angle),
                (names::RANGE, config.max_range),
            ],
        );
        attributes.set_many(
            AttributeLayer::Item,
            config.attributes.iter().map(|(k, v)| (k.clone(), *v)),
        );

        tracing::debug!(%id, capacity = config.capacity, "holder created");
        Ok(Self {
            id,
            config,
            ledger,
            modes,
            attachment,
            attributes,
            pose: Pose::default(),
            effects: EffectHandles::new(),
            granted_mode: None,
            reload_modifier: None,
        })
    }

    /// Build a holder and apply persisted state
    pub fn from_persisted(id: HolderId, config: HolderConfig, persisted: &PersistedHolderState) -> Result<Self> {
        let mut holder = Self::new(id, config)?;
        holder.restore(persisted)?;
        holder.drain_events();
        Ok(holder)
    }

    /// Capture the state that must survive re-initialization
    pub fn persist(&self) -> PersistedHolderState {
        PersistedHolderState {
            resource: self.ledger.state().clone(),
            current_index: self.modes.current_index(),
        }
    }

    /// Apply persisted state
    pub fn restore(&mut self, persisted: &PersistedHolderState) -> Result<()> {
        self.ledger.restore(persisted.resource.clone())?;
        self.modes.restore_index(persisted.current_index)
    }

    /// Reset ephemeral state (reconnect), keeping ammunition and mode
    pub fn reinitialize(&mut self, engine: &mut dyn EffectEngine) {
        self.ledger.cancel_reload();
        self.teardown(engine);
        self.sync_effects(engine);
    }

    /// Start a reload, applying the reload modifier
    pub fn start_reload(&mut self, force: bool, now: Timestamp, engine: &mut dyn EffectEngine) -> Result<ReloadKind> {
        let kind = self.ledger.start_reload(force, now)?;
        self.sync_effects(engine);
        Ok(kind)
    }

    /// Finish the running reload
    pub fn complete_reload(&mut self, engine: &mut dyn EffectEngine) -> Result<f64> {
        let transferred = self.ledger.complete_reload()?;
        self.sync_effects(engine);
        Ok(transferred)
    }

    /// Abort the running reload
    pub fn cancel_reload(&mut self, engine: &mut dyn EffectEngine) -> bool {
        let cancelled = self.ledger.cancel_reload();
        self.sync_effects(engine);
        cancelled
    }

    /// Align effect-engine handles with the current state
    ///
    /// Grants the current fire mode's capability (revoking the previous one)
    /// and holds the reload modifier exactly while a reload runs.
    pub fn sync_effects(&mut self, engine: &mut dyn EffectEngine) {
        let wanted = self
            .modes
            .current()
            .and_then(|m| m.capability_ref.clone().map(|c| (m.tag.clone(), c)));
        let granted_tag = self.granted_mode.as_ref().map(|(tag, _)| tag);
        if granted_tag != wanted.as_ref().map(|(tag, _)| tag) {
            if let Some((_, handle)) = self.granted_mode.take() {
                self.effects.revoke(engine, handle);
            }
            if let Some((tag, capability)) = wanted {
                let handle = self.effects.grant(engine, &capability);
                self.granted_mode = Some((tag, handle));
            }
        }

        match (self.ledger.reload(), self.reload_modifier) {
            (Some(reload), None) => {
                if let Some(modifier) = self.config.reload_modifier.clone() {
                    let duration = self.ledger.reload_duration(reload.kind);
                    self.reload_modifier = Some(self.effects.apply(engine, &modifier, duration));
                }
            }
            (None, Some(handle)) => {
                self.effects.remove(engine, handle);
                self.reload_modifier = None;
            }
            _ => {}
        }
    }

    /// Release every effect handle
    pub fn teardown(&mut self, engine: &mut dyn EffectEngine) {
        self.effects.release_all(engine);
        self.granted_mode = None;
        self.reload_modifier = None;
    }

    /// Effective fire rate (attribute layers first, config as fallback)
    pub fn fire_rate_rpm(&self) -> f64 {
        self.attributes.get_or(names::FIRE_RATE, self.config.fire_rate_rpm)
    }

    /// Effective spread half-angle in degrees
    pub fn spread_angle(&self) -> f64 {
        self.attributes.get_or(names::SPREAD, self.config.spread_angle)
    }

    /// Effective trace range
    pub fn max_range(&self) -> f64 {
        self.attributes.get_or(names::RANGE, self.config.max_range)
    }

    /// Minimum seconds between shots
    pub fn shot_interval(&self) -> f64 {
        let rpm = self.fire_rate_rpm();
        if rpm > 0.0 {
            60.0 / rpm
        } else {
            f64::INFINITY
        }
    }

    /// Take all pending notifications from every component
    pub fn drain_events(&mut self) -> Vec<HolderEvent> {
        let mut events: Vec<HolderEvent> = self
            .ledger
            .drain_events()
            .into_iter()
            .map(HolderEvent::Ledger)
            .collect();
        events.extend(self.modes.drain_events().into_iter().map(HolderEvent::Mode));
        events.extend(
            self.attachment
                .drain_events()
                .into_iter()
                .map(HolderEvent::Attachment),
        );
        events
    }

    pub fn id(&self) -> HolderId {
        self.id
    }

    pub fn config(&self) -> &HolderConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut ResourceLedger {
        &mut self.ledger
    }

    pub fn modes(&self) -> &ModeSelector {
        &self.modes
    }

    pub fn modes_mut(&mut self) -> &mut ModeSelector {
        &mut self.modes
    }

    pub fn attachment(&self) -> &AttachmentState {
        &self.attachment
    }

    pub fn attachment_mut(&mut self) -> &mut AttachmentState {
        &mut self.attachment
    }

    /// Shared attribute cache (readable from other threads)
    pub fn attributes(&self) -> &Arc<AttributeCache> {
        &self.attributes
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }
}
