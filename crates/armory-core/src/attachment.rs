//! Attachment of an item to its holder
//!
//! An item is either unattached or attached at exactly one mount point, in
//! the active (in use) or stowed (carried) configuration. Mount points are
//! resolved from a priority list filtered by what the holder's
//! [`MountSurface`] actually provides:
//!
//! 1. the caller's hint
//! 2. the profile's configured mount for the requested state
//! 3. the equipment slot's default mount for that state
//! 4. the category priority list
//!
//! Offsets always come from the [`MountProfile`], never from the caller.

use crate::error::{Error, Result};
use crate::geometry::Offset;
use crate::identity::{HolderId, MountPoint};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

const WEAPON_PRIORITY: &[&str] = &["GripPoint", "weapon_r", "RightHandSocket", "hand_r", "WeaponSocket"];
const ARMOR_PRIORITY: &[&str] = &["spine_03", "spine_02", "pelvis", "root"];
const ACCESSORY_PRIORITY: &[&str] = &["head", "neck_01", "spine_03", "pelvis"];

/// Item category, selecting the fallback mount list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MountCategory {
    #[default]
    Weapon,
    Armor,
    Accessory,
}

impl MountCategory {
    /// Fallback mounts, best first
    pub fn priority_list(&self) -> &'static [&'static str] {
        match self {
            MountCategory::Weapon => WEAPON_PRIORITY,
            MountCategory::Armor => ARMOR_PRIORITY,
            MountCategory::Accessory => ACCESSORY_PRIORITY,
        }
    }
}

/// Equipment slot an item occupies on its holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipSlot {
    PrimaryWeapon,
    SecondaryWeapon,
    Sidearm,
    MeleeWeapon,
    Grenade,
    Helmet,
    Chest,
    Backpack,
}

impl EquipSlot {
    /// Default mount for the slot in the given state
    pub fn default_mount(&self, active: bool) -> Option<&'static str> {
        use EquipSlot::*;
        match (self, active) {
            (PrimaryWeapon | SecondaryWeapon | Sidearm | MeleeWeapon, true) => Some("GripPoint"),
            (PrimaryWeapon, false) => Some("WeaponBackSocket"),
            (SecondaryWeapon, false) => Some("WeaponBackSocket_Secondary"),
            (Sidearm, false) => Some("HolsterSocket"),
            (MeleeWeapon, false) => Some("MeleeSocket"),
            (Grenade, false) => Some("GrenadeSocket"),
            (Grenade, true) => None,
            (Helmet, _) => Some("head"),
            (Chest, _) => Some("spine_03"),
            (Backpack, _) => Some("spine_02"),
        }
    }
}

/// Where and how an item mounts on its holder
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MountProfile {
    pub category: MountCategory,
    pub slot: Option<EquipSlot>,
    /// Preferred mount while in use
    pub active_mount: Option<MountPoint>,
    /// Preferred mount while stowed
    pub stowed_mount: Option<MountPoint>,
    pub active_offset: Offset,
    pub stowed_offset: Offset,
}

impl MountProfile {
    /// Ordered, de-duplicated mount candidates for a state
    pub fn candidates(&self, active: bool, hint: Option<&MountPoint>) -> Vec<MountPoint> {
        let configured = if active {
            self.active_mount.as_ref()
        } else {
            self.stowed_mount.as_ref()
        };

        let mut out: IndexSet<MountPoint> = IndexSet::new();
        out.extend(hint.cloned());
        out.extend(configured.cloned());
        out.extend(
            self.slot
                .and_then(|slot| slot.default_mount(active))
                .map(MountPoint::new),
        );
        out.extend(self.category.priority_list().iter().map(|m| MountPoint::new(*m)));
        out.into_iter().collect()
    }

    /// Offset applied for a state
    pub fn offset_for(&self, active: bool) -> Offset {
        if active {
            self.active_offset
        } else {
            self.stowed_offset
        }
    }
}

/// Mount points a holder exposes
pub trait MountSurface {
    fn has_mount(&self, mount: &MountPoint) -> bool;
}

impl MountSurface for IndexSet<MountPoint> {
    fn has_mount(&self, mount: &MountPoint) -> bool {
        self.contains(mount)
    }
}

impl MountSurface for [MountPoint] {
    fn has_mount(&self, mount: &MountPoint) -> bool {
        self.contains(mount)
    }
}

impl MountSurface for Vec<MountPoint> {
    fn has_mount(&self, mount: &MountPoint) -> bool {
        self.as_slice().has_mount(mount)
    }
}

/// Current attachment of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub holder: HolderId,
    pub mount: MountPoint,
    pub is_active: bool,
    pub offset: Offset,
}

/// Notifications produced by attachment changes
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentEvent {
    Attached {
        holder: HolderId,
        mount: MountPoint,
        active: bool,
    },
    Detached {
        holder: HolderId,
        keep_world_placement: bool,
    },
    StateChanged {
        mount: MountPoint,
        active: bool,
        animated: bool,
    },
}

/// Attachment state for one item
#[derive(Debug, Clone, Default)]
pub struct AttachmentState {
    profile: MountProfile,
    record: Option<AttachmentRecord>,
    events: Vec<AttachmentEvent>,
}

impl AttachmentState {
    pub fn new(profile: MountProfile) -> Self {
        Self {
            profile,
            record: None,
            events: Vec::new(),
        }
    }

    /// Resolve a mount without changing anything
    pub fn resolve(
        &self,
        active: bool,
        hint: Option<&MountPoint>,
        surface: &(impl MountSurface + ?Sized),
    ) -> Result<MountPoint> {
        self.profile
            .candidates(active, hint)
            .into_iter()
            .find(|m| surface.has_mount(m))
            .ok_or(Error::NoValidMount)
    }

    /// Attach to `holder`, replacing any previous attachment
    ///
    /// Nothing changes when no candidate mount exists on the surface.
    pub fn attach(
        &mut self,
        holder: HolderId,
        active: bool,
        hint: Option<&MountPoint>,
        surface: &(impl MountSurface + ?Sized),
    ) -> Result<MountPoint> {
        let mount = match self.resolve(active, hint, surface) {
            Ok(mount) => mount,
            Err(err) => {
                tracing::debug!(%holder, active, "no valid mount point");
                return Err(err);
            }
        };

        self.record = Some(AttachmentRecord {
            holder,
            mount: mount.clone(),
            is_active: active,
            offset: self.profile.offset_for(active),
        });
        tracing::info!(%holder, %mount, active, "attached");
        self.events.push(AttachmentEvent::Attached {
            holder,
            mount: mount.clone(),
            active,
        });
        Ok(mount)
    }

    /// Detach from the holder
    ///
    /// Returns the removed record, or `None` when nothing was attached.
    pub fn detach(&mut self, keep_world_placement: bool) -> Option<AttachmentRecord> {
        let record = self.record.take()?;
        tracing::info!(holder = %record.holder, keep_world_placement, "detached");
        self.events.push(AttachmentEvent::Detached {
            holder: record.holder,
            keep_world_placement,
        });
        Some(record)
    }

    /// Move between the active and stowed configurations
    pub fn set_active(
        &mut self,
        active: bool,
        animated: bool,
        surface: &(impl MountSurface + ?Sized),
    ) -> Result<MountPoint> {
        let current = self.record.as_ref().ok_or(Error::NotAttached)?;
        if current.is_active == active {
            return Ok(current.mount.clone());
        }

        let mount = self.resolve(active, None, surface)?;
        let offset = self.profile.offset_for(active);
        if let Some(record) = self.record.as_mut() {
            record.mount = mount.clone();
            record.is_active = active;
            record.offset = offset;
        }
        tracing::info!(%mount, active, "attachment state changed");
        self.events.push(AttachmentEvent::StateChanged {
            mount: mount.clone(),
            active,
            animated,
        });
        Ok(mount)
    }

    /// Overwrite with the host's ruling
    pub fn apply_confirmed(&mut self, record: Option<AttachmentRecord>) {
        if self.record == record {
            return;
        }
        match (&self.record, &record) {
            (_, Some(r)) => self.events.push(AttachmentEvent::Attached {
                holder: r.holder,
                mount: r.mount.clone(),
                active: r.is_active,
            }),
            (Some(old), None) => self.events.push(AttachmentEvent::Detached {
                holder: old.holder,
                keep_world_placement: false,
            }),
            (None, None) => {}
        }
        self.record = record;
    }

    pub fn record(&self) -> Option<&AttachmentRecord> {
        self.record.as_ref()
    }

    pub fn profile(&self) -> &MountProfile {
        &self.profile
    }

    pub fn is_attached(&self) -> bool {
        self.record.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.record.as_ref().is_some_and(|r| r.is_active)
    }

    pub fn drain_events(&mut self) -> Vec<AttachmentEvent> {
        std::mem::take(&mut self.events)
    }
}
