//! Armory Core - Weapon and equipment state components
//!
//! This crate provides the leaf state of a weapon holder, free of any
//! network awareness:
//! - Ammunition ledger (`ResourceLedger`) with reload transactions
//! - Fire-mode state machine (`ModeSelector`)
//! - Attachment to mount points (`AttachmentState`)
//! - Layered, thread-safe attribute lookup (`AttributeCache`)
//! - `Holder`, composing all of the above for one weapon
//!
//! ## Boundaries
//!
//! The core never renders, animates or traces. It calls out through:
//! - `EffectEngine` - capability grants and timed modifiers
//! - `GeometryQuery` - line traces and aim resolution
//!
//! Time is always passed in as a `Timestamp`; deadlines are polled through
//! a `Scheduler` once per update.

pub mod attachment;
pub mod attributes;
mod config;
pub mod effect;
mod error;
mod fire_mode;
pub mod geometry;
mod holder;
mod identity;
mod ledger;
mod rng;
pub mod scheduler;
pub mod time;

pub use attachment::{
    AttachmentEvent, AttachmentRecord, AttachmentState, EquipSlot, MountCategory, MountProfile,
    MountSurface,
};
pub use attributes::{AttributeCache, AttributeLayer, AttributeSnapshot};
pub use config::{HolderConfig, ReloadTimings, WeaponArchetype, DEFAULT_RESERVE_MAGAZINES};
pub use effect::{CapabilityHandle, EffectEngine, EffectHandles, ModifierHandle, RecordingEffects};
pub use error::{Error, Result};
pub use fire_mode::{FireModeRecord, ModeEvent, ModeSelector};
pub use geometry::{GeometryQuery, Offset, Pose, TraceHit, TraceProfile, Vec3};
pub use holder::{Holder, HolderEvent, PersistedHolderState};
pub use identity::{CapabilityRef, HolderId, ModeId, MountPoint, ResourceKindId, Tag};
pub use ledger::{LedgerEvent, ReloadKind, ReloadState, ResourceLedger, ResourceState};
pub use rng::GameRng;
pub use scheduler::{Scheduler, TaskId};
pub use time::{Clock, Tick, Timestamp};
