//! Armory Netcode - Predicted weapon state over an unreliable network
//!
//! This crate keeps peers responsive while the host stays authoritative:
//!
//! - **Prediction**: Apply actions locally under a correlation key
//! - **Validation**: Host-side plausibility checks for every shot
//! - **Reconciliation**: Confirm, roll back or rebase on host answers
//! - **Dedup**: At-least-once delivery without double-applying requests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────── Peer ─────────────────┐        ┌─────────────── Host ────────────────┐
//! │ PeerSession                           │        │ HostAuthority                       │
//! │  ├─ Holder (mirror)                   │ Shot   │  ├─ CorrelationWindow (dedup)       │
//! │  ├─ PredictionLedger ── predict ──────┼───────▶│  ├─ ActionValidator                 │
//! │  │        ▲                           │        │  ├─ Holder (canonical)              │
//! │  │        └── confirm / rebase ◀──────┼────────┤  └─ Scheduler (reload completion)   │
//! │  └─ PeerEvent (cosmetics, rollbacks)  │ Result │                                     │
//! └───────────────────────────────────────┘        └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use armory_core::{HolderConfig, HolderId, RecordingEffects, Timestamp, WeaponArchetype};
//! use armory_netcode::{HostAuthority, NetcodeConfig, PeerId, PeerSession};
//!
//! let config = HolderConfig::for_archetype(WeaponArchetype::Rifle, "ammo.556");
//! let mut host = HostAuthority::new(NetcodeConfig::default(), RecordingEffects::new());
//! let mut peer = PeerSession::new(PeerId(1), NetcodeConfig::default(), seed);
//! host.connect_peer(PeerId(1));
//! host.spawn_holder(HolderId(1), config.clone(), PeerId(1), None)?;
//! peer.add_holder(HolderId(1), config)?;
//!
//! loop {
//!     if trigger_pressed() {
//!         peer.fire(HolderId(1), now)?;
//!     }
//!     for envelope in peer.drain_outbox() {
//!         host.handle(envelope.peer, envelope.message, now, &world);
//!     }
//!     host.update(now);
//!     for outbound in host.drain_outbox() {
//!         peer.handle(outbound.message, now);
//!     }
//!     peer.update(now);
//! }
//! ```

mod config;
mod dedup;
mod error;
mod host;
mod messages;
mod peer;
mod prediction;
mod transport;
mod validator;

pub use config::{DedupConfig, NetcodeConfig, PredictionConfig, ValidatorConfig};
pub use dedup::{CorrelationWindow, DedupDecision};
pub use error::{Error, Result};
pub use host::{HostAuthority, Outbound};
pub use messages::{
    AttachmentAction, AttachmentConfirm, AttachmentRequest, CorrelationId, Envelope,
    FireModeRequest, FireModeResult, FireModeSnapshot, HostMessage, PeerId, PeerMessage,
    RejectReason, ReloadCompleteNotice, ReloadStartRequest, ReloadStartResult, ResourceSnapshot,
    ShotRequest, ShotResult,
};
pub use peer::{PeerEvent, PeerSession};
pub use prediction::{
    ActionKind, Confirmation, ExpiredPrediction, PredictionEntry, PredictionLedger,
    PredictionStats, PredictionTarget, Slot, SlotValue,
};
pub use transport::{recv_envelope, send_envelope, Address, MemoryTransport, Transport};
pub use validator::{resolve_hits, shot_directions, ActionValidator, GroundTruth, Verdict};
