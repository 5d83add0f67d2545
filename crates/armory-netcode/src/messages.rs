//! Wire messages between peers and the host
//!
//! Peers send [`PeerMessage`]s carrying a correlation id; the host answers
//! with the matching [`HostMessage`] result echoing that id, and pushes
//! resource and fire-mode snapshots whenever the authoritative state changes.
//! Both travel inside an [`Envelope`] encoded with bincode.

use crate::error::Result;
use armory_core::{
    AttachmentRecord, AttachmentState, HolderId, MountPoint, MountSurface, Offset, ReloadKind,
    ReloadState, ResourceLedger, ResourceState, Timestamp, TraceHit, Vec3,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Peer-local key linking a request to its result
///
/// Keys wrap around after `u32::MAX`, so they are ordered with
/// [`CorrelationId::is_newer_than`] rather than `<`. Key 0 is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub u32);

impl CorrelationId {
    const HALF: u32 = u32::MAX / 2 + 1;

    /// Wrap-aware ordering: true when `self` was issued after `other`
    pub fn is_newer_than(self, other: CorrelationId) -> bool {
        let (a, b) = (self.0, other.0);
        (a > b && a - b <= Self::HALF) || (a < b && b - a > Self::HALF)
    }

    /// The key issued after this one, skipping 0
    pub fn next(self) -> CorrelationId {
        match self.0.wrapping_add(1) {
            0 => CorrelationId(1),
            n => CorrelationId(n),
        }
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a connected peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

/// Why the host refused an action
///
/// Rejections are expected traffic, not failures: they are returned to the
/// peer and never logged as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum RejectReason {
    #[error("malformed request")]
    Malformed,
    #[error("client time too far from server time")]
    StaleOrFutureTimestamp,
    #[error("origin too far from the holder")]
    ImplausibleOrigin,
    #[error("direction too far from the holder's facing")]
    ImplausibleDirection,
    #[error("no ammunition loaded")]
    InsufficientResource,
    #[error("reload in progress")]
    ReloadInProgress,
    #[error("fire rate exceeded")]
    RateExceeded,
    #[error("correlation id already processed")]
    DuplicateCorrelationId,
    #[error("reload not needed")]
    NotNeeded,
    #[error("action already in progress")]
    AlreadyInProgress,
    #[error("no valid mount point")]
    NoValidMount,
    #[error("item is not attached")]
    NotAttached,
    #[error("fire mode unavailable")]
    ModeUnavailable,
    #[error("unknown holder")]
    UnknownHolder,
    #[error("peer does not own the holder")]
    NotOwner,
}

impl RejectReason {
    /// Stable numeric code sent to clients
    pub fn code(&self) -> u16 {
        match self {
            RejectReason::Malformed => 1,
            RejectReason::StaleOrFutureTimestamp => 2,
            RejectReason::ImplausibleOrigin => 3,
            RejectReason::ImplausibleDirection => 4,
            RejectReason::InsufficientResource => 5,
            RejectReason::ReloadInProgress => 6,
            RejectReason::RateExceeded => 7,
            RejectReason::DuplicateCorrelationId => 8,
            RejectReason::NotNeeded => 9,
            RejectReason::AlreadyInProgress => 10,
            RejectReason::NoValidMount => 11,
            RejectReason::NotAttached => 12,
            RejectReason::ModeUnavailable => 13,
            RejectReason::UnknownHolder => 14,
            RejectReason::NotOwner => 15,
        }
    }
}

impl From<&armory_core::Error> for RejectReason {
    fn from(err: &armory_core::Error) -> Self {
        use armory_core::Error as E;
        match err {
            E::InsufficientResource { .. } => RejectReason::InsufficientResource,
            E::NotNeeded => RejectReason::NotNeeded,
            E::AlreadyInProgress => RejectReason::AlreadyInProgress,
            E::NoValidMount => RejectReason::NoValidMount,
            E::NotAttached => RejectReason::NotAttached,
            E::UnknownMode(_) | E::ModeUnavailable | E::NoModes => RejectReason::ModeUnavailable,
            E::NotReloading | E::InvalidAmount(_) | E::InvariantViolation(_) => {
                RejectReason::Malformed
            }
        }
    }
}

/// Authoritative ammunition of one holder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub holder: HolderId,
    pub state: ResourceState,
    /// Kind of the running reload, if any
    pub reloading: Option<ReloadKind>,
}

impl ResourceSnapshot {
    pub fn capture(holder: HolderId, ledger: &ResourceLedger) -> Self {
        Self {
            holder,
            state: ledger.state().clone(),
            reloading: ledger.reload().map(|r| r.kind),
        }
    }

    pub fn loaded(&self) -> f64 {
        self.state.loaded
    }

    pub fn reserve(&self) -> f64 {
        self.state.reserve
    }

    /// Reload state for a mirror, stamped with the local receive time
    pub fn reload_state(&self, received_at: Timestamp) -> Option<ReloadState> {
        self.reloading.map(|kind| ReloadState {
            kind,
            is_partial: kind == ReloadKind::Tactical,
            started_at: received_at,
        })
    }
}

/// Authoritative fire mode of one holder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireModeSnapshot {
    pub holder: HolderId,
    pub current_index: usize,
}

/// A firing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRequest {
    pub correlation_id: CorrelationId,
    pub holder: HolderId,
    pub origin: Vec3,
    /// Unit vector
    pub direction: Vec3,
    /// Spread half-angle in degrees
    pub spread_angle: f64,
    pub issued_client_time: Timestamp,
    pub random_seed: u64,
    pub trace_count: u32,
}

/// Host ruling on a [`ShotRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotResult {
    pub correlation_id: CorrelationId,
    pub holder: HolderId,
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub hits: Vec<TraceHit>,
    /// Ammunition after the host processed the request; `None` when the host
    /// has no such holder
    pub resource: Option<ResourceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadStartRequest {
    pub correlation_id: CorrelationId,
    pub holder: HolderId,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadStartResult {
    pub correlation_id: CorrelationId,
    pub holder: HolderId,
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub kind: Option<ReloadKind>,
    /// Seconds until the reload completes
    pub duration: f64,
    pub resource: Option<ResourceSnapshot>,
}

/// Pushed when a reload finishes on the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadCompleteNotice {
    pub transferred: f64,
    pub resource: ResourceSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireModeRequest {
    pub correlation_id: CorrelationId,
    pub holder: HolderId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireModeResult {
    pub correlation_id: CorrelationId,
    pub holder: HolderId,
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub mode: Option<FireModeSnapshot>,
}

/// Attachment change requested by a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttachmentAction {
    Attach {
        active: bool,
        mount: Option<MountPoint>,
    },
    SetActive {
        active: bool,
        animated: bool,
    },
    Detach {
        keep_world_placement: bool,
    },
}

impl AttachmentAction {
    /// Perform the action on an attachment state
    ///
    /// Host and peer run the same resolution, so a prediction only diverges
    /// when their mount surfaces differ.
    pub fn apply(
        &self,
        state: &mut AttachmentState,
        holder: HolderId,
        surface: &(impl MountSurface + ?Sized),
    ) -> armory_core::Result<()> {
        match self {
            AttachmentAction::Attach { active, mount } => {
                state.attach(holder, *active, mount.as_ref(), surface)?;
            }
            AttachmentAction::SetActive { active, animated } => {
                state.set_active(*active, *animated, surface)?;
            }
            AttachmentAction::Detach {
                keep_world_placement,
            } => {
                state
                    .detach(*keep_world_placement)
                    .ok_or(armory_core::Error::NotAttached)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRequest {
    pub correlation_id: CorrelationId,
    pub holder: HolderId,
    pub action: AttachmentAction,
    /// Offset the peer used locally; the host uses its own mount profile
    pub offset: Offset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentConfirm {
    pub correlation_id: CorrelationId,
    pub holder: HolderId,
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    /// Authoritative attachment after processing (mount and offset)
    pub actual: Option<AttachmentRecord>,
}

/// Peer → host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerMessage {
    Shot(ShotRequest),
    ReloadStart(ReloadStartRequest),
    FireMode(FireModeRequest),
    Attachment(AttachmentRequest),
}

impl PeerMessage {
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            PeerMessage::Shot(r) => r.correlation_id,
            PeerMessage::ReloadStart(r) => r.correlation_id,
            PeerMessage::FireMode(r) => r.correlation_id,
            PeerMessage::Attachment(r) => r.correlation_id,
        }
    }

    pub fn holder(&self) -> HolderId {
        match self {
            PeerMessage::Shot(r) => r.holder,
            PeerMessage::ReloadStart(r) => r.holder,
            PeerMessage::FireMode(r) => r.holder,
            PeerMessage::Attachment(r) => r.holder,
        }
    }
}

/// Host → peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostMessage {
    ShotResult(ShotResult),
    ReloadStartResult(ReloadStartResult),
    ReloadComplete(ReloadCompleteNotice),
    FireModeResult(FireModeResult),
    AttachmentConfirm(AttachmentConfirm),
    ResourceSnapshot(ResourceSnapshot),
    FireModeSnapshot(FireModeSnapshot),
}

impl HostMessage {
    /// Correlation id for responses; `None` for pushed notifications
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            HostMessage::ShotResult(r) => Some(r.correlation_id),
            HostMessage::ReloadStartResult(r) => Some(r.correlation_id),
            HostMessage::FireModeResult(r) => Some(r.correlation_id),
            HostMessage::AttachmentConfirm(r) => Some(r.correlation_id),
            HostMessage::ReloadComplete(_)
            | HostMessage::ResourceSnapshot(_)
            | HostMessage::FireModeSnapshot(_) => None,
        }
    }

    /// Rejection reason for responses that were refused
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            HostMessage::ShotResult(r) => r.reason,
            HostMessage::ReloadStartResult(r) => r.reason,
            HostMessage::FireModeResult(r) => r.reason,
            HostMessage::AttachmentConfirm(r) => r.reason,
            _ => None,
        }
    }
}

/// Framing for one message on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    pub peer: PeerId,
    /// Per-sender send counter
    pub sequence: u64,
    pub message: M,
}

impl<M> Envelope<M> {
    pub fn new(peer: PeerId, sequence: u64, message: M) -> Self {
        Self {
            peer,
            sequence,
            message,
        }
    }
}

impl<M: Serialize> Envelope<M> {
    /// Encode with bincode
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

impl<M: DeserializeOwned> Envelope<M> {
    /// Decode from bincode
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
