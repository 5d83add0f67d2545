//! Host-side shot validation
//!
//! The validator never trusts peer-reported state. A shot request is checked
//! against what the host knows about the holder, in a fixed order that stops
//! at the first failure:
//!
//! 0. well-formed (unit direction, spread no tighter than the holder's,
//!    trace count in range)
//! 1. client time within the allowed skew of server time
//! 2. origin near the holder, direction near its facing
//! 3. no reload running and ammunition loaded
//! 4. fire-rate interval since the last accepted shot
//!
//! Hit resolution reuses the request's origin, direction, spread and seed
//! verbatim, so the peer's cosmetic traces and the host's outcome come from
//! the same geometry.

use crate::config::ValidatorConfig;
use crate::messages::{RejectReason, ShotRequest};
use armory_core::{
    GameRng, GeometryQuery, HolderId, Pose, ResourceLedger, Timestamp, TraceHit, TraceProfile, Vec3,
};
use indexmap::IndexMap;

/// Slack for comparing shot intervals
const RATE_EPSILON: f64 = 1e-9;
/// Slack for comparing spread angles
const SPREAD_EPSILON: f64 = 1e-6;

/// What the host knows about a holder when a request arrives
#[derive(Debug, Clone, Copy)]
pub struct GroundTruth<'a> {
    pub server_now: Timestamp,
    pub pose: Pose,
    /// The requesting peer is also the holder's local authority
    pub locally_authoritative: bool,
    pub ledger: &'a ResourceLedger,
    pub fire_rate_rpm: f64,
    /// The holder's effective spread; requests may not be more accurate
    pub spread_angle: f64,
}

/// Result of validating a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Accept => None,
            Verdict::Reject(reason) => Some(*reason),
        }
    }
}

/// Shot validator for every holder on the host
#[derive(Debug, Clone, Default)]
pub struct ActionValidator {
    config: ValidatorConfig,
    last_accepted: IndexMap<HolderId, Timestamp>,
}

impl ActionValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            last_accepted: IndexMap::new(),
        }
    }

    /// Decide whether a shot may be committed
    pub fn validate_shot(&self, request: &ShotRequest, truth: &GroundTruth<'_>) -> Verdict {
        let verdict = self.check_shot(request, truth);
        if let Verdict::Reject(reason) = verdict {
            tracing::debug!(
                holder = %request.holder,
                key = %request.correlation_id,
                code = reason.code(),
                %reason,
                "shot rejected"
            );
        }
        verdict
    }

    fn check_shot(&self, request: &ShotRequest, truth: &GroundTruth<'_>) -> Verdict {
        if !self.is_well_formed(request, truth) {
            return Verdict::Reject(RejectReason::Malformed);
        }

        let skew = truth.server_now.distance(request.issued_client_time);
        if skew.is_nan() || skew > self.config.max_clock_skew {
            return Verdict::Reject(RejectReason::StaleOrFutureTimestamp);
        }

        let drift = request.origin.distance(truth.pose.position);
        if drift.is_nan() || drift > self.config.max_origin_drift(truth.locally_authoritative) {
            return Verdict::Reject(RejectReason::ImplausibleOrigin);
        }
        if request.direction.angle_deg(truth.pose.forward) > self.config.max_angle_deviation {
            return Verdict::Reject(RejectReason::ImplausibleDirection);
        }

        if truth.ledger.is_reloading() {
            return Verdict::Reject(RejectReason::ReloadInProgress);
        }
        if !truth.ledger.has_ammo() {
            return Verdict::Reject(RejectReason::InsufficientResource);
        }

        if let Some(last) = self.last_accepted.get(&request.holder) {
            let interval = if truth.fire_rate_rpm > 0.0 {
                60.0 / truth.fire_rate_rpm
            } else {
                f64::INFINITY
            };
            if truth.server_now.since(*last) + RATE_EPSILON < interval {
                return Verdict::Reject(RejectReason::RateExceeded);
            }
        }

        Verdict::Accept
    }

    fn is_well_formed(&self, request: &ShotRequest, truth: &GroundTruth<'_>) -> bool {
        let finite = |v: Vec3| v.x.is_finite() && v.y.is_finite() && v.z.is_finite();
        finite(request.origin)
            && finite(request.direction)
            && request.direction.is_normalized(self.config.direction_tolerance)
            && request.spread_angle.is_finite()
            && request.spread_angle >= 0.0
            && request.spread_angle + SPREAD_EPSILON >= truth.spread_angle
            && request.issued_client_time.as_secs().is_finite()
            && (1..=self.config.max_traces).contains(&request.trace_count)
    }

    /// Remember that the host committed a shot for `holder` at `now`
    pub fn record_accepted(&mut self, holder: HolderId, now: Timestamp) {
        self.last_accepted.insert(holder, now);
    }

    /// Drop per-holder history (despawn)
    pub fn forget(&mut self, holder: HolderId) {
        self.last_accepted.shift_remove(&holder);
    }

    pub fn last_accepted(&self, holder: HolderId) -> Option<Timestamp> {
        self.last_accepted.get(&holder).copied()
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }
}

/// Directions of every trace in a shot, derived from its seed
pub fn shot_directions(request: &ShotRequest) -> Vec<Vec3> {
    let mut rng = GameRng::new(request.random_seed);
    (0..request.trace_count)
        .map(|_| rng.cone_direction(request.direction, request.spread_angle))
        .collect()
}

/// Trace a shot against the world, nearest hit per trace
pub fn resolve_hits(
    request: &ShotRequest,
    geometry: &dyn GeometryQuery,
    max_range: f64,
    profile: &TraceProfile,
) -> Vec<TraceHit> {
    shot_directions(request)
        .into_iter()
        .filter_map(|dir| {
            let end = request.origin + dir * max_range;
            geometry
                .trace_line(request.origin, end, profile)
                .into_iter()
                .next()
        })
        .collect()
}
