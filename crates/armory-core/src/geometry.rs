//! Geometry primitives and the trace boundary
//!
//! The core never performs spatial queries itself. Traces and aim resolution
//! are supplied by the physics layer through [`GeometryQuery`].

use crate::identity::{HolderId, Tag};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// A 3D vector in world units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const FORWARD: Vec3 = Vec3 { x: 1.0, y: 0.0, z: 0.0 };
    pub const UP: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 1.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(&self) -> f64 {
        self.dot(*self).sqrt()
    }

    pub fn distance(&self, other: Vec3) -> f64 {
        (*self - other).length()
    }

    /// Unit vector in the same direction (zero stays zero)
    pub fn normalized(&self) -> Vec3 {
        let len = self.length();
        if len <= f64::EPSILON {
            Vec3::ZERO
        } else {
            *self * (1.0 / len)
        }
    }

    /// Check that this is a unit vector within `tolerance`
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        (self.length() - 1.0).abs() <= tolerance
    }

    /// Angle to `other` in degrees (0 when either vector is zero)
    pub fn angle_deg(&self, other: Vec3) -> f64 {
        let a = self.normalized();
        let b = other.normalized();
        if a == Vec3::ZERO || b == Vec3::ZERO {
            return 0.0;
        }
        a.dot(b).clamp(-1.0, 1.0).acos().to_degrees()
    }

    /// Two unit vectors perpendicular to `self` and to each other
    pub fn orthonormal_basis(&self) -> (Vec3, Vec3) {
        let n = self.normalized();
        let helper = if n.z.abs() < 0.9 { Vec3::UP } else { Vec3::FORWARD };
        let u = n.cross(helper).normalized();
        let v = n.cross(u).normalized();
        (u, v)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Authoritative position and facing of a holder
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// Muzzle (or hand) position
    pub position: Vec3,
    /// Unit forward vector
    pub forward: Vec3,
}

impl Pose {
    pub fn new(position: Vec3, forward: Vec3) -> Self {
        Self {
            position,
            forward: forward.normalized(),
        }
    }
}

/// Relative placement of an attached item on its mount point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub translation: Vec3,
    /// Pitch, yaw, roll in degrees
    pub rotation: Vec3,
}

impl Offset {
    pub const IDENTITY: Offset = Offset {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
    };
}

/// Collision profile name passed through to the physics layer
pub type TraceProfile = Tag;

/// One hit produced by a line trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceHit {
    /// Holder that was hit, if any
    pub target: Option<HolderId>,
    /// World-space impact point
    pub location: Vec3,
    /// Distance from the trace origin
    pub distance: f64,
}

/// Spatial queries supplied by the rendering/physics layer
pub trait GeometryQuery {
    /// Trace a line and return blocking and overlapping hits, nearest first
    fn trace_line(&self, origin: Vec3, end: Vec3, profile: &TraceProfile) -> Vec<TraceHit>;

    /// Resolve where a holder is aiming, up to `max_range`
    fn resolve_aim_point(&self, holder: HolderId, max_range: f64) -> Vec3;
}
