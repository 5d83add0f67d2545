//! Deterministic random number generator
//!
//! Uses a simple xorshift64 algorithm for reproducibility across platforms.
//! A shot's random seed travels with the request, so the peer and the host
//! derive the same spread pattern from it.

use crate::geometry::Vec3;
use serde::{Deserialize, Serialize};

/// A deterministic random number generator
///
/// Uses xorshift64 for simplicity and reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRng {
    state: u64,
}

impl GameRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        // Ensure non-zero state (xorshift requires this)
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Get the current state
    pub fn state(&self) -> u64 {
        self.state
    }

    /// Generate the next raw u64 value
    pub fn next_u64(&mut self) -> u64 {
        // xorshift64 algorithm
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Generate a random f64 in range [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() as f64) / (u64::MAX as f64 + 1.0)
    }

    /// Generate a random f64 in range [min, max)
    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }

    /// Sample a unit direction inside a cone around `axis`
    ///
    /// `half_angle_deg` is the cone's half-angle; zero returns `axis` itself.
    pub fn cone_direction(&mut self, axis: Vec3, half_angle_deg: f64) -> Vec3 {
        let axis = axis.normalized();
        if half_angle_deg <= 0.0 {
            return axis;
        }

        let max_angle = half_angle_deg.to_radians();
        // Uniform over the spherical cap
        let cos_theta = self.range_f64(max_angle.cos(), 1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = self.range_f64(0.0, std::f64::consts::TAU);

        let (u, v) = axis.orthonormal_basis();
        (axis * cos_theta + u * (sin_theta * phi.cos()) + v * (sin_theta * phi.sin())).normalized()
    }
}

impl Default for GameRng {
    fn default() -> Self {
        Self::new(12345)
    }
}
