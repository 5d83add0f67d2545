//! Netcode configuration
//!
//! All tunables of the host validator, the peer prediction ledger and the
//! host's correlation dedup window. Every struct has a `Default` and loads
//! from RON with missing fields falling back to their defaults.

use serde::{Deserialize, Serialize};

/// Host-side validation bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Maximum seconds between server time and a request's client time
    pub max_clock_skew: f64,
    /// Maximum origin drift for remote peers, in world units
    pub max_origin_drift_remote: f64,
    /// Maximum origin drift for the locally-authoritative peer
    pub max_origin_drift_local: f64,
    /// Maximum degrees between request direction and holder forward
    pub max_angle_deviation: f64,
    /// Maximum traces in one shot request
    pub max_traces: u32,
    /// Tolerance for the unit-length check on directions
    pub direction_tolerance: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_clock_skew: 2.0,
            max_origin_drift_remote: 300.0,
            max_origin_drift_local: 600.0,
            max_angle_deviation: 45.0,
            max_traces: 32,
            direction_tolerance: 1e-3,
        }
    }
}

impl ValidatorConfig {
    /// Origin drift bound for a peer
    pub fn max_origin_drift(&self, locally_authoritative: bool) -> f64 {
        if locally_authoritative {
            self.max_origin_drift_local
        } else {
            self.max_origin_drift_remote
        }
    }
}

/// Peer-side prediction bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Seconds before an unconfirmed prediction is rolled back
    pub timeout: f64,
    /// Maximum live predictions; the oldest is expired first when exceeded
    pub max_outstanding: usize,
    /// Retired keys remembered so late results can be recognized
    pub retired_history: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            timeout: 2.0,
            max_outstanding: 5,
            retired_history: 64,
        }
    }
}

/// Host-side duplicate detection window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Responses cached per (peer, holder) stream
    pub capacity: usize,
    /// Seconds a cached response stays replayable
    pub ttl: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            ttl: 5.0,
        }
    }
}

/// Top-level netcode configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetcodeConfig {
    pub validator: ValidatorConfig,
    pub prediction: PredictionConfig,
    pub dedup: DedupConfig,
}

impl NetcodeConfig {
    /// Parse a RON config
    ///
    /// # Example
    ///
    /// ```
    /// use armory_netcode::NetcodeConfig;
    ///
    /// let config = NetcodeConfig::from_ron("(prediction: (timeout: 1.5))").unwrap();
    /// assert_eq!(config.prediction.timeout, 1.5);
    /// assert_eq!(config.prediction.max_outstanding, 5);
    /// ```
    pub fn from_ron(text: &str) -> std::result::Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NetcodeConfig::default();
        assert_eq!(config.validator.max_clock_skew, 2.0);
        assert_eq!(config.validator.max_origin_drift(false), 300.0);
        assert_eq!(config.validator.max_origin_drift(true), 600.0);
        assert_eq!(config.validator.max_angle_deviation, 45.0);
        assert_eq!(config.prediction.timeout, 2.0);
        assert_eq!(config.prediction.max_outstanding, 5);
    }

    #[test]
    fn test_partial_ron() {
        let config = NetcodeConfig::from_ron(
            "(validator: (max_clock_skew: 0.5), dedup: (capacity: 4))",
        )
        .unwrap();
        assert_eq!(config.validator.max_clock_skew, 0.5);
        assert_eq!(config.validator.max_traces, 32);
        assert_eq!(config.dedup.capacity, 4);
        assert_eq!(config.dedup.ttl, 5.0);
    }

    #[test]
    fn test_empty_ron_is_default() {
        assert_eq!(NetcodeConfig::from_ron("()").unwrap(), NetcodeConfig::default());
    }
}
