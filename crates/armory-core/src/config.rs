//! Holder configuration
//!
//! [`HolderConfig`] carries everything a holder needs at initialization:
//! magazine and reserve sizes, fire rate, reload timings, fire modes and the
//! mount profile. Configs are plain serde structs, so they can be loaded from
//! RON directly or built from a weapon definition.

use crate::attachment::MountProfile;
use crate::error::{Error, Result};
use crate::fire_mode::FireModeRecord;
use crate::geometry::TraceProfile;
use crate::identity::{CapabilityRef, ModeId, ResourceKindId};
use crate::ledger::ReloadKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Number of magazines a holder carries in reserve by default
pub const DEFAULT_RESERVE_MAGAZINES: f64 = 3.0;

/// Reload durations in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadTimings {
    /// Magazine swap with a round still chambered
    pub tactical: f64,
    /// Reload from an empty magazine
    pub full: f64,
    /// Per-round loading time (tube-fed weapons); overrides the flat timings
    pub per_unit: Option<f64>,
}

impl Default for ReloadTimings {
    fn default() -> Self {
        Self {
            tactical: 2.5,
            full: 3.5,
            per_unit: None,
        }
    }
}

impl ReloadTimings {
    /// Seconds a reload of `kind` takes when `units` rounds must be loaded
    ///
    /// # Example
    ///
    /// ```
    /// use armory_core::{ReloadKind, ReloadTimings};
    ///
    /// let timings = ReloadTimings::default();
    /// assert_eq!(timings.duration(ReloadKind::Full, 30.0), 3.5);
    ///
    /// let shotgun = ReloadTimings { per_unit: Some(0.5), ..Default::default() };
    /// assert_eq!(shotgun.duration(ReloadKind::Tactical, 4.0), 2.0);
    /// ```
    pub fn duration(&self, kind: ReloadKind, units: f64) -> f64 {
        if let Some(per_unit) = self.per_unit {
            return per_unit * units.max(0.0);
        }
        match kind {
            ReloadKind::Tactical => self.tactical,
            ReloadKind::Full => self.full,
        }
    }
}

/// Broad weapon family, used for fallbacks when a definition omits sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WeaponArchetype {
    #[default]
    Rifle,
    Smg,
    Lmg,
    Sniper,
    Shotgun,
    Pistol,
}

impl WeaponArchetype {
    /// Magazine size used when none is configured
    pub fn default_capacity(&self) -> f64 {
        match self {
            WeaponArchetype::Rifle => 30.0,
            WeaponArchetype::Smg => 25.0,
            WeaponArchetype::Lmg => 100.0,
            WeaponArchetype::Sniper => 10.0,
            WeaponArchetype::Shotgun => 8.0,
            WeaponArchetype::Pistol => 15.0,
        }
    }

    /// Rounds per minute used when none is configured
    pub fn default_fire_rate(&self) -> f64 {
        match self {
            WeaponArchetype::Rifle => 600.0,
            WeaponArchetype::Smg => 800.0,
            WeaponArchetype::Lmg => 700.0,
            WeaponArchetype::Sniper => 40.0,
            WeaponArchetype::Shotgun => 70.0,
            WeaponArchetype::Pistol => 300.0,
        }
    }
}

/// Everything needed to initialize one holder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderConfig {
    /// Weapon family
    #[serde(default)]
    pub archetype: WeaponArchetype,
    /// Ammunition kind
    pub kind: ResourceKindId,
    /// Magazine capacity
    pub capacity: f64,
    /// Maximum reserve
    pub reserve_cap: f64,
    /// Rounds loaded at initialization
    pub initial_loaded: f64,
    /// Reserve at initialization
    pub initial_reserve: f64,
    /// Rounds per minute
    pub fire_rate_rpm: f64,
    /// Base spread half-angle in degrees
    #[serde(default)]
    pub spread_angle: f64,
    /// Traces per shot (pellets)
    #[serde(default = "default_traces")]
    pub traces_per_shot: u32,
    /// Maximum trace distance
    #[serde(default = "default_range")]
    pub max_range: f64,
    /// Collision profile for shot traces
    #[serde(default = "default_trace_profile")]
    pub trace_profile: TraceProfile,
    #[serde(default)]
    pub reload: ReloadTimings,
    /// Modifier applied through the effect engine while reloading
    #[serde(default)]
    pub reload_modifier: Option<CapabilityRef>,
    /// Ordered fire modes
    pub fire_modes: Vec<FireModeRecord>,
    /// Mode selected at initialization (first mode when absent)
    #[serde(default)]
    pub default_mode: Option<ModeId>,
    #[serde(default)]
    pub mounts: MountProfile,
    /// Per-weapon attribute values
    #[serde(default)]
    pub attributes: IndexMap<String, f64>,
}

fn default_traces() -> u32 {
    1
}

fn default_range() -> f64 {
    10_000.0
}

fn default_trace_profile() -> TraceProfile {
    TraceProfile::new("weapon")
}

impl HolderConfig {
    /// Create a config from archetype fallbacks with a single fire mode
    ///
    /// The magazine starts full with three magazines in reserve.
    ///
    /// # Example
    ///
    /// ```
    /// use armory_core::{HolderConfig, WeaponArchetype};
    ///
    /// let config = HolderConfig::for_archetype(WeaponArchetype::Rifle, "ammo.556");
    /// assert_eq!(config.capacity, 30.0);
    /// assert_eq!(config.initial_reserve, 90.0);
    /// ```
    pub fn for_archetype(archetype: WeaponArchetype, kind: impl Into<ResourceKindId>) -> Self {
        let capacity = archetype.default_capacity();
        let reserve = capacity * DEFAULT_RESERVE_MAGAZINES;
        Self {
            archetype,
            kind: kind.into(),
            capacity,
            reserve_cap: reserve,
            initial_loaded: capacity,
            initial_reserve: reserve,
            fire_rate_rpm: archetype.default_fire_rate(),
            spread_angle: 0.0,
            traces_per_shot: default_traces(),
            max_range: default_range(),
            trace_profile: default_trace_profile(),
            reload: ReloadTimings::default(),
            reload_modifier: None,
            fire_modes: vec![FireModeRecord::new("mode.single", "Single")],
            default_mode: None,
            mounts: MountProfile::default(),
            attributes: IndexMap::new(),
        }
    }

    /// Set the magazine capacity, keeping the magazine full
    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self.initial_loaded = capacity;
        self
    }

    /// Set the starting ammunition
    pub fn with_ammo(mut self, loaded: f64, reserve: f64) -> Self {
        self.initial_loaded = loaded;
        self.initial_reserve = reserve;
        self.reserve_cap = self.reserve_cap.max(reserve);
        self
    }

    pub fn with_fire_rate(mut self, rpm: f64) -> Self {
        self.fire_rate_rpm = rpm;
        self
    }

    pub fn with_fire_modes(mut self, modes: Vec<FireModeRecord>) -> Self {
        self.fire_modes = modes;
        self
    }

    /// Minimum seconds between two accepted shots
    pub fn shot_interval(&self) -> f64 {
        60.0 / self.fire_rate_rpm
    }

    /// Check the config before a holder is built from it
    pub fn validate(&self) -> Result<()> {
        if self.capacity.is_nan() || self.capacity <= 0.0 {
            return Err(Error::InvalidAmount(self.capacity));
        }
        if self.reserve_cap.is_nan() || self.reserve_cap < 0.0 {
            return Err(Error::InvalidAmount(self.reserve_cap));
        }
        if self.fire_rate_rpm.is_nan() || self.fire_rate_rpm <= 0.0 {
            return Err(Error::InvalidAmount(self.fire_rate_rpm));
        }
        if self.fire_modes.is_empty() {
            return Err(Error::NoModes);
        }
        if let Some(tag) = &self.default_mode {
            if !self.fire_modes.iter().any(|m| &m.tag == tag) {
                return Err(Error::UnknownMode(tag.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_timings() {
        let t = ReloadTimings::default();
        assert_eq!(t.duration(ReloadKind::Tactical, 10.0), 2.5);
        assert_eq!(t.duration(ReloadKind::Full, 30.0), 3.5);

        let tube = ReloadTimings {
            per_unit: Some(0.25),
            ..Default::default()
        };
        assert_eq!(tube.duration(ReloadKind::Full, 8.0), 2.0);
        assert_eq!(tube.duration(ReloadKind::Full, -1.0), 0.0);
    }

    #[test]
    fn test_archetype_fallbacks() {
        let expected = [
            (WeaponArchetype::Rifle, 30.0),
            (WeaponArchetype::Smg, 25.0),
            (WeaponArchetype::Lmg, 100.0),
            (WeaponArchetype::Sniper, 10.0),
            (WeaponArchetype::Shotgun, 8.0),
            (WeaponArchetype::Pistol, 15.0),
        ];
        for (archetype, capacity) in expected {
            let config = HolderConfig::for_archetype(archetype, "ammo");
            assert_eq!(config.capacity, capacity);
            assert_eq!(config.initial_reserve, capacity * 3.0);
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_builders() {
        let config = HolderConfig::for_archetype(WeaponArchetype::Rifle, "ammo")
            .with_capacity(20.0)
            .with_ammo(0.0, 200.0)
            .with_fire_rate(120.0);
        assert_eq!(config.initial_loaded, 0.0);
        assert_eq!(config.reserve_cap, 200.0);
        assert!((config.shot_interval() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_validate() {
        let base = HolderConfig::for_archetype(WeaponArchetype::Pistol, "ammo.9mm");

        let mut bad = base.clone();
        bad.capacity = 0.0;
        assert_eq!(bad.validate(), Err(Error::InvalidAmount(0.0)));

        let bad = base.clone().with_fire_modes(vec![]);
        assert_eq!(bad.validate(), Err(Error::NoModes));

        let mut bad = base.clone();
        bad.default_mode = Some(ModeId::new("mode.auto"));
        assert_eq!(bad.validate(), Err(Error::UnknownMode(ModeId::new("mode.auto"))));
    }

    #[test]
    fn test_ron_roundtrip_with_defaults() {
        let text = r#"(
            kind: "ammo.556",
            capacity: 30.0,
            reserve_cap: 120.0,
            initial_loaded: 30.0,
            initial_reserve: 90.0,
            fire_rate_rpm: 650.0,
            fire_modes: [(tag: "mode.single"), (tag: "mode.auto", enabled: false)],
        )"#;
        let config: HolderConfig = ron::from_str(text).unwrap();
        assert_eq!(config.archetype, WeaponArchetype::Rifle);
        assert_eq!(config.reload, ReloadTimings::default());
        assert_eq!(config.traces_per_shot, 1);
        assert_eq!(config.fire_modes.len(), 2);
        assert!(!config.fire_modes[1].enabled);
        assert!(config.validate().is_ok());
    }
}
