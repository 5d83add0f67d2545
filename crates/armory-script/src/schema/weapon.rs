//! Weapon definition schema

use crate::error::{Error, Result};
use armory_core::{
    CapabilityRef, FireModeRecord, HolderConfig, ModeId, MountProfile, ReloadTimings,
    ResourceKindId, Tag, TraceProfile, WeaponArchetype, DEFAULT_RESERVE_MAGAZINES,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Definition of a fire mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireModeDef {
    /// Mode tag (e.g. "mode.burst")
    pub tag: ModeId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Capability granted while the mode is selected
    #[serde(default)]
    pub capability: Option<CapabilityRef>,
    /// Input slot for the capability
    #[serde(default)]
    pub input_slot: i32,
    /// Whether the mode starts enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl From<&FireModeDef> for FireModeRecord {
    fn from(def: &FireModeDef) -> Self {
        FireModeRecord {
            tag: def.tag.clone(),
            display_name: def.name.clone(),
            capability_ref: def.capability.clone(),
            input_slot: def.input_slot,
            enabled: def.enabled,
        }
    }
}

/// Definition of a weapon type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponDef {
    /// Unique identifier for this weapon
    pub id: Tag,
    /// Display name
    pub name: String,
    /// Weapon family, used for size fallbacks
    #[serde(default)]
    pub archetype: WeaponArchetype,
    /// Ammunition kind
    pub ammo: ResourceKindId,
    /// Magazine size (archetype default when absent)
    #[serde(default)]
    pub magazine_size: Option<f64>,
    /// Reserve at spawn (three magazines when absent)
    #[serde(default)]
    pub starting_reserve: Option<f64>,
    /// Reserve cap (at least the starting reserve)
    #[serde(default)]
    pub max_reserve: Option<f64>,
    /// Rounds per minute (archetype default when absent)
    #[serde(default)]
    pub fire_rate: Option<f64>,
    /// Spread half-angle in degrees
    #[serde(default)]
    pub spread: f64,
    /// Traces per shot
    #[serde(default = "default_pellets")]
    pub pellets: u32,
    /// Maximum trace distance
    #[serde(default)]
    pub range: Option<f64>,
    /// Collision profile for traces
    #[serde(default)]
    pub trace_profile: Option<TraceProfile>,
    #[serde(default)]
    pub reload: ReloadTimings,
    /// Modifier applied while reloading
    #[serde(default)]
    pub reload_modifier: Option<CapabilityRef>,
    /// Fire modes in selection order (single shot when empty)
    #[serde(default)]
    pub fire_modes: Vec<FireModeDef>,
    /// Mode selected at spawn
    #[serde(default)]
    pub default_mode: Option<ModeId>,
    #[serde(default)]
    pub mounts: MountProfile,
    /// Per-weapon attribute overrides
    #[serde(default)]
    pub attributes: IndexMap<String, f64>,
}

fn default_pellets() -> u32 {
    1
}

impl WeaponDef {
    /// Create a definition that relies on archetype fallbacks
    pub fn new(
        id: impl Into<Tag>,
        name: impl Into<String>,
        archetype: WeaponArchetype,
        ammo: impl Into<ResourceKindId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            archetype,
            ammo: ammo.into(),
            magazine_size: None,
            starting_reserve: None,
            max_reserve: None,
            fire_rate: None,
            spread: 0.0,
            pellets: default_pellets(),
            range: None,
            trace_profile: None,
            reload: ReloadTimings::default(),
            reload_modifier: None,
            fire_modes: Vec::new(),
            default_mode: None,
            mounts: MountProfile::default(),
            attributes: IndexMap::new(),
        }
    }

    /// Magazine size after archetype fallback
    pub fn capacity(&self) -> f64 {
        self.magazine_size
            .unwrap_or_else(|| self.archetype.default_capacity())
    }

    /// Build and validate the holder config for this weapon
    pub fn to_holder_config(&self) -> Result<HolderConfig> {
        if self.pellets == 0 {
            return Err(Error::InvalidSchema(format!(
                "weapon {} fires zero pellets",
                self.id
            )));
        }

        let capacity = self.capacity();
        let reserve = self
            .starting_reserve
            .unwrap_or(capacity * DEFAULT_RESERVE_MAGAZINES);
        let reserve_cap = self.max_reserve.unwrap_or(reserve).max(reserve);

        let mut config = HolderConfig::for_archetype(self.archetype, self.ammo.clone());
        config.capacity = capacity;
        config.initial_loaded = capacity;
        config.initial_reserve = reserve;
        config.reserve_cap = reserve_cap;
        if let Some(rate) = self.fire_rate {
            config.fire_rate_rpm = rate;
        }
        config.spread_angle = self.spread;
        config.traces_per_shot = self.pellets;
        if let Some(range) = self.range {
            config.max_range = range;
        }
        if let Some(profile) = &self.trace_profile {
            config.trace_profile = profile.clone();
        }
        config.reload = self.reload;
        config.reload_modifier = self.reload_modifier.clone();
        if !self.fire_modes.is_empty() {
            config.fire_modes = self.fire_modes.iter().map(FireModeRecord::from).collect();
        }
        config.default_mode = self.default_mode.clone();
        config.mounts = self.mounts.clone();
        config.attributes = self.attributes.clone();

        config.validate()?;
        Ok(config)
    }
}
