//! Layered attribute lookup
//!
//! Attribute values (fire rate, spread, damage...) come from three layers
//! with one fixed precedence:
//!
//! ```text
//! Item (per weapon)  >  Ammo  >  Defaults
//! ```
//!
//! Writers go through a single mutex, update their layer and publish a new
//! resolved snapshot. Readers clone the current `Arc` under a short read lock
//! and look up values without holding any lock.

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Well-known attribute names
pub mod names {
    pub const FIRE_RATE: &str = "fire_rate";
    pub const SPREAD: &str = "spread";
    pub const DAMAGE: &str = "damage";
    pub const RANGE: &str = "range";
    pub const RELOAD_SPEED: &str = "reload_speed";
    pub const RECOIL: &str = "recoil";
}

/// Source layer of an attribute value, highest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeLayer {
    Item,
    Ammo,
    Defaults,
}

impl AttributeLayer {
    pub const PRECEDENCE: [AttributeLayer; 3] =
        [AttributeLayer::Item, AttributeLayer::Ammo, AttributeLayer::Defaults];
}

/// Resolved view of all layers at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSnapshot {
    version: u64,
    values: IndexMap<String, (f64, AttributeLayer)>,
}

impl AttributeSnapshot {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|(v, _)| *v)
    }

    /// Layer the resolved value came from
    pub fn source(&self, name: &str) -> Option<AttributeLayer> {
        self.values.get(name).map(|(_, layer)| *layer)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Default)]
struct Layers {
    item: IndexMap<String, f64>,
    ammo: IndexMap<String, f64>,
    defaults: IndexMap<String, f64>,
    version: u64,
}

impl Layers {
    fn layer_mut(&mut self, layer: AttributeLayer) -> &mut IndexMap<String, f64> {
        match layer {
            AttributeLayer::Item => &mut self.item,
            AttributeLayer::Ammo => &mut self.ammo,
            AttributeLayer::Defaults => &mut self.defaults,
        }
    }

    fn layer(&self, layer: AttributeLayer) -> &IndexMap<String, f64> {
        match layer {
            AttributeLayer::Item => &self.item,
            AttributeLayer::Ammo => &self.ammo,
            AttributeLayer::Defaults => &self.defaults,
        }
    }

    fn resolve(&mut self) -> AttributeSnapshot {
        self.version += 1;
        let mut values = IndexMap::new();
        // Lowest precedence first so higher layers overwrite
        for layer in AttributeLayer::PRECEDENCE.iter().rev() {
            for (name, value) in self.layer(*layer) {
                values.insert(name.clone(), (*value, *layer));
            }
        }
        AttributeSnapshot {
            version: self.version,
            values,
        }
    }
}

/// Thread-safe attribute cache
#[derive(Debug, Default)]
pub struct AttributeCache {
    writer: Mutex<Layers>,
    snapshot: RwLock<Arc<AttributeSnapshot>>,
}

impl AttributeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current resolved snapshot
    pub fn snapshot(&self) -> Arc<AttributeSnapshot> {
        self.snapshot.read().clone()
    }

    /// Resolved value of `name`
    pub fn get(&self, name: &str) -> Option<f64> {
        self.snapshot().get(name)
    }

    /// Resolved value of `name`, or `fallback` when no layer defines it
    pub fn get_or(&self, name: &str, fallback: f64) -> f64 {
        self.get(name).unwrap_or(fallback)
    }

    /// Write one value into a layer
    pub fn set(&self, layer: AttributeLayer, name: impl Into<String>, value: f64) {
        self.write(|layers| {
            layers.layer_mut(layer).insert(name.into(), value);
        });
    }

    /// Write several values into a layer with a single publish
    pub fn set_many<I, K>(&self, layer: AttributeLayer, values: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.write(|layers| {
            let target = layers.layer_mut(layer);
            for (name, value) in values {
                target.insert(name.into(), value);
            }
        });
    }

    /// Remove a value from a layer; lower layers become visible again
    pub fn remove(&self, layer: AttributeLayer, name: &str) -> Option<f64> {
        let mut removed = None;
        self.write(|layers| {
            removed = layers.layer_mut(layer).shift_remove(name);
        });
        removed
    }

    /// Drop every value in a layer (e.g. when the ammo type changes)
    pub fn clear_layer(&self, layer: AttributeLayer) {
        self.write(|layers| layers.layer_mut(layer).clear());
    }

    fn write(&self, mutate: impl FnOnce(&mut Layers)) {
        let mut layers = self.writer.lock();
        mutate(&mut layers);
        let resolved = Arc::new(layers.resolve());
        *self.snapshot.write() = resolved;
    }
}
