//! Effect-engine boundary
//!
//! Capabilities and timed modifiers are owned by an external effect engine.
//! The core only calls into it and keeps the handles it gets back, so that
//! everything can be released when a holder is torn down.

use crate::identity::CapabilityRef;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Handle to a granted capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityHandle(pub u64);

/// Handle to an applied modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierHandle(pub u64);

/// Opaque capability/modifier engine
pub trait EffectEngine {
    fn grant_capability(&mut self, capability: &CapabilityRef) -> CapabilityHandle;
    fn revoke_capability(&mut self, handle: CapabilityHandle);
    fn apply_modifier(&mut self, modifier: &CapabilityRef, magnitude: f64) -> ModifierHandle;
    fn remove_modifier(&mut self, handle: ModifierHandle);
}

/// Handles a holder currently owns
#[derive(Debug, Clone, Default)]
pub struct EffectHandles {
    capabilities: Vec<CapabilityHandle>,
    modifiers: Vec<ModifierHandle>,
}

impl EffectHandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, engine: &mut dyn EffectEngine, capability: &CapabilityRef) -> CapabilityHandle {
        let handle = engine.grant_capability(capability);
        self.capabilities.push(handle);
        handle
    }

    pub fn revoke(&mut self, engine: &mut dyn EffectEngine, handle: CapabilityHandle) {
        if let Some(pos) = self.capabilities.iter().position(|h| *h == handle) {
            self.capabilities.swap_remove(pos);
            engine.revoke_capability(handle);
        }
    }

    pub fn apply(
        &mut self,
        engine: &mut dyn EffectEngine,
        modifier: &CapabilityRef,
        magnitude: f64,
    ) -> ModifierHandle {
        let handle = engine.apply_modifier(modifier, magnitude);
        self.modifiers.push(handle);
        handle
    }

    pub fn remove(&mut self, engine: &mut dyn EffectEngine, handle: ModifierHandle) {
        if let Some(pos) = self.modifiers.iter().position(|h| *h == handle) {
            self.modifiers.swap_remove(pos);
            engine.remove_modifier(handle);
        }
    }

    /// Revoke and remove everything still held
    pub fn release_all(&mut self, engine: &mut dyn EffectEngine) {
        for handle in self.capabilities.drain(..) {
            engine.revoke_capability(handle);
        }
        for handle in self.modifiers.drain(..) {
            engine.remove_modifier(handle);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.modifiers.is_empty()
    }
}

/// In-memory effect engine that records what is active
///
/// Suitable for headless hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingEffects {
    next_handle: u64,
    capabilities: IndexMap<CapabilityHandle, CapabilityRef>,
    modifiers: IndexMap<ModifierHandle, (CapabilityRef, f64)>,
}

impl RecordingEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_capability(&self, capability: &CapabilityRef) -> bool {
        self.capabilities.values().any(|c| c == capability)
    }

    pub fn has_modifier(&self, modifier: &CapabilityRef) -> bool {
        self.modifiers.values().any(|(m, _)| m == modifier)
    }

    pub fn capability_count(&self) -> usize {
        self.capabilities.len()
    }

    pub fn modifier_count(&self) -> usize {
        self.modifiers.len()
    }

    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl EffectEngine for RecordingEffects {
    fn grant_capability(&mut self, capability: &CapabilityRef) -> CapabilityHandle {
        let handle = CapabilityHandle(self.allocate());
        self.capabilities.insert(handle, capability.clone());
        handle
    }

    fn revoke_capability(&mut self, handle: CapabilityHandle) {
        self.capabilities.shift_remove(&handle);
    }

    fn apply_modifier(&mut self, modifier: &CapabilityRef, magnitude: f64) -> ModifierHandle {
        let handle = ModifierHandle(self.allocate());
        self.modifiers.insert(handle, (modifier.clone(), magnitude));
        handle
    }

    fn remove_modifier(&mut self, handle: ModifierHandle) {
        self.modifiers.shift_remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_all() {
        let mut engine = RecordingEffects::new();
        let mut handles = EffectHandles::new();

        handles.grant(&mut engine, &CapabilityRef::new("cap.fire.auto"));
        handles.apply(&mut engine, &CapabilityRef::new("mod.reload"), 2.5);
        assert_eq!(engine.capability_count(), 1);
        assert_eq!(engine.modifier_count(), 1);

        handles.release_all(&mut engine);
        assert!(handles.is_empty());
        assert_eq!(engine.capability_count(), 0);
        assert_eq!(engine.modifier_count(), 0);
    }

    #[test]
    fn test_revoke_unknown_handle_is_ignored() {
        let mut engine = RecordingEffects::new();
        let mut handles = EffectHandles::new();
        let cap = CapabilityRef::new("cap.fire.single");

        let h = handles.grant(&mut engine, &cap);
        handles.revoke(&mut engine, h);
        handles.revoke(&mut engine, h);
        assert!(!engine.has_capability(&cap));
        assert!(handles.is_empty());
    }
}
