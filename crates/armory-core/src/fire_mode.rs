//! Fire-mode selection state machine
//!
//! The selector owns an ordered list of [`FireModeRecord`]s, the index of the
//! current mode and a set of blocked tags. Transitions skip modes that are
//! disabled or blocked; a rejected transition leaves the state untouched.
//!
//! ```text
//!   next()/previous()        set_by_tag()/set_by_index()
//!  ┌──────────────┐          ┌──────────────┐
//!  │ single ──▶ burst ──▶ auto ──▶ single ...│  (blocked/disabled skipped)
//!  └──────────────┘          └──────────────┘
//! ```

use crate::error::{Error, Result};
use crate::identity::{CapabilityRef, ModeId};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// One selectable fire mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireModeRecord {
    /// Mode tag (e.g. `mode.single`)
    pub tag: ModeId,
    /// Human-readable name
    #[serde(default)]
    pub display_name: String,
    /// Capability granted through the effect engine while this mode is current
    #[serde(default)]
    pub capability_ref: Option<CapabilityRef>,
    /// Input slot bound to the mode's capability
    #[serde(default)]
    pub input_slot: i32,
    /// Whether the mode may be selected
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FireModeRecord {
    /// Create an enabled mode with no capability
    pub fn new(tag: impl Into<ModeId>, display_name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            display_name: display_name.into(),
            capability_ref: None,
            input_slot: 0,
            enabled: true,
        }
    }

    /// Attach a capability reference
    pub fn with_capability(mut self, capability: impl Into<CapabilityRef>) -> Self {
        self.capability_ref = Some(capability.into());
        self
    }

    /// Set the input slot
    pub fn with_input_slot(mut self, slot: i32) -> Self {
        self.input_slot = slot;
        self
    }
}

/// Notifications produced by selector transitions
#[derive(Debug, Clone, PartialEq)]
pub enum ModeEvent {
    /// The current mode moved
    Changed { from: Option<ModeId>, to: ModeId },
    /// A mode became (un)available through blocking or enabling
    AvailabilityChanged { tag: ModeId, available: bool },
}

/// Fire-mode selector for one holder
#[derive(Debug, Clone)]
pub struct ModeSelector {
    modes: Vec<FireModeRecord>,
    current: usize,
    blocked: IndexSet<ModeId>,
    events: Vec<ModeEvent>,
}

impl ModeSelector {
    /// Create a selector starting at `default` (or index 0)
    ///
    /// If the starting mode is unavailable the selector advances to the first
    /// available one.
    pub fn new(modes: Vec<FireModeRecord>, default: Option<&ModeId>) -> Result<Self> {
        if modes.is_empty() {
            return Err(Error::NoModes);
        }

        let start = default
            .and_then(|tag| modes.iter().position(|m| &m.tag == tag))
            .unwrap_or(0);

        let mut selector = Self {
            modes,
            current: start,
            blocked: IndexSet::new(),
            events: Vec::new(),
        };
        if !selector.is_index_available(start) {
            if let Some(index) = selector.scan_forward(start, true) {
                selector.current = index;
            }
        }
        Ok(selector)
    }

    /// Cycle to the next available mode
    pub fn next(&mut self) -> bool {
        match self.scan_forward(self.current, false) {
            Some(index) => self.move_to(index),
            None => false,
        }
    }

    /// Cycle to the previous available mode
    pub fn previous(&mut self) -> bool {
        match self.scan_backward(self.current) {
            Some(index) => self.move_to(index),
            None => false,
        }
    }

    /// Select a mode by tag
    pub fn set_by_tag(&mut self, tag: &ModeId) -> bool {
        match self.index_of(tag) {
            Some(index) => self.set_by_index(index),
            None => {
                tracing::debug!(%tag, "fire mode not found");
                false
            }
        }
    }

    /// Select a mode by index
    pub fn set_by_index(&mut self, index: usize) -> bool {
        if index >= self.modes.len() {
            return false;
        }
        if index == self.current && self.is_index_available(index) {
            return true;
        }
        if !self.is_index_available(index) {
            tracing::debug!(tag = %self.modes[index].tag, "fire mode unavailable");
            return false;
        }
        self.move_to(index)
    }

    /// Block or unblock a mode
    ///
    /// Blocking the current mode advances to the nearest available mode.
    pub fn block(&mut self, tag: &ModeId, blocked: bool) {
        let changed = if blocked {
            self.blocked.insert(tag.clone())
        } else {
            self.blocked.shift_remove(tag)
        };
        if changed {
            self.events.push(ModeEvent::AvailabilityChanged {
                tag: tag.clone(),
                available: !blocked && self.index_of(tag).is_some_and(|i| self.modes[i].enabled),
            });
        }
        self.repair_current();
    }

    /// Enable or disable a mode
    ///
    /// Disabling the current mode advances to the nearest available mode.
    pub fn set_enabled(&mut self, tag: &ModeId, enabled: bool) -> Result<()> {
        let index = self
            .index_of(tag)
            .ok_or_else(|| Error::UnknownMode(tag.clone()))?;

        if self.modes[index].enabled != enabled {
            self.modes[index].enabled = enabled;
            self.events.push(ModeEvent::AvailabilityChanged {
                tag: tag.clone(),
                available: enabled && !self.blocked.contains(tag),
            });
        }
        self.repair_current();
        Ok(())
    }

    /// Apply an authoritative index from the host
    pub fn restore_index(&mut self, index: usize) -> Result<()> {
        if index >= self.modes.len() {
            return Err(Error::InvariantViolation(format!(
                "fire mode index {} out of range ({} modes)",
                index,
                self.modes.len()
            )));
        }
        if index != self.current {
            let from = self.current().map(|m| m.tag.clone());
            self.current = index;
            self.events.push(ModeEvent::Changed {
                from,
                to: self.modes[index].tag.clone(),
            });
        }
        Ok(())
    }

    /// The current mode, or `None` when every mode is unavailable
    pub fn current(&self) -> Option<&FireModeRecord> {
        if self.is_index_available(self.current) {
            self.modes.get(self.current)
        } else {
            None
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn modes(&self) -> &[FireModeRecord] {
        &self.modes
    }

    pub fn is_blocked(&self, tag: &ModeId) -> bool {
        self.blocked.contains(tag)
    }

    /// Whether a mode exists, is enabled and not blocked
    pub fn is_available(&self, tag: &ModeId) -> bool {
        self.index_of(tag)
            .is_some_and(|index| self.is_index_available(index))
    }

    /// Tags of all selectable modes, in order
    pub fn available_modes(&self) -> Vec<ModeId> {
        self.modes
            .iter()
            .filter(|m| m.enabled && !self.blocked.contains(&m.tag))
            .map(|m| m.tag.clone())
            .collect()
    }

    pub fn available_count(&self) -> usize {
        self.modes
            .iter()
            .filter(|m| m.enabled && !self.blocked.contains(&m.tag))
            .count()
    }

    pub fn index_of(&self, tag: &ModeId) -> Option<usize> {
        self.modes.iter().position(|m| &m.tag == tag)
    }

    /// Take all pending notifications
    pub fn drain_events(&mut self) -> Vec<ModeEvent> {
        std::mem::take(&mut self.events)
    }

    fn is_index_available(&self, index: usize) -> bool {
        self.modes
            .get(index)
            .is_some_and(|m| m.enabled && !self.blocked.contains(&m.tag))
    }

    /// First available index after `from` (wrapping), optionally including `from`
    fn scan_forward(&self, from: usize, inclusive: bool) -> Option<usize> {
        let len = self.modes.len();
        let first = if inclusive { 0 } else { 1 };
        (first..len)
            .map(|step| (from + step) % len)
            .find(|&i| self.is_index_available(i))
    }

    fn scan_backward(&self, from: usize) -> Option<usize> {
        let len = self.modes.len();
        (1..len)
            .map(|step| (from + len - step) % len)
            .find(|&i| self.is_index_available(i))
    }

    fn move_to(&mut self, index: usize) -> bool {
        let from = self.modes.get(self.current).map(|m| m.tag.clone());
        self.current = index;
        let to = self.modes[index].tag.clone();
        tracing::info!(%to, "fire mode changed");
        self.events.push(ModeEvent::Changed { from, to });
        true
    }

    /// Keep `current` on an available mode after a membership change
    fn repair_current(&mut self) {
        if self.is_index_available(self.current) {
            return;
        }
        if let Some(index) = self.scan_forward(self.current, false) {
            self.move_to(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn selector() -> ModeSelector {
        ModeSelector::new(
            vec![
                FireModeRecord::new("mode.single", "Single"),
                FireModeRecord::new("mode.burst", "Burst"),
                FireModeRecord::new("mode.auto", "Auto"),
            ],
            None,
        )
        .unwrap()
    }

    fn tag(s: &str) -> ModeId {
        ModeId::new(s)
    }

    #[test]
    fn test_initial_state() {
        let s = selector();
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.current().unwrap().tag, tag("mode.single"));

        let s = ModeSelector::new(selector().modes().to_vec(), Some(&tag("mode.auto"))).unwrap();
        assert_eq!(s.current_index(), 2);

        assert_eq!(ModeSelector::new(vec![], None).unwrap_err(), Error::NoModes);
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let mut s = selector();
        assert!(s.next());
        assert!(s.next());
        assert_eq!(s.current_index(), 2);
        assert!(s.next());
        assert_eq!(s.current_index(), 0);
        assert!(s.previous());
        assert_eq!(s.current_index(), 2);
    }

    #[test]
    fn test_cycle_skips_blocked() {
        let mut s = selector();
        s.block(&tag("mode.burst"), true);
        assert!(s.next());
        assert_eq!(s.current().unwrap().tag, tag("mode.auto"));
        assert!(s.previous());
        assert_eq!(s.current().unwrap().tag, tag("mode.single"));
    }

    #[test]
    fn test_set_rejects_unavailable() {
        let mut s = selector();
        s.set_enabled(&tag("mode.auto"), false).unwrap();
        assert!(!s.set_by_tag(&tag("mode.auto")));
        assert!(!s.set_by_index(2));
        assert!(!s.set_by_index(7));
        assert!(!s.set_by_tag(&tag("mode.missing")));
        assert_eq!(s.current_index(), 0);
        assert!(s.set_by_tag(&tag("mode.burst")));
        assert_eq!(s.current_index(), 1);
    }

    #[test]
    fn test_blocking_current_advances() {
        let mut s = selector();
        s.set_by_index(2);
        s.drain_events();

        s.block(&tag("mode.auto"), true);
        // Wraps around to the front
        assert_eq!(s.current().unwrap().tag, tag("mode.single"));

        let events = s.drain_events();
        assert!(events.contains(&ModeEvent::AvailabilityChanged {
            tag: tag("mode.auto"),
            available: false
        }));
        assert!(events.contains(&ModeEvent::Changed {
            from: Some(tag("mode.auto")),
            to: tag("mode.single")
        }));
    }

    #[test]
    fn test_blocking_other_mode_keeps_index() {
        let mut s = selector();
        s.set_by_index(1);
        s.block(&tag("mode.auto"), true);
        assert_eq!(s.current_index(), 1);
        s.set_enabled(&tag("mode.single"), false).unwrap();
        assert_eq!(s.current_index(), 1);
    }

    #[test]
    fn test_all_unavailable_jams_then_recovers() {
        let mut s = selector();
        for t in ["mode.single", "mode.burst", "mode.auto"] {
            s.block(&tag(t), true);
        }
        assert!(s.current().is_none());
        assert!(!s.next());
        assert_eq!(s.available_count(), 0);

        s.block(&tag("mode.burst"), false);
        assert_eq!(s.current().unwrap().tag, tag("mode.burst"));
    }

    #[test]
    fn test_unknown_mode_enable() {
        let mut s = selector();
        assert_eq!(
            s.set_enabled(&tag("mode.nope"), false),
            Err(Error::UnknownMode(tag("mode.nope")))
        );
    }

    #[test]
    fn test_restore_index() {
        let mut s = selector();
        s.restore_index(2).unwrap();
        assert_eq!(s.current_index(), 2);
        assert!(matches!(
            s.restore_index(3),
            Err(Error::InvariantViolation(_))
        ));
        assert_eq!(s.current_index(), 2);
    }

    proptest! {
        #[test]
        fn prop_next_cycles_back(
            enabled in proptest::collection::vec(any::<bool>(), 1..8),
            blocked in proptest::collection::vec(any::<bool>(), 1..8),
        ) {
            let modes: Vec<_> = enabled
                .iter()
                .enumerate()
                .map(|(i, &on)| {
                    let mut m = FireModeRecord::new(format!("mode.{}", i), "");
                    m.enabled = on;
                    m
                })
                .collect();
            let mut s = ModeSelector::new(modes, None).unwrap();
            for (i, &b) in blocked.iter().enumerate().take(enabled.len()) {
                if b {
                    s.block(&ModeId::new(format!("mode.{}", i)), true);
                }
            }

            let n = s.available_count();
            prop_assume!(n > 0);
            let start = s.current().map(|m| m.tag.clone());
            prop_assert!(start.is_some());

            for _ in 0..n {
                s.next();
                let current = s.current().map(|m| m.tag.clone());
                prop_assert!(current.is_some());
                prop_assert!(!s.is_blocked(current.as_ref().unwrap()));
            }
            prop_assert_eq!(s.current().map(|m| m.tag.clone()), start);
        }
    }
}
