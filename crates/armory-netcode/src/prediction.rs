//! Peer-side prediction ledger
//!
//! Every optimistic action gets a correlation key, a captured baseline and a
//! speculative value that is applied immediately. Entries leave the ledger
//! when the host answers or when they time out:
//!
//! ```text
//!  predict ──▶ live ──┬── confirm(accepted) ──▶ settled on host value
//!                     ├── confirm(rejected) ──▶ reverted to host value
//!                     ├── expire_stale ───────▶ reverted to baseline
//!                     └── superseded ─────────▶ retired (baseline inherited)
//! ```
//!
//! At most one entry per `(ActionKind, Slot)` is live. Retired keys are
//! remembered so a late result is recognized and ignored instead of applied
//! twice.

use crate::config::PredictionConfig;
use crate::error::{Error, Result};
use crate::messages::CorrelationId;
use armory_core::{AttachmentRecord, Holder, ReloadState, ResourceState, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What kind of action a prediction stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Fire,
    Reload,
    SwitchMode,
    Attach,
}

/// Piece of local state a prediction writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Resource,
    FireMode,
    Attachment,
}

/// A full value for one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SlotValue {
    Resource {
        state: ResourceState,
        reload: Option<ReloadState>,
    },
    FireMode(usize),
    Attachment(Option<AttachmentRecord>),
}

impl SlotValue {
    pub fn slot(&self) -> Slot {
        match self {
            SlotValue::Resource { .. } => Slot::Resource,
            SlotValue::FireMode(_) => Slot::FireMode,
            SlotValue::Attachment(_) => Slot::Attachment,
        }
    }
}

/// Local state that predictions are applied to
pub trait PredictionTarget {
    /// Read the current value of a slot
    fn capture(&self, slot: Slot) -> SlotValue;

    /// Overwrite a slot
    fn apply(&mut self, value: &SlotValue) -> armory_core::Result<()>;
}

impl PredictionTarget for Holder {
    fn capture(&self, slot: Slot) -> SlotValue {
        match slot {
            Slot::Resource => SlotValue::Resource {
                state: self.ledger().state().clone(),
                reload: self.ledger().reload().copied(),
            },
            Slot::FireMode => SlotValue::FireMode(self.modes().current_index()),
            Slot::Attachment => SlotValue::Attachment(self.attachment().record().cloned()),
        }
    }

    fn apply(&mut self, value: &SlotValue) -> armory_core::Result<()> {
        match value {
            SlotValue::Resource { state, reload } => {
                self.ledger_mut().restore(state.clone())?;
                self.ledger_mut().restore_reload(*reload);
            }
            SlotValue::FireMode(index) => self.modes_mut().restore_index(*index)?,
            SlotValue::Attachment(record) => self.attachment_mut().apply_confirmed(record.clone()),
        }
        Ok(())
    }
}

/// One live prediction
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionEntry {
    pub key: CorrelationId,
    pub kind: ActionKind,
    pub speculative: SlotValue,
    /// Value to fall back to if the prediction is rolled back
    pub baseline: SlotValue,
    pub issued_at: Timestamp,
}

impl PredictionEntry {
    pub fn slot(&self) -> Slot {
        self.speculative.slot()
    }
}

/// How a confirmation was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Host accepted; local state settled on the host value
    Accepted,
    /// Host rejected; local state reverted
    RolledBack,
}

/// A prediction removed by timeout
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredPrediction {
    pub key: CorrelationId,
    pub kind: ActionKind,
    pub slot: Slot,
    /// Value restored
    pub restored: SlotValue,
}

/// Counters for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionStats {
    pub created: u64,
    pub confirmed: u64,
    pub rolled_back: u64,
    pub expired: u64,
    pub superseded: u64,
    pub late_results: u64,
}

/// Correlation-key registry for one holder's predictions
#[derive(Debug, Clone)]
pub struct PredictionLedger {
    config: PredictionConfig,
    /// Last issued key; 0 before the first prediction
    last_key: CorrelationId,
    /// Live entries, oldest first
    entries: VecDeque<PredictionEntry>,
    /// Keys that expired or were superseded
    retired: VecDeque<CorrelationId>,
    stats: PredictionStats,
}

impl PredictionLedger {
    pub fn new(config: PredictionConfig) -> Self {
        Self::resume(config, CorrelationId(0))
    }

    /// Create a ledger whose keys continue after `last_key`
    ///
    /// The host remembers processed ids per holder, so a re-created ledger
    /// must not hand out keys it has already seen.
    pub fn resume(config: PredictionConfig, last_key: CorrelationId) -> Self {
        Self {
            config,
            last_key,
            entries: VecDeque::new(),
            retired: VecDeque::new(),
            stats: PredictionStats::default(),
        }
    }

    /// Apply `value` optimistically and register it under a new key
    ///
    /// Supersedes a live entry with the same kind and slot (its baseline is
    /// inherited). When the outstanding bound is reached the oldest entry is
    /// expired first.
    pub fn predict<T: PredictionTarget + ?Sized>(
        &mut self,
        target: &mut T,
        kind: ActionKind,
        value: SlotValue,
        now: Timestamp,
    ) -> Result<CorrelationId> {
        let slot = value.slot();
        let superseded = self
            .entries
            .iter()
            .position(|e| e.kind == kind && e.slot() == slot);

        if superseded.is_none() && self.entries.len() >= self.config.max_outstanding {
            if let Some(oldest) = self.entries.pop_front() {
                tracing::warn!(key = %oldest.key, kind = ?oldest.kind, "prediction bound reached, expiring oldest");
                self.stats.expired += 1;
                self.retire(oldest.key);
                let oldest_slot = oldest.slot();
                self.revert(target, oldest_slot, oldest.baseline);
            }
        }

        // The bound check may have shifted positions
        let superseded = self
            .entries
            .iter()
            .position(|e| e.kind == kind && e.slot() == slot);
        let baseline = match superseded {
            Some(index) => self.entries[index].baseline.clone(),
            None => target.capture(slot),
        };

        target.apply(&value)?;

        if let Some(index) = superseded {
            if let Some(old) = self.entries.remove(index) {
                tracing::trace!(key = %old.key, "prediction superseded");
                self.stats.superseded += 1;
                self.retire(old.key);
            }
        }

        self.last_key = self.last_key.next();
        let key = self.last_key;
        self.entries.push_back(PredictionEntry {
            key,
            kind,
            speculative: value,
            baseline,
            issued_at: now,
        });
        self.stats.created += 1;
        Ok(key)
    }

    /// Resolve a prediction with the host's ruling
    ///
    /// A rejection restores `authoritative` (or the baseline when the host
    /// sent none). An acceptance settles on `authoritative` unless other
    /// predictions on the same slot are still live, in which case only their
    /// baselines move.
    pub fn confirm<T: PredictionTarget + ?Sized>(
        &mut self,
        target: &mut T,
        key: CorrelationId,
        accepted: bool,
        authoritative: Option<SlotValue>,
    ) -> Result<Confirmation> {
        let Some(index) = self.entries.iter().position(|e| e.key == key) else {
            if self.retired.contains(&key) {
                self.stats.late_results += 1;
                tracing::debug!(%key, accepted, "late result for retired prediction ignored");
                return Err(Error::PredictionExpired(key));
            }
            return Err(Error::UnknownCorrelationId(key));
        };

        let Some(entry) = self.entries.remove(index) else {
            return Err(Error::UnknownCorrelationId(key));
        };
        let slot = entry.slot();

        if accepted {
            self.stats.confirmed += 1;
            if let Some(value) = authoritative {
                self.rebase(target, value)?;
            }
            Ok(Confirmation::Accepted)
        } else {
            self.stats.rolled_back += 1;
            let value = authoritative.unwrap_or(entry.baseline);
            tracing::debug!(%key, kind = ?entry.kind, "prediction rolled back");
            self.revert(target, slot, value);
            Ok(Confirmation::RolledBack)
        }
    }

    /// Roll back every entry older than the timeout
    ///
    /// Calling this again with nothing stale is a no-op.
    pub fn expire_stale<T: PredictionTarget + ?Sized>(
        &mut self,
        target: &mut T,
        now: Timestamp,
    ) -> Vec<ExpiredPrediction> {
        let mut expired = Vec::new();
        while let Some(index) = self
            .entries
            .iter()
            .position(|e| now.since(e.issued_at) > self.config.timeout)
        {
            let Some(entry) = self.entries.remove(index) else {
                break;
            };
            let slot = entry.slot();
            tracing::debug!(key = %entry.key, kind = ?entry.kind, "prediction expired");
            self.stats.expired += 1;
            self.retire(entry.key);
            self.revert(target, slot, entry.baseline.clone());
            expired.push(ExpiredPrediction {
                key: entry.key,
                kind: entry.kind,
                slot,
                restored: entry.baseline,
            });
        }
        expired
    }

    /// Take an authoritative value pushed by the host
    ///
    /// With live entries on the slot their baselines are updated and the
    /// speculative view is kept; otherwise the value is applied. Returns
    /// whether local state was overwritten.
    pub fn rebase<T: PredictionTarget + ?Sized>(&mut self, target: &mut T, value: SlotValue) -> Result<bool> {
        let slot = value.slot();
        let mut live = false;
        for entry in self.entries.iter_mut().filter(|e| e.slot() == slot) {
            entry.baseline = value.clone();
            live = true;
        }
        if live {
            return Ok(false);
        }
        target.apply(&value)?;
        Ok(true)
    }

    /// Drop all live entries without touching local state (re-initialization)
    ///
    /// Keys keep increasing so results from before the reset stay recognizable.
    pub fn reset(&mut self) {
        let keys: Vec<_> = self.entries.drain(..).map(|e| e.key).collect();
        for key in keys {
            self.retire(key);
        }
    }

    pub fn get(&self, key: CorrelationId) -> Option<&PredictionEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PredictionEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recently issued key
    pub fn last_key(&self) -> CorrelationId {
        self.last_key
    }

    pub fn stats(&self) -> &PredictionStats {
        &self.stats
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Restore `value` on a slot, then re-apply the newest live entry there
    fn revert<T: PredictionTarget + ?Sized>(&mut self, target: &mut T, slot: Slot, value: SlotValue) {
        if let Err(err) = target.apply(&value) {
            tracing::warn!(%err, ?slot, "failed to restore slot");
        }
        for entry in self.entries.iter_mut().filter(|e| e.slot() == slot) {
            entry.baseline = value.clone();
        }
        if let Some(newest) = self.entries.iter().rev().find(|e| e.slot() == slot) {
            if let Err(err) = target.apply(&newest.speculative) {
                tracing::warn!(%err, key = %newest.key, "failed to re-apply live prediction");
            }
        }
    }

    fn retire(&mut self, key: CorrelationId) {
        self.retired.push_back(key);
        while self.retired.len() > self.config.retired_history {
            self.retired.pop_front();
        }
    }
}

impl Default for PredictionLedger {
    fn default() -> Self {
        Self::new(PredictionConfig::default())
    }
}
