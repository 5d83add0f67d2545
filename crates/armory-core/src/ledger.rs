//! Ammunition ledger: magazine plus reserve
//!
//! The ledger is the only place ammunition moves. It has no network
//! awareness; the host owns the canonical instance per holder and peers keep
//! a mirror that is overwritten through [`ResourceLedger::restore`].
//!
//! Every mutation pushes a [`LedgerEvent`] which the owner drains once per
//! update step.

use crate::config::ReloadTimings;
use crate::error::{Error, Result};
use crate::identity::ResourceKindId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Magazine and reserve counts for one holder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Rounds in the magazine
    pub loaded: f64,
    /// Rounds held in reserve
    pub reserve: f64,
    /// Ammunition kind
    pub kind: ResourceKindId,
}

impl ResourceState {
    pub fn new(loaded: f64, reserve: f64, kind: impl Into<ResourceKindId>) -> Self {
        Self {
            loaded,
            reserve,
            kind: kind.into(),
        }
    }
}

/// How a reload refills the magazine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReloadKind {
    /// Chamber still holds rounds; faster swap
    Tactical,
    /// Magazine was empty
    Full,
}

/// An in-progress reload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReloadState {
    pub kind: ReloadKind,
    /// True for tactical reloads (the magazine was not empty)
    pub is_partial: bool,
    pub started_at: Timestamp,
}

/// Notifications produced by ledger transactions
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    ResourceChanged {
        loaded: f64,
        reserve: f64,
        capacity: f64,
    },
    ReloadStarted {
        kind: ReloadKind,
        duration: f64,
    },
    ReloadCompleted {
        transferred: f64,
    },
    ReloadCancelled,
}

/// Per-holder ammunition ledger
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    state: ResourceState,
    capacity: f64,
    reserve_cap: f64,
    timings: ReloadTimings,
    reload: Option<ReloadState>,
    events: Vec<LedgerEvent>,
}

impl ResourceLedger {
    /// Create a ledger, validating the initial state against the capacity
    pub fn new(
        state: ResourceState,
        capacity: f64,
        reserve_cap: f64,
        timings: ReloadTimings,
    ) -> Result<Self> {
        check_state(&state, capacity)?;
        Ok(Self {
            state,
            capacity,
            reserve_cap,
            timings,
            reload: None,
            events: Vec::new(),
        })
    }

    /// Consume rounds from the magazine
    pub fn consume(&mut self, amount: f64) -> Result<()> {
        if amount.is_nan() || amount <= 0.0 {
            return Err(Error::InvalidAmount(amount));
        }
        if self.reload.is_some() {
            return Err(Error::AlreadyInProgress);
        }
        if self.state.loaded < amount {
            return Err(Error::InsufficientResource {
                requested: amount,
                loaded: self.state.loaded,
            });
        }

        self.state.loaded -= amount;
        tracing::trace!(
            amount,
            loaded = self.state.loaded,
            reserve = self.state.reserve,
            "consumed"
        );
        self.notify_changed();
        Ok(())
    }

    /// Add rounds to the reserve, clamped by the reserve cap
    ///
    /// Returns the amount actually added.
    pub fn replenish(&mut self, amount: f64) -> f64 {
        if amount.is_nan() || amount <= 0.0 {
            return 0.0;
        }

        let room = (self.reserve_cap - self.state.reserve).max(0.0);
        let added = amount.min(room);
        if added > 0.0 {
            self.state.reserve += added;
            tracing::debug!(added, reserve = self.state.reserve, "replenished reserve");
            self.notify_changed();
        }
        added
    }

    /// Begin a reload
    ///
    /// Fails when a reload is already running, or (unless forced) when the
    /// magazine is full or the reserve is empty.
    pub fn start_reload(&mut self, force: bool, now: Timestamp) -> Result<ReloadKind> {
        if self.reload.is_some() {
            return Err(Error::AlreadyInProgress);
        }
        if !force && (self.is_full() || self.state.reserve <= 0.0) {
            return Err(Error::NotNeeded);
        }

        let kind = if self.state.loaded > 0.0 {
            ReloadKind::Tactical
        } else {
            ReloadKind::Full
        };
        self.reload = Some(ReloadState {
            kind,
            is_partial: kind == ReloadKind::Tactical,
            started_at: now,
        });

        let duration = self.reload_duration(kind);
        tracing::info!(?kind, duration, "reload started");
        self.events.push(LedgerEvent::ReloadStarted { kind, duration });
        Ok(kind)
    }

    /// Finish the running reload, moving rounds from reserve into the magazine
    ///
    /// Returns the number of rounds transferred.
    pub fn complete_reload(&mut self) -> Result<f64> {
        if self.reload.is_none() {
            return Err(Error::NotReloading);
        }

        let needed = (self.capacity - self.state.loaded).max(0.0);
        let transfer = needed.min(self.state.reserve);
        if transfer >= needed {
            // Summing fractional rounds can land one ulp above capacity
            self.state.loaded = self.capacity;
        } else {
            self.state.loaded += transfer;
        }
        self.state.reserve -= transfer;
        self.reload = None;

        tracing::info!(
            transfer,
            loaded = self.state.loaded,
            capacity = self.capacity,
            "reload completed"
        );
        self.events.push(LedgerEvent::ReloadCompleted {
            transferred: transfer,
        });
        self.notify_changed();
        Ok(transfer)
    }

    /// Abort the running reload without moving ammunition
    ///
    /// Returns false when there was nothing to cancel.
    pub fn cancel_reload(&mut self) -> bool {
        if self.reload.take().is_none() {
            return false;
        }
        tracing::info!("reload cancelled");
        self.events.push(LedgerEvent::ReloadCancelled);
        true
    }

    /// Change the magazine capacity (e.g. after an equipment swap)
    ///
    /// Rounds above the new capacity are returned to the reserve.
    pub fn set_capacity(&mut self, capacity: f64) -> Result<()> {
        if capacity.is_nan() || capacity < 0.0 {
            return Err(Error::InvalidAmount(capacity));
        }

        self.capacity = capacity;
        if self.state.loaded > capacity {
            let excess = self.state.loaded - capacity;
            self.state.loaded = capacity;
            // Not clamped by the reserve cap: rounds are never discarded
            self.state.reserve += excess;
        }
        self.notify_changed();
        Ok(())
    }

    /// Overwrite the state with an authoritative value
    ///
    /// A state that breaks the ledger invariants aborts the write.
    pub fn restore(&mut self, state: ResourceState) -> Result<()> {
        if let Err(err) = check_state(&state, self.capacity) {
            tracing::warn!(%err, "refusing to restore resource state");
            return Err(err);
        }
        if state != self.state {
            self.state = state;
            self.notify_changed();
        }
        Ok(())
    }

    /// Overwrite the reload flag (peer mirrors follow the host's ruling)
    pub fn restore_reload(&mut self, reload: Option<ReloadState>) {
        self.reload = reload;
    }

    /// Seconds a reload of the given kind takes
    pub fn reload_duration(&self, kind: ReloadKind) -> f64 {
        let units = match kind {
            ReloadKind::Tactical => self.capacity - self.state.loaded,
            ReloadKind::Full => self.capacity,
        };
        self.timings.duration(kind, units.max(0.0))
    }

    /// Verify the ledger invariants
    pub fn check_invariants(&self) -> Result<()> {
        check_state(&self.state, self.capacity)
    }

    pub fn state(&self) -> &ResourceState {
        &self.state
    }

    pub fn loaded(&self) -> f64 {
        self.state.loaded
    }

    pub fn reserve(&self) -> f64 {
        self.state.reserve
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn reserve_cap(&self) -> f64 {
        self.reserve_cap
    }

    pub fn reload(&self) -> Option<&ReloadState> {
        self.reload.as_ref()
    }

    pub fn is_reloading(&self) -> bool {
        self.reload.is_some()
    }

    pub fn has_ammo(&self) -> bool {
        self.state.loaded > 0.0
    }

    pub fn is_full(&self) -> bool {
        self.state.loaded >= self.capacity
    }

    /// Whether a non-forced reload would be accepted
    pub fn can_reload(&self) -> bool {
        self.reload.is_none() && !self.is_full() && self.state.reserve > 0.0
    }

    /// Take all pending notifications
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    fn notify_changed(&mut self) {
        self.events.push(LedgerEvent::ResourceChanged {
            loaded: self.state.loaded,
            reserve: self.state.reserve,
            capacity: self.capacity,
        });
    }
}

fn check_state(state: &ResourceState, capacity: f64) -> Result<()> {
    if state.loaded.is_nan() || state.loaded < 0.0 {
        return Err(Error::InvariantViolation(format!(
            "loaded {} is negative",
            state.loaded
        )));
    }
    if state.reserve.is_nan() || state.reserve < 0.0 {
        return Err(Error::InvariantViolation(format!(
            "reserve {} is negative",
            state.reserve
        )));
    }
    if state.loaded > capacity {
        return Err(Error::InvariantViolation(format!(
            "loaded {} exceeds capacity {}",
            state.loaded, capacity
        )));
    }
    Ok(())
}
