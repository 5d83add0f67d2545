//! Armory Script - RON loader and weapon schema
//!
//! Loads weapon content from RON files:
//! - Magazine capacity, reserve and fire rate (with archetype fallbacks)
//! - Reload timings and the reload modifier
//! - Fire modes with their capabilities
//! - Mount profile and per-weapon attributes
//!
//! Definitions convert into `armory_core::HolderConfig` through
//! [`WeaponDef::to_holder_config`].

mod error;
mod loader;
mod schema;

pub use error::{Error, Result};
pub use loader::{Loader, WeaponDefs};
pub use schema::weapon::{FireModeDef, WeaponDef};
