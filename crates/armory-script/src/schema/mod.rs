//! Schema definitions for RON scripts

pub mod weapon;
