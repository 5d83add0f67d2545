//! Identity types for holders and tags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a holder (the entity that owns a weapon instance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HolderId(pub u64);

impl HolderId {
    /// Create a new holder ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "holder:{}", self.0)
    }
}

/// A string tag naming a fire mode, resource kind, mount point or capability
///
/// Uses a string-based ID so definitions can reference it from RON files
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub String);

impl Tag {
    /// Create a new tag
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Fire mode tag (e.g. `mode.single`, `mode.burst`)
pub type ModeId = Tag;

/// Ammunition kind tag (e.g. `ammo.556`)
pub type ResourceKindId = Tag;

/// Named mount point on a holder's mount surface (e.g. `weapon_r`)
pub type MountPoint = Tag;

/// Reference to a capability or modifier understood by the effect engine
pub type CapabilityRef = Tag;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_id() {
        let id = HolderId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(format!("{}", id), "holder:42");
    }

    #[test]
    fn test_tag() {
        let tag = Tag::new("mode.auto");
        assert_eq!(tag.as_str(), "mode.auto");
        assert_eq!(format!("{}", tag), "mode.auto");
        assert_eq!(Tag::from("mode.auto"), tag);
    }

    #[test]
    fn test_tag_is_transparent_in_ron() {
        let tag: Tag = ron::from_str("\"weapon_r\"").unwrap();
        assert_eq!(tag.as_str(), "weapon_r");
    }
}
