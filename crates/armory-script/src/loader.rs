//! RON weapon loader

use crate::error::{Error, Result};
use crate::schema::weapon::WeaponDef;
use armory_core::{HolderConfig, Tag};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

/// Loaded weapon definitions, in load order
#[derive(Debug, Default)]
pub struct WeaponDefs {
    pub weapons: IndexMap<Tag, WeaponDef>,
}

impl WeaponDefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a weapon definition
    pub fn get(&self, id: &Tag) -> Option<&WeaponDef> {
        self.weapons.get(id)
    }

    /// Build the holder config for a weapon
    pub fn holder_config(&self, id: &Tag) -> Result<HolderConfig> {
        self.get(id)
            .ok_or_else(|| Error::UnknownWeapon(id.to_string()))?
            .to_holder_config()
    }

    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }
}

/// Loader for RON weapon files
pub struct Loader {
    defs: WeaponDefs,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self {
            defs: WeaponDefs::new(),
        }
    }

    /// Load a single RON file (a `weapons: [...]` list or one definition)
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        if content.contains("weapons:") {
            self.load_str(&content)
        } else {
            self.load_single_definition(&content)
        }
    }

    /// Load weapons from a RON string
    pub fn load_str(&mut self, content: &str) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct WeaponFile {
            weapons: Vec<WeaponDef>,
        }

        let file: WeaponFile = ron::from_str(content)?;
        for weapon in file.weapons {
            self.insert(weapon)?;
        }
        Ok(())
    }

    fn load_single_definition(&mut self, content: &str) -> Result<()> {
        match ron::from_str::<WeaponDef>(content) {
            Ok(weapon) => self.insert(weapon),
            Err(err) => Err(Error::InvalidSchema(format!(
                "Could not parse as a weapon definition: {}",
                err
            ))),
        }
    }

    fn insert(&mut self, weapon: WeaponDef) -> Result<()> {
        let id = weapon.id.clone();
        if self.defs.weapons.contains_key(&id) {
            return Err(Error::DuplicateDefinition(id.to_string()));
        }
        tracing::debug!(%id, "loaded weapon definition");
        self.defs.weapons.insert(id, weapon);
        Ok(())
    }

    /// Load all RON files from a directory, recursively, in file-name order
    pub fn load_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {:?}", path),
            )));
        }

        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();

        for file_path in entries {
            if file_path.extension().map(|e| e == "ron").unwrap_or(false) {
                self.load_file(&file_path)?;
            } else if file_path.is_dir() {
                self.load_directory(&file_path)?;
            }
        }

        Ok(())
    }

    /// Finish loading and return the definitions
    pub fn finish(self) -> WeaponDefs {
        self.defs
    }

    /// Get the current definitions (for inspection during loading)
    pub fn defs(&self) -> &WeaponDefs {
        &self.defs
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
