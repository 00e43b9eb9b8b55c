//! User preferences persisted between runs.
//!
//! Lives at `<home>/.trie_morceaux/preferences.json`. Loaded once at startup
//! and passed to whatever needs it.

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PREFS_FILE: &str = "preferences.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub remove_dotunderscore: bool,
    #[serde(default)]
    pub last_rename: String,
    #[serde(default)]
    pub last_notes: String,
    #[serde(default)]
    pub cubase_path: String,
    #[serde(default)]
    pub last_workspace: String,
}

impl Preferences {
    pub fn default_path() -> Result<PathBuf> {
        Ok(storage::prefs_dir()?.join(PREFS_FILE))
    }

    /// Missing or unreadable file falls back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(prefs)) => {
                debug!("loaded preferences from {}", path.display());
                prefs
            }
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("using default preferences: {}", e);
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| CatalogError::io(path, e))?;
        debug!("saved preferences to {}", path.display());
        Ok(())
    }

    /// Set one field by its JSON name. Returns false for unknown keys.
    pub fn set(&mut self, key: &str, value: &str) -> Result<bool> {
        let flag = || -> Result<bool> {
            value
                .parse::<bool>()
                .map_err(|_| CatalogError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })
        };
        match key {
            "dark_mode" => self.dark_mode = flag()?,
            "remove_dotunderscore" => self.remove_dotunderscore = flag()?,
            "last_rename" => self.last_rename = value.to_string(),
            "last_notes" => self.last_notes = value.to_string(),
            "cubase_path" => self.cubase_path = value.to_string(),
            "last_workspace" => self.last_workspace = value.to_string(),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let prefs = Preferences::load_from(&temp.path().join(PREFS_FILE));
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn save_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join(PREFS_FILE);
        let mut prefs = Preferences::default();
        prefs.remove_dotunderscore = true;
        prefs.last_rename = "SongA_final".into();
        prefs.save_to(&path).unwrap();
        assert_eq!(Preferences::load_from(&path), prefs);
    }

    #[test]
    fn partial_and_malformed_files() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(PREFS_FILE);
        fs::write(&path, r#"{"dark_mode": true}"#).unwrap();
        let prefs = Preferences::load_from(&path);
        assert!(prefs.dark_mode);
        assert_eq!(prefs.cubase_path, "");

        fs::write(&path, "not json").unwrap();
        assert_eq!(Preferences::load_from(&path), Preferences::default());
    }

    #[test]
    fn set_by_key() {
        let mut prefs = Preferences::default();
        assert!(prefs.set("dark_mode", "true").unwrap());
        assert!(prefs.set("last_workspace", "/ws").unwrap());
        assert!(!prefs.set("volume", "11").unwrap());
        assert!(prefs.set("dark_mode", "maybe").is_err());
        assert!(prefs.dark_mode);
        assert_eq!(prefs.last_workspace, "/ws");
    }
}
