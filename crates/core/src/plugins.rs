//! Best-effort plugin detection in Cubase project files.
//!
//! This is a string search over the raw bytes against a list of known
//! plugin names. It knows nothing about the project file layout and can both
//! miss plugins and report false positives.

use crate::error::{CatalogError, Result};
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PLUGIN_LIST_FILE: &str = "vsti_list.json";

pub const BUILTIN_PLUGINS: &[&str] = &[
    // synths
    "Serum", "Spire", "Sylenth1", "Massive", "Massive X", "FM8", "Pigments", "Diva", "Zebra",
    "Omnisphere", "Nexus", "Vanguard", "Dune", "Avenger", "Phase Plant", "Vital", "Synth1",
    "Hive", "Repro",
    // samplers and instruments
    "Kontakt", "PLAY", "Halion", "Falcon", "Padshop", "SampleTank", "Iris", "Analog Lab",
    "LABS", "Spitfire", "Session Strings", "Addictive Drums", "Superior Drummer", "EZdrummer",
    "Battery", "Drumlab", "Abbey Road Drums",
    // drums
    "Kick 2", "Kick 3", "Punch", "Punchbox", "Drumbrute", "TR-8", "BFD",
    // hosts and hardware bridges
    "Komplete Kontrol", "Maschine", "V-Station", "MPC", "Reason Rack", "Arturia V", "CODEX",
    "HALion Sonic", "Keyscape",
    // Steinberg
    "REVerence", "Groove Agent", "Retrologue", "LoopMash", "Mystic", "Prologue", "Embracer",
    "Backbone", "VST Amp Rack",
    // effects
    "FabFilter", "Soundtoys", "Valhalla", "Serum FX", "OTT", "Soothe", "Pro-Q", "Pro-C",
    "Pro-L", "CLA-76", "Waves", "SSL", "Decapitator", "EchoBoy", "Saturn", "Pusher",
    "Sausage Fattener", "Ozone", "Neutron", "Nectar", "Trash", "Effectrix", "Glitch", "RX",
    "iZotope", "PingPongDelay", "Replika", "Compressor", "Squasher",
];

pub trait PluginDetector: Send + Sync {
    fn detect(&self, bytes: &[u8]) -> BTreeSet<String>;
}

struct KnownPlugin {
    name: String,
    /// `<name>` followed by whitespace and a two-digit instance number.
    instance: Regex,
    bare: Regex,
}

pub struct HeuristicDetector {
    known: Vec<KnownPlugin>,
    marker: Regex,
}

impl HeuristicDetector {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut known = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            let escaped = regex::escape(name);
            known.push(KnownPlugin {
                name: name.to_string(),
                instance: compile(&format!(r"(?-u){}\s+\d{{2}}", escaped))?,
                bare: compile(&format!("(?-u){}", escaped))?,
            });
        }
        Ok(Self {
            known,
            marker: compile(r"(?-u)Plugin\s+Nam[^\n\r]{2,40}")?,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(BUILTIN_PLUGINS)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(|k| k.name.as_str())
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| CatalogError::InvalidValue {
        key: "plugin pattern".into(),
        value: e.to_string(),
    })
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Occurrence not glued to other word characters on either side.
fn has_standalone_match(re: &Regex, bytes: &[u8]) -> bool {
    re.find_iter(bytes).any(|m| {
        let before = m.start().checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(m.end()).copied();
        !before.map_or(false, is_word_byte) && !after.map_or(false, is_word_byte)
    })
}

fn covered(found: &BTreeSet<String>, name: &str) -> bool {
    found.iter().any(|f| f.contains(name))
}

impl PluginDetector for HeuristicDetector {
    fn detect(&self, bytes: &[u8]) -> BTreeSet<String> {
        let mut found = BTreeSet::new();

        for plugin in &self.known {
            for m in plugin.instance.find_iter(bytes) {
                found.insert(String::from_utf8_lossy(m.as_bytes()).into_owned());
            }
        }

        for plugin in &self.known {
            if has_standalone_match(&plugin.bare, bytes) && !covered(&found, &plugin.name) {
                found.insert(plugin.name.clone());
            }
        }

        for m in self.marker.find_iter(bytes) {
            let text = String::from_utf8_lossy(m.as_bytes());
            for plugin in &self.known {
                if text.contains(plugin.name.as_str()) && !covered(&found, &plugin.name) {
                    found.insert(plugin.name.clone());
                }
            }
        }

        found
    }
}

/// Read a project file and run the detector over it.
pub fn detect_file(detector: &dyn PluginDetector, path: &Path) -> Result<BTreeSet<String>> {
    if !path.is_file() {
        return Err(CatalogError::MissingFile(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(|e| CatalogError::io(path, e))?;
    let found = detector.detect(&bytes);
    debug!("{}: {} plugins", path.display(), found.len());
    Ok(found)
}

/// User-maintained list of known plugin names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginList {
    names: Vec<String>,
}

impl Default for PluginList {
    fn default() -> Self {
        let mut list = Self { names: Vec::new() };
        for name in BUILTIN_PLUGINS {
            list.add(name);
        }
        list
    }
}

impl PluginList {
    pub fn default_path() -> Result<PathBuf> {
        Ok(storage::prefs_dir()?.join(PLUGIN_LIST_FILE))
    }

    /// The built-in list when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
        let list: Self = serde_json::from_str(&contents).map_err(|e| {
            warn!("malformed plugin list {}: {}", path.display(), e);
            e
        })?;
        Ok(list)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| CatalogError::io(path, e))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.names.len();
        self.names.retain(|n| n != name);
        self.names.len() != before
    }

    /// Rename in place, keeping the position. False when `old` is absent or
    /// `new` is already listed.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        let new = new.trim();
        if new.is_empty() || self.contains(new) {
            return false;
        }
        match self.names.iter_mut().find(|n| n.as_str() == old) {
            Some(slot) => {
                *slot = new.to_string();
                true
            }
            None => false,
        }
    }

    pub fn detector(&self) -> Result<HeuristicDetector> {
        HeuristicDetector::new(&self.names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(names: &[&str], blob: &[u8]) -> Vec<String> {
        HeuristicDetector::new(names)
            .unwrap()
            .detect(blob)
            .into_iter()
            .collect()
    }

    #[test]
    fn instance_numbers_are_kept() {
        let blob = b"\x00\x01Serum 01\x00junk\x00Serum  02\xff";
        assert_eq!(detect(&["Serum"], blob), ["Serum  02", "Serum 01"]);
    }

    #[test]
    fn bare_names_need_word_boundaries() {
        assert_eq!(detect(&["Diva"], b"\x00Diva\x00"), ["Diva"]);
        assert!(detect(&["Diva"], b"xDivax").is_empty());
        assert!(detect(&["RX"], b"PRX_1").is_empty());
        assert_eq!(detect(&["Pro-Q"], b"..Pro-Q.."), ["Pro-Q"]);
    }

    #[test]
    fn bare_name_skipped_when_instance_already_found() {
        let blob = b"\x00Kontakt 05\x00Kontakt\x00";
        assert_eq!(detect(&["Kontakt"], blob), ["Kontakt 05"]);
    }

    #[test]
    fn plugin_name_marker_maps_to_known_names() {
        let blob = b"\x00Plugin Name=Valhalla_Room\n";
        assert_eq!(detect(&["Valhalla"], blob), ["Valhalla"]);
        assert!(detect(&["Valhalla"], b"\x00Plugin Nam\n").is_empty());
    }

    #[test]
    fn substring_names_are_not_duplicated() {
        let blob = b"\x00Massive X\x00";
        let found = detect(&["Massive", "Massive X"], blob);
        assert!(found.contains(&"Massive X".to_string()));
        assert!(found.contains(&"Massive".to_string()));
        let blob = b"\x00Massive X 01\x00";
        assert_eq!(detect(&["Massive X", "Massive"], blob), ["Massive X 01"]);
    }

    #[test]
    fn builtin_list_is_deduplicated() {
        let list = PluginList::default();
        let unique: BTreeSet<_> = list.names().iter().collect();
        assert_eq!(unique.len(), list.names().len());
        assert!(list.contains("Addictive Drums"));
        assert!(HeuristicDetector::builtin().is_ok());
    }

    #[test]
    fn list_edits_persist() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("cfg").join(PLUGIN_LIST_FILE);
        let mut list = PluginList::load(&path).unwrap();
        assert!(list.contains("Serum"));
        assert!(list.add("Surge XT"));
        assert!(!list.add("Surge XT"));
        assert!(list.rename("Serum", "Serum 2"));
        assert!(!list.rename("Nope", "Other"));
        assert!(!list.rename("Diva", "Spire"));
        assert!(list.remove("Zebra"));
        assert!(!list.remove("Zebra"));
        list.save(&path).unwrap();

        let back = PluginList::load(&path).unwrap();
        assert_eq!(back, list);
        assert!(back.contains("Serum 2"));
        assert!(!back.contains("Serum"));
    }

    #[test]
    fn detect_file_reads_bytes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("song.cpr");
        fs::write(&path, b"\x00\x00Pigments\x00").unwrap();
        let detector = HeuristicDetector::builtin().unwrap();
        let found = detect_file(&detector, &path).unwrap();
        assert!(found.contains("Pigments"));
        assert!(detect_file(&detector, &temp.path().join("missing.cpr")).is_err());
    }
}
