//! Storage layer: project metadata (tags, rating, notes) persisted as JSON.
//!
//! Two layouts, chosen when the store is built:
//! - centralized: one file under the user's preferences directory, keyed by
//!   project name, guarded by an advisory lock;
//! - local: a `metadata.json` inside each project folder.

mod lock;
mod metadata;
pub mod timestamp;

pub use lock::{lock_path_for, FileLock};
pub use metadata::{ProjectMetadata, MAX_RATING};

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Directory (under the home directory) holding preferences and metadata.
pub const PREFS_DIR_NAME: &str = ".trie_morceaux";
pub const CENTRAL_METADATA_FILE: &str = "projects_metadata.json";
pub const LOCAL_METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a project directory is required to store metadata for '{project}' in local mode")]
    ProjectDirRequired { project: String },
    #[error("project directory {dir} for '{project}' does not exist")]
    MissingProjectDir { project: String, dir: PathBuf },
    #[error("invalid rating {0}: must be between 0 and 5")]
    InvalidRating(u8),
    #[error("could not determine the home directory")]
    NoHomeDir,
    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed metadata in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    Centralized(PathBuf),
    Local,
}

/// `<home>/.trie_morceaux`
pub fn prefs_dir() -> Result<PathBuf, StoreError> {
    dirs::home_dir()
        .map(|home| home.join(PREFS_DIR_NAME))
        .ok_or(StoreError::NoHomeDir)
}

#[derive(Debug, Clone)]
pub struct MetadataStore {
    mode: StoreMode,
}

impl MetadataStore {
    pub fn centralized(file: impl Into<PathBuf>) -> Self {
        Self {
            mode: StoreMode::Centralized(file.into()),
        }
    }

    /// Centralized store at `<home>/.trie_morceaux/metadata/projects_metadata.json`.
    pub fn centralized_default() -> Result<Self, StoreError> {
        Ok(Self::centralized(
            prefs_dir()?.join("metadata").join(CENTRAL_METADATA_FILE),
        ))
    }

    pub fn local() -> Self {
        Self {
            mode: StoreMode::Local,
        }
    }

    pub fn mode(&self) -> &StoreMode {
        &self.mode
    }

    /// Read a project's metadata, creating and persisting the default record
    /// the first time a project is looked up.
    pub fn load(
        &self,
        project: &str,
        project_dir: Option<&Path>,
    ) -> Result<ProjectMetadata, StoreError> {
        match &self.mode {
            StoreMode::Centralized(file) => {
                let _guard = FileLock::acquire(file)?;
                let mut all = read_central(file)?;
                if let Some(existing) = all.get(project) {
                    return Ok(existing.clone());
                }
                let mut fresh = ProjectMetadata::default();
                fresh.touch();
                all.insert(project.to_string(), fresh.clone());
                write_json(file, &all)?;
                debug!("initialized metadata for {}", project);
                Ok(fresh)
            }
            StoreMode::Local => {
                let dir = require_dir(project, project_dir)?;
                let path = dir.join(LOCAL_METADATA_FILE);
                if let Some(existing) = read_local(&path)? {
                    return Ok(existing);
                }
                let mut fresh = ProjectMetadata::local_default(project);
                fresh.touch();
                write_json(&path, &fresh)?;
                debug!("initialized {}", path.display());
                Ok(fresh)
            }
        }
    }

    /// Persist the complete record, replacing whatever was stored before.
    ///
    /// Returns the record as written, with `last_modified` stamped.
    pub fn save(
        &self,
        project: &str,
        project_dir: Option<&Path>,
        metadata: ProjectMetadata,
    ) -> Result<ProjectMetadata, StoreError> {
        self.update(project, project_dir, move |current| *current = metadata)
    }

    /// Read-modify-write one record. The closure sees the stored record (or
    /// the default); the result is validated and stamped before writing.
    /// Nothing is written when validation fails.
    pub fn update<F>(
        &self,
        project: &str,
        project_dir: Option<&Path>,
        edit: F,
    ) -> Result<ProjectMetadata, StoreError>
    where
        F: FnOnce(&mut ProjectMetadata),
    {
        match &self.mode {
            StoreMode::Centralized(file) => {
                let _guard = FileLock::acquire(file)?;
                let mut all = read_central(file)?;
                let mut record = all.get(project).cloned().unwrap_or_default();
                edit(&mut record);
                validate(project, &record)?;
                record.touch();
                all.insert(project.to_string(), record.clone());
                write_json(file, &all)?;
                Ok(record)
            }
            StoreMode::Local => {
                let dir = require_dir(project, project_dir)?;
                let path = dir.join(LOCAL_METADATA_FILE);
                let mut record =
                    read_local(&path)?.unwrap_or_else(|| ProjectMetadata::local_default(project));
                edit(&mut record);
                validate(project, &record)?;
                record.touch();
                write_json(&path, &record)?;
                Ok(record)
            }
        }
    }

    pub fn set_tags(
        &self,
        project: &str,
        project_dir: Option<&Path>,
        tags: Vec<String>,
    ) -> Result<ProjectMetadata, StoreError> {
        self.update(project, project_dir, |m| m.set_tags(tags))
    }

    pub fn add_tag(
        &self,
        project: &str,
        project_dir: Option<&Path>,
        tag: &str,
    ) -> Result<ProjectMetadata, StoreError> {
        self.update(project, project_dir, |m| {
            m.add_tag(tag);
        })
    }

    pub fn remove_tag(
        &self,
        project: &str,
        project_dir: Option<&Path>,
        tag: &str,
    ) -> Result<ProjectMetadata, StoreError> {
        self.update(project, project_dir, |m| {
            m.remove_tag(tag);
        })
    }

    pub fn set_rating(
        &self,
        project: &str,
        project_dir: Option<&Path>,
        rating: u8,
    ) -> Result<ProjectMetadata, StoreError> {
        self.update(project, project_dir, |m| m.rating = rating)
    }

    pub fn set_notes(
        &self,
        project: &str,
        project_dir: Option<&Path>,
        notes: &str,
    ) -> Result<ProjectMetadata, StoreError> {
        self.update(project, project_dir, |m| m.notes = notes.to_string())
    }

    /// Read a record without creating a default. `None` when nothing is
    /// stored yet (or, in local mode, when no folder is given).
    pub fn peek(
        &self,
        project: &str,
        project_dir: Option<&Path>,
    ) -> Result<Option<ProjectMetadata>, StoreError> {
        match &self.mode {
            StoreMode::Centralized(file) => {
                let _guard = FileLock::acquire(file)?;
                Ok(read_central(file)?.remove(project))
            }
            StoreMode::Local => match project_dir {
                Some(dir) => read_local(&dir.join(LOCAL_METADATA_FILE)),
                None => Ok(None),
            },
        }
    }

    /// Every tag in use, sorted. Local mode only sees the folders passed in.
    pub fn all_tags(&self, project_dirs: &[PathBuf]) -> Result<Vec<String>, StoreError> {
        let mut tags = BTreeSet::new();
        match &self.mode {
            StoreMode::Centralized(file) => {
                let _guard = FileLock::acquire(file)?;
                for record in read_central(file)?.into_values() {
                    tags.extend(record.tags);
                }
            }
            StoreMode::Local => {
                for dir in project_dirs {
                    if let Some(record) = read_local(&dir.join(LOCAL_METADATA_FILE))? {
                        tags.extend(record.tags);
                    }
                }
            }
        }
        Ok(tags.into_iter().collect())
    }
}

fn validate(project: &str, record: &ProjectMetadata) -> Result<(), StoreError> {
    if record.rating_is_valid() {
        return Ok(());
    }
    warn!(
        "refusing to store rating {} for '{}': must be between 0 and {}",
        record.rating, project, MAX_RATING
    );
    Err(StoreError::InvalidRating(record.rating))
}

fn require_dir<'a>(project: &str, dir: Option<&'a Path>) -> Result<&'a Path, StoreError> {
    let dir = dir.ok_or_else(|| {
        warn!("no project directory given for '{}' in local mode", project);
        StoreError::ProjectDirRequired {
            project: project.to_string(),
        }
    })?;
    if !dir.is_dir() {
        warn!(
            "project directory {} for '{}' does not exist",
            dir.display(),
            project
        );
        return Err(StoreError::MissingProjectDir {
            project: project.to_string(),
            dir: dir.to_path_buf(),
        });
    }
    Ok(dir)
}

fn read_central(file: &Path) -> Result<BTreeMap<String, ProjectMetadata>, StoreError> {
    let raw = match fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: file.to_path_buf(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&raw).map_err(|source| StoreError::Json {
        path: file.to_path_buf(),
        source,
    })
}

/// An empty object counts as "nothing stored", like a missing file.
fn read_local(path: &Path) -> Result<Option<ProjectMetadata>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let json_err = |source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    };
    let value: Value = serde_json::from_str(&raw).map_err(json_err)?;
    if value.as_object().map_or(true, |o| o.is_empty()) {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some).map_err(json_err)
}

/// Write via a sibling temp file and rename.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| LOCAL_METADATA_FILE.into());
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
