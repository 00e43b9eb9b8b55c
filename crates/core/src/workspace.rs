//! Working on a single folder of projects: listing, file management and
//! per-project metadata stored next to the project.

use crate::error::{CatalogError, Result};
use crate::models::{ProjectRecord, ProjectSummary};
use crate::scanner::{self, CancelToken, ScanOptions, ScanResult};
use chrono::{DateTime, Local};
use filetime::FileTime;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use storage::{MetadataStore, ProjectMetadata};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub size_mb: f64,
    pub modified: DateTime<Local>,
    pub created: DateTime<Local>,
    pub is_dir: bool,
    /// Lower-cased with the leading dot; `None` for directories.
    pub extension: Option<String>,
}

pub fn file_info(path: &Path) -> Result<FileInfo> {
    let meta = fs::metadata(path).map_err(|e| CatalogError::io(path, e))?;
    let modified: DateTime<Local> = meta.modified().unwrap_or(UNIX_EPOCH).into();
    let created = meta.created().map(DateTime::<Local>::from).unwrap_or(modified);
    let extension = if meta.is_file() {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
    } else {
        None
    };
    Ok(FileInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        size: meta.len(),
        size_mb: crate::aggregator::size_mb(meta.len()),
        modified,
        created,
        is_dir: meta.is_dir(),
        extension,
    })
}

/// Folder contents, directories first, then by name.
pub fn list_dir(path: &Path) -> Result<Vec<FileInfo>> {
    if !path.is_dir() {
        return Err(CatalogError::MissingDirectory(path.to_path_buf()));
    }
    let mut items = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| CatalogError::io(path, e))? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping entry in {}: {}", path.display(), e);
                continue;
            }
        };
        match file_info(&entry.path()) {
            Ok(info) => items.push(info),
            Err(e) => warn!("{}", e),
        }
    }
    items.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(items)
}

pub fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| CatalogError::io(path, e))?;
    debug!("created {}", path.display());
    Ok(())
}

/// Create (or truncate) a file with the given text.
pub fn create_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| CatalogError::io(path, e))?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// Rename a file or folder. Never replaces an existing item.
pub fn rename_item(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(CatalogError::AlreadyExists(to.to_path_buf()));
    }
    if !from.exists() {
        return Err(CatalogError::MissingFile(from.to_path_buf()));
    }
    fs::rename(from, to).map_err(|e| CatalogError::io(from, e))?;
    info!("renamed {} -> {}", from.display(), to.display());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Permanent,
    /// Move to the OS trash / recycle bin.
    Trash,
}

pub fn delete_item(path: &Path, mode: DeleteMode) -> Result<()> {
    if !path.exists() {
        return Err(CatalogError::MissingFile(path.to_path_buf()));
    }
    match mode {
        DeleteMode::Trash => trash::delete(path)
            .map_err(|e| CatalogError::io(path, io::Error::new(io::ErrorKind::Other, e.to_string())))?,
        DeleteMode::Permanent if path.is_dir() => {
            fs::remove_dir_all(path).map_err(|e| CatalogError::io(path, e))?
        }
        DeleteMode::Permanent => fs::remove_file(path).map_err(|e| CatalogError::io(path, e))?,
    }
    info!("deleted {} ({:?})", path.display(), mode);
    Ok(())
}

/// Copy a file. A directory target receives the file under its own name.
pub fn copy_file(from: &Path, to: &Path) -> Result<PathBuf> {
    if !from.is_file() {
        return Err(CatalogError::MissingFile(from.to_path_buf()));
    }
    let target = into_dir(from, to);
    copy_with_mtime(from, &target).map_err(|e| CatalogError::io(&target, e))?;
    debug!("copied {} -> {}", from.display(), target.display());
    Ok(target)
}

/// Move a file, falling back to copy-then-delete across filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<PathBuf> {
    if !from.exists() {
        return Err(CatalogError::MissingFile(from.to_path_buf()));
    }
    let target = into_dir(from, to);
    if fs::rename(from, &target).is_err() {
        copy_with_mtime(from, &target).map_err(|e| CatalogError::io(&target, e))?;
        fs::remove_file(from).map_err(|e| CatalogError::io(from, e))?;
    }
    info!("moved {} -> {}", from.display(), target.display());
    Ok(target)
}

/// `fs::copy` that also carries the source modification time over.
pub fn copy_with_mtime(from: &Path, to: &Path) -> io::Result<u64> {
    let bytes = fs::copy(from, to)?;
    let meta = fs::metadata(from)?;
    filetime::set_file_mtime(to, FileTime::from_last_modification_time(&meta))?;
    Ok(bytes)
}

fn into_dir(from: &Path, to: &Path) -> PathBuf {
    match from.file_name() {
        Some(name) if to.is_dir() => to.join(name),
        _ => to.to_path_buf(),
    }
}

/// Folder a project's files live in: the recorded folder if it still
/// exists, else the folder of the first CPR that does, else the scan root.
pub fn resolve_project_dir(record: &ProjectRecord) -> PathBuf {
    if record.project_dir.is_dir() {
        return record.project_dir.clone();
    }
    record
        .cpr_files
        .iter()
        .filter(|f| f.path.exists())
        .find_map(|f| f.path.parent().map(Path::to_path_buf))
        .or_else(|| record.source.root().map(Path::to_path_buf))
        .unwrap_or_else(|| record.project_dir.clone())
}

/// One folder of projects with metadata kept beside each project.
pub struct Workspace {
    root: PathBuf,
    options: ScanOptions,
    result: ScanResult,
    store: MetadataStore,
}

impl Workspace {
    pub fn open(root: &Path, options: ScanOptions) -> Result<Self> {
        if !root.is_dir() {
            return Err(CatalogError::MissingDirectory(root.to_path_buf()));
        }
        let mut ws = Self {
            root: root.to_path_buf(),
            options,
            result: ScanResult::default(),
            store: MetadataStore::local(),
        };
        ws.refresh()?;
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescan after files changed on disk.
    pub fn refresh(&mut self) -> Result<()> {
        self.result = scanner::scan(
            std::slice::from_ref(&self.root),
            &self.options,
            &CancelToken::new(),
            |_| {},
        )?;
        info!(
            "workspace {}: {} projects",
            self.root.display(),
            self.result.projects.len()
        );
        Ok(())
    }

    pub fn projects(&self) -> Vec<ProjectSummary> {
        self.result.summaries()
    }

    pub fn project(&self, name: &str) -> Result<&ProjectRecord> {
        self.result
            .get(name)
            .ok_or_else(|| CatalogError::UnknownProject(name.to_string()))
    }

    pub fn metadata(&self, name: &str) -> Result<ProjectMetadata> {
        let dir = resolve_project_dir(self.project(name)?);
        Ok(self.store.load(name, Some(&dir))?)
    }

    pub fn save_metadata(&self, name: &str, metadata: ProjectMetadata) -> Result<ProjectMetadata> {
        let dir = resolve_project_dir(self.project(name)?);
        Ok(self.store.save(name, Some(&dir), metadata)?)
    }

    pub fn list(&self, relative: Option<&Path>) -> Result<Vec<FileInfo>> {
        match relative {
            Some(rel) => list_dir(&self.root.join(rel)),
            None => list_dir(&self.root),
        }
    }
}
