//! Copy a scanned project into a clean folder laid out the way Cubase
//! expects.
//!
//! A failed copy of one file never aborts the export; it is logged and
//! listed in [`ExportReport::failures`]. Only a missing destination root or a
//! project folder that cannot be created fails the whole operation.

use crate::models::{FileKind, ProjectRecord};
use crate::workspace::copy_with_mtime;
use chrono::Local;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use storage::ProjectMetadata;
use tracing::{debug, info, warn};

pub const AUDIO_DIR: &str = "Audio";
pub const AUTO_SAVES_DIR: &str = "Auto Saves";
pub const PRESETS_DIR: &str = "Presets";
pub const PROJECT_SUBDIRS: [&str; 6] = [
    AUDIO_DIR,
    AUTO_SAVES_DIR,
    "Edits",
    "Images",
    PRESETS_DIR,
    "Track Pictures",
];
pub const NOTES_FILE: &str = "notes.txt";
pub const METADATA_SNAPSHOT: &str = "metadata.json";

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub keep_backups: bool,
    pub strip_dot_underscore: bool,
    /// Destination folder name; the project folder's name when unset or
    /// blank. Must be a single path component.
    pub rename: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopiedFile {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    pub success: bool,
    pub project_dir: PathBuf,
    pub copied: Vec<CopiedFile>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<CopyFailure>,
    pub notes_file: Option<PathBuf>,
    pub metadata_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExportReport {
    fn failed(project_dir: PathBuf, message: String) -> Self {
        warn!("{}", message);
        Self {
            success: false,
            project_dir,
            message: Some(message),
            ..Self::default()
        }
    }

    fn fail_copy(&mut self, path: &Path, error: impl ToString) {
        let error = error.to_string();
        warn!("could not copy {}: {}", path.display(), error);
        self.failures.push(CopyFailure {
            path: path.to_path_buf(),
            error,
        });
    }
}

/// Sub-folder (relative to the project folder) a file is copied into.
/// `None` means the file is left out.
pub fn route(kind: FileKind, path: &Path, options: &ExportOptions) -> Option<&'static str> {
    if options.strip_dot_underscore && crate::models::is_apple_double(path) {
        return None;
    }
    match kind {
        FileKind::Cpr => Some(""),
        FileKind::Bak if options.keep_backups => Some(AUTO_SAVES_DIR),
        FileKind::Bak => None,
        FileKind::Wav => Some(AUDIO_DIR),
        FileKind::Other => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase());
            match ext.as_deref() {
                Some("fxp") | Some("fxb") => Some(PRESETS_DIR),
                _ => Some(""),
            }
        }
    }
}

pub fn export_project(
    project: &ProjectRecord,
    destination: &Path,
    options: &ExportOptions,
    metadata: &ProjectMetadata,
) -> ExportReport {
    let folder_name = options
        .rename
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| Path::new(&project.name).file_name().and_then(|n| n.to_str()))
        .unwrap_or(project.name.as_str());
    if !is_single_component(folder_name) {
        return ExportReport::failed(
            destination.to_path_buf(),
            format!("invalid project folder name {:?}", folder_name),
        );
    }
    let project_dir = destination.join(folder_name);

    if !destination.is_dir() {
        return ExportReport::failed(
            project_dir,
            format!("destination {} does not exist", destination.display()),
        );
    }
    for sub in PROJECT_SUBDIRS {
        let dir = project_dir.join(sub);
        if let Err(e) = fs::create_dir_all(&dir) {
            return ExportReport::failed(
                project_dir,
                format!("cannot create {}: {}", dir.display(), e),
            );
        }
    }
    info!(
        "exporting {} to {}",
        project.name,
        project_dir.display()
    );

    let mut report = ExportReport {
        success: true,
        project_dir: project_dir.clone(),
        ..ExportReport::default()
    };

    let mut written = HashSet::new();
    for (kind, file) in project.files() {
        let Some(sub) = route(kind, &file.path, options) else {
            debug!("skipping {}", file.path.display());
            report.skipped.push(file.path.clone());
            continue;
        };
        let Some(name) = file.path.file_name() else {
            continue;
        };
        let target = unique_target(&project_dir.join(sub).join(name), &written);
        match copy_with_mtime(&file.path, &target) {
            Ok(_) => {
                written.insert(target.clone());
                debug!("copied {} -> {}", file.path.display(), target.display());
                report.copied.push(CopiedFile {
                    from: file.path.clone(),
                    to: target,
                });
            }
            Err(e) => report.fail_copy(&file.path, e),
        }
    }

    if let Some(notes) = options.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        let path = project_dir.join(NOTES_FILE);
        match fs::write(&path, render_notes(folder_name, notes)) {
            Ok(()) => report.notes_file = Some(path),
            Err(e) => report.fail_copy(&path, e),
        }
    }

    let snapshot = project_dir.join(METADATA_SNAPSHOT);
    let written = serde_json::to_string_pretty(metadata)
        .map_err(|e| e.to_string())
        .and_then(|json| fs::write(&snapshot, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => report.metadata_file = Some(snapshot),
        Err(e) => report.fail_copy(&snapshot, e),
    }

    info!(
        "exported {}: {} copied, {} skipped, {} failed",
        project.name,
        report.copied.len(),
        report.skipped.len(),
        report.failures.len()
    );
    report
}

fn render_notes(project: &str, notes: &str) -> String {
    let header = format!(
        "Notes for {} ({})",
        project,
        Local::now().format("%Y-%m-%d %H:%M")
    );
    let rule = "-".repeat(header.chars().count());
    format!("{}\n{}\n\n{}\n", header, rule, notes.trim_end())
}

/// Exactly one normal path component, e.g. `SongA` but not `/a/SongA`,
/// `..` or `a/b`.
fn is_single_component(name: &str) -> bool {
    let mut parts = Path::new(name).components();
    matches!(
        (parts.next(), parts.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// `name.ext`, or `name_1.ext`, `name_2.ext`, ... when this export already
/// wrote that path. Files left by an earlier export are overwritten.
fn unique_target(dest: &Path, written: &HashSet<PathBuf>) -> PathBuf {
    if !written.contains(dest) {
        return dest.to_path_buf();
    }
    let stem = dest
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    let ext = dest
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut counter = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{}_{}", stem, counter)
        } else {
            format!("{}_{}.{}", stem, counter, ext)
        };
        let candidate = parent.join(name);
        if !written.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
