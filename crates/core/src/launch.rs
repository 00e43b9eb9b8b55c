//! Boundaries to the outside world: opening a project in the DAW and
//! previewing audio.

use crate::error::{CatalogError, Result};
use globset::Glob;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// An existing `.cpr` file.
pub fn validate_project_file(path: &Path) -> Result<()> {
    if !has_extension(path, "cpr") {
        return Err(CatalogError::InvalidFileType {
            path: path.to_path_buf(),
            expected: "cpr",
        });
    }
    if !path.is_file() {
        return Err(CatalogError::MissingFile(path.to_path_buf()));
    }
    Ok(())
}

/// An existing `.wav` file.
pub fn validate_playable(path: &Path) -> Result<()> {
    if !has_extension(path, "wav") {
        return Err(CatalogError::InvalidFileType {
            path: path.to_path_buf(),
            expected: "wav",
        });
    }
    if !path.is_file() {
        return Err(CatalogError::MissingFile(path.to_path_buf()));
    }
    Ok(())
}

pub trait DawLauncher {
    fn open(&self, executable: Option<&Path>, project: &Path) -> Result<()>;
}

/// Spawns the configured DAW, or hands the file to the platform opener.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

/// Program and arguments used to open `project`.
pub fn launch_command(executable: Option<&Path>, project: &Path) -> (OsString, Vec<OsString>) {
    let file = project.as_os_str().to_os_string();
    match executable.filter(|exe| exe.exists()) {
        Some(exe) if cfg!(target_os = "macos") && has_extension(exe, "app") => (
            "open".into(),
            vec!["-a".into(), exe.as_os_str().to_os_string(), file],
        ),
        Some(exe) => (exe.as_os_str().to_os_string(), vec![file]),
        None if cfg!(target_os = "macos") => ("open".into(), vec![file]),
        None if cfg!(windows) => (
            "cmd".into(),
            vec!["/C".into(), "start".into(), "".into(), file],
        ),
        None => ("xdg-open".into(), vec![file]),
    }
}

impl DawLauncher for SystemLauncher {
    fn open(&self, executable: Option<&Path>, project: &Path) -> Result<()> {
        validate_project_file(project)?;
        let (program, args) = launch_command(executable, project);
        debug!("spawning {:?} {:?}", program, args);
        Command::new(&program)
            .args(&args)
            .spawn()
            .map_err(|e| CatalogError::io(project, e))?;
        info!("opened {}", project.display());
        Ok(())
    }
}

/// Conventional Cubase install locations for this platform.
pub fn daw_search_locations() -> Vec<(PathBuf, &'static str, Option<&'static str>)> {
    if cfg!(windows) {
        ["ProgramFiles", "ProgramFiles(x86)"]
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .map(|base| (PathBuf::from(base).join("Steinberg"), "Cubase*", Some("Cubase.exe")))
            .collect()
    } else {
        vec![
            (PathBuf::from("/Applications"), "Cubase*.app", None),
            (PathBuf::from("/Applications/Steinberg"), "Cubase*.app", None),
        ]
    }
}

/// First install found, preferring the last name in sort order within each
/// location.
pub fn find_daw_executable() -> Option<PathBuf> {
    daw_search_locations()
        .into_iter()
        .find_map(|(base, pattern, inner)| probe(&base, pattern, inner))
}

fn probe(base: &Path, pattern: &str, inner: Option<&str>) -> Option<PathBuf> {
    let matcher = Glob::new(pattern).ok()?.compile_matcher();
    let mut hits: Vec<PathBuf> = fs::read_dir(base)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.file_name().map_or(false, |n| matcher.is_match(n)))
        .map(|p| match inner {
            Some(exe) => p.join(exe),
            None => p,
        })
        .filter(|p| p.exists())
        .collect();
    hits.sort();
    hits.pop()
}

/// Playback engine used for previews. Implemented by whatever front end
/// embeds the catalog.
pub trait AudioBackend {
    fn load(&mut self, path: &Path) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn seek(&mut self, position: Duration) -> Result<()>;
}

/// Validate and hand a WAV file to the backend.
pub fn load_preview(backend: &mut dyn AudioBackend, path: &Path) -> Result<()> {
    validate_playable(path)?;
    backend.load(path)
}
