use anyhow::{bail, Context, Result};
use catalog_core::config::{AppConfig, MetadataMode};
use catalog_core::export::ExportOptions;
use catalog_core::models::ProjectRecord;
use catalog_core::prefs::Preferences;
use catalog_core::scanner::{self, CancelToken, ScanEvent, ScanOptions, ScanResult};
use catalog_core::workspace::resolve_project_dir;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use storage::{MetadataStore, ProjectMetadata};
use tracing::{info, warn};

/// Roots from the command line, else from the config file.
pub fn effective_roots(cli_roots: &[PathBuf], cfg: &AppConfig) -> Result<Vec<PathBuf>> {
    let roots = if cli_roots.is_empty() {
        cfg.roots()
    } else {
        cli_roots.to_vec()
    };
    if roots.is_empty() {
        bail!("no source roots given (pass them as arguments or set scan.roots)");
    }
    Ok(roots)
}

/// Routes Ctrl-C for the whole process. While a scan runs the first press
/// cancels it; any press with no scan running should end the process.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    active: Arc<Mutex<Option<CancelToken>>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancelToken>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `token` the one a Ctrl-C cancels.
    pub fn arm(&self, token: CancelToken) {
        *self.slot() = Some(token);
    }

    pub fn disarm(&self) {
        self.slot().take();
    }

    /// Handle one Ctrl-C. Returns false when nothing was cancelled and the
    /// caller should exit.
    pub fn signal(&self) -> bool {
        match self.slot().take() {
            Some(token) => {
                warn!("interrupted, stopping scan (press Ctrl-C again to quit)");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Listen for Ctrl-C for the rest of the process.
    pub fn install(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !interrupt.signal() {
                    std::process::exit(130);
                }
            }
        });
    }
}

/// Scan on a blocking worker, logging progress. Ctrl-C cancels and keeps
/// what was found so far.
pub async fn scan_roots(
    roots: Vec<PathBuf>,
    cfg: &AppConfig,
    interrupt: &Interrupt,
) -> Result<ScanResult> {
    let cancel = CancelToken::new();
    let (handle, mut rx) =
        scanner::scan_in_background(roots, ScanOptions::from(&cfg.scan), cancel.clone())?;
    interrupt.arm(cancel);

    while let Some(event) = rx.recv().await {
        match event {
            ScanEvent::RootStarted(root) => info!("scanning {}", root.display()),
            ScanEvent::RootSkipped(root) => warn!("skipped {}", root.display()),
            ScanEvent::Progress(p) => info!("progress {}%", p),
            ScanEvent::Finished {
                projects,
                files,
                cancelled,
            } => info!(
                "found {} projects in {} files{}",
                projects,
                files,
                if cancelled { " (cancelled)" } else { "" }
            ),
        }
    }
    let result = handle.await;
    interrupt.disarm();
    result.context("scan worker panicked")
}

pub fn find_project<'a>(result: &'a ScanResult, name: &str) -> Result<&'a ProjectRecord> {
    match result.get(name) {
        Some(record) => Ok(record),
        None => bail!(catalog_core::CatalogError::UnknownProject(name.to_string())),
    }
}

/// Folder handed to the metadata store: required in local mode, ignored in
/// centralized mode.
pub fn metadata_dir(cfg: &AppConfig, record: Option<&ProjectRecord>, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return Some(dir.to_path_buf());
    }
    match cfg.metadata.mode {
        MetadataMode::Local => record.map(resolve_project_dir),
        MetadataMode::Centralized => None,
    }
}

/// Replace tags, rating and notes. A project seen for the first time starts
/// from the store's default record, so local sidecars keep `name`, `styles`,
/// `bpm` and `versions`.
pub fn replace_metadata(
    store: &MetadataStore,
    project: &str,
    dir: Option<&Path>,
    tags: Vec<String>,
    rating: u8,
    notes: String,
) -> Result<ProjectMetadata> {
    let saved = store.update(project, dir, move |meta| {
        meta.set_tags(tags);
        meta.rating = rating;
        meta.notes = notes;
    })?;
    Ok(saved)
}

pub struct CopyFlags {
    pub keep_bak: bool,
    pub strip_dot_underscore: bool,
    pub rename: Option<String>,
    pub notes: Option<String>,
}

/// Command-line flags layered over the config file.
pub fn export_options(flags: CopyFlags, cfg: &AppConfig) -> ExportOptions {
    ExportOptions {
        keep_backups: flags.keep_bak || cfg.export.keep_backups,
        strip_dot_underscore: flags.strip_dot_underscore || cfg.export.strip_dot_underscore,
        rename: flags.rename.filter(|r| !r.trim().is_empty()),
        notes: flags.notes.filter(|n| !n.trim().is_empty()),
    }
}

/// Remember the choices of the last copy for next time.
pub fn remember_copy(prefs: &mut Preferences, options: &ExportOptions) {
    prefs.remove_dotunderscore = options.strip_dot_underscore;
    prefs.last_rename = options.rename.clone().unwrap_or_default();
    prefs.last_notes = options.notes.clone().unwrap_or_default();
}

pub fn destination(cli_dest: Option<PathBuf>, cfg: &AppConfig) -> Result<PathBuf> {
    cli_dest
        .or_else(|| cfg.export.destination.as_ref().map(PathBuf::from))
        .context("no destination given (pass --dest or set export.destination)")
}

/// DAW executable: flag, config, saved preference, then a probe of the usual
/// install locations.
pub fn daw_executable(cli_exe: Option<PathBuf>, cfg: &AppConfig, prefs: &Preferences) -> Option<PathBuf> {
    cli_exe
        .or_else(|| cfg.daw.executable.as_ref().map(PathBuf::from))
        .or_else(|| (!prefs.cubase_path.is_empty()).then(|| PathBuf::from(&prefs.cubase_path)))
        .or_else(catalog_core::launch::find_daw_executable)
}
