//! Walks source roots and groups every file into a project keyed by its
//! containing folder.
//!
//! Scans can run inline ([`scan`]) or on one blocking worker
//! ([`scan_in_background`]) that streams [`ScanEvent`]s. Either way a
//! [`CancelToken`] is honoured at directory boundaries: the entry in hand is
//! finished, then the walk stops and the partial result is returned with
//! `cancelled` set.

use crate::aggregator;
use crate::config::ProjectIdentity;
use crate::error::{CatalogError, Result};
use crate::models::{DirectoryEntry, FileEntry, FileKind, ProjectRecord, ProjectSummary};
use chrono::{DateTime, Local};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub exclude: Vec<String>,
    pub identity: ProjectIdentity,
}

impl From<&crate::config::ScanConfig> for ScanOptions {
    fn from(cfg: &crate::config::ScanConfig) -> Self {
        Self {
            exclude: cfg.exclude.clone(),
            identity: cfg.identity,
        }
    }
}

/// Cooperative cancellation flag shared between a scan and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    RootStarted(PathBuf),
    RootSkipped(PathBuf),
    /// Percentage of roots completed.
    Progress(u8),
    Finished {
        projects: usize,
        files: usize,
        cancelled: bool,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub projects: BTreeMap<String, ProjectRecord>,
    pub roots: Vec<PathBuf>,
    pub skipped_roots: Vec<PathBuf>,
    pub files_seen: usize,
    /// Entries that could not be read and were skipped.
    pub errors: usize,
    pub cancelled: bool,
}

impl ScanResult {
    pub fn get(&self, project: &str) -> Option<&ProjectRecord> {
        self.projects.get(project)
    }

    pub fn summaries(&self) -> Vec<ProjectSummary> {
        aggregator::summarize_all(self)
    }
}

pub struct Scanner {
    options: ScanOptions,
    excludes: GlobSet,
    result: ScanResult,
    /// Directories waiting for their parent project to show up.
    pending_dirs: BTreeMap<String, Vec<DirectoryEntry>>,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Result<Self> {
        let excludes = build_globset(&options.exclude)?;
        Ok(Self {
            options,
            excludes,
            result: ScanResult::default(),
            pending_dirs: BTreeMap::new(),
        })
    }

    /// Results so far. Directories are attached by [`Scanner::into_result`].
    pub fn result(&self) -> &ScanResult {
        &self.result
    }

    pub fn clear(&mut self) {
        self.result = ScanResult::default();
        self.pending_dirs.clear();
    }

    pub fn into_result(mut self) -> ScanResult {
        for (key, dirs) in std::mem::take(&mut self.pending_dirs) {
            if let Some(project) = self.result.projects.get_mut(&key) {
                project.directories.extend(dirs);
            }
        }
        self.result
    }

    /// Scan every root in order, reporting progress after each one.
    pub fn scan_roots<F>(&mut self, roots: &[PathBuf], cancel: &CancelToken, mut on_event: F)
    where
        F: FnMut(ScanEvent),
    {
        let total = roots.len().max(1);
        for (i, root) in roots.iter().enumerate() {
            if cancel.is_cancelled() {
                self.result.cancelled = true;
                break;
            }
            if root.is_dir() {
                on_event(ScanEvent::RootStarted(root.clone()));
            }
            if !self.scan_root(root, cancel) {
                on_event(ScanEvent::RootSkipped(root.clone()));
            }
            on_event(ScanEvent::Progress(((i + 1) * 100 / total) as u8));
        }
        on_event(ScanEvent::Finished {
            projects: self.result.projects.len(),
            files: self.result.files_seen,
            cancelled: self.result.cancelled,
        });
    }

    /// Walk one root. Returns false when the root does not exist (logged and
    /// skipped, never fatal).
    pub fn scan_root(&mut self, root: &Path, cancel: &CancelToken) -> bool {
        if !root.is_dir() {
            warn!("source directory {} does not exist, skipping", root.display());
            self.result.skipped_roots.push(root.to_path_buf());
            return false;
        }
        info!("scanning {}", root.display());
        self.result.roots.push(root.to_path_buf());
        let before = self.result.files_seen;

        let excludes = self.excludes.clone();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| !excludes.is_match(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!("skipping unreadable entry under {}: {}", root.display(), err);
                    self.result.errors += 1;
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_dir() {
                if cancel.is_cancelled() {
                    info!("scan cancelled at {}", path.display());
                    self.result.cancelled = true;
                    break;
                }
                self.record_directory(path, root);
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => self.record_file(path, &meta, root),
                Err(err) => {
                    warn!("cannot stat {}: {}", path.display(), err);
                    self.result.errors += 1;
                }
            }
        }

        debug!(
            "{}: {} files",
            root.display(),
            self.result.files_seen - before
        );
        true
    }

    fn project_key(&self, folder: &Path) -> String {
        match self.options.identity {
            ProjectIdentity::FolderName => folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| folder.to_string_lossy().into_owned()),
            ProjectIdentity::FolderPath => folder.to_string_lossy().into_owned(),
        }
    }

    fn record_file(&mut self, path: &Path, meta: &fs::Metadata, root: &Path) {
        let Some(folder) = path.parent() else {
            return;
        };
        let key = self.project_key(folder);
        let modified: DateTime<Local> = meta.modified().unwrap_or(UNIX_EPOCH).into();
        let created = meta.created().map(DateTime::<Local>::from).unwrap_or(modified);
        let entry = FileEntry {
            path: path.to_path_buf(),
            size: meta.len(),
            modified,
            created,
            source: root.to_path_buf(),
        };
        let kind = FileKind::of(path);
        self.result
            .projects
            .entry(key.clone())
            .or_insert_with(|| ProjectRecord::new(key, folder, root))
            .push(kind, entry);
        self.result.files_seen += 1;
    }

    fn record_directory(&mut self, path: &Path, root: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };
        let key = self.project_key(parent);
        self.pending_dirs.entry(key).or_default().push(DirectoryEntry {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source: root.to_path_buf(),
        });
    }
}

/// Scan `roots` on the calling thread.
pub fn scan<F>(
    roots: &[PathBuf],
    options: &ScanOptions,
    cancel: &CancelToken,
    on_event: F,
) -> Result<ScanResult>
where
    F: FnMut(ScanEvent),
{
    let mut scanner = Scanner::new(options.clone())?;
    scanner.scan_roots(roots, cancel, on_event);
    Ok(scanner.into_result())
}

/// Scan `roots` on a single blocking worker, streaming progress.
///
/// Exclude patterns are validated before the worker starts. Dropping the
/// receiver does not stop the scan; cancel the token for that.
pub fn scan_in_background(
    roots: Vec<PathBuf>,
    options: ScanOptions,
    cancel: CancelToken,
) -> Result<(JoinHandle<ScanResult>, mpsc::UnboundedReceiver<ScanEvent>)> {
    let mut scanner = Scanner::new(options)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = task::spawn_blocking(move || {
        scanner.scan_roots(&roots, &cancel, |event| {
            let _ = tx.send(event);
        });
        scanner.into_result()
    });
    Ok((handle, rx))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).map_err(|_| CatalogError::InvalidValue {
            key: "scan.exclude".into(),
            value: pat.clone(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| CatalogError::InvalidValue {
        key: "scan.exclude".into(),
        value: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectSource;

    const MB: u64 = 1024 * 1024;

    fn touch(path: &Path, size: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::File::create(path).unwrap().set_len(size).unwrap();
    }

    fn run(roots: &[PathBuf], options: &ScanOptions) -> ScanResult {
        scan(roots, options, &CancelToken::new(), |_| {}).unwrap()
    }

    #[test]
    fn groups_files_by_containing_folder() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("SongA/take1.cpr"), 2 * MB);
        touch(&src.join("SongA/take1.bak"), 2 * MB);
        touch(&src.join("SongA/mix.wav"), 10 * MB);

        let result = run(&[src.clone()], &ScanOptions::default());
        assert_eq!(result.projects.len(), 1);
        let song = result.get("SongA").unwrap();
        assert_eq!(song.cpr_files.len(), 1);
        assert_eq!(song.bak_files.len(), 1);
        assert_eq!(song.wav_files.len(), 1);
        assert_eq!(song.source, ProjectSource::Single(src.clone()));
        assert_eq!(song.project_dir, src.join("SongA"));
        assert_eq!(result.files_seen, 3);
    }

    #[test]
    fn every_file_lands_in_exactly_one_bucket() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        let names = [
            "P/a.cpr", "P/b.CPR", "P/c.bak", "P/d.Wav", "P/e.wav", "P/f.fxp", "P/g", "P/._h.wav",
            "P/Audio/i.wav", "Q/j.txt",
        ];
        for n in names {
            touch(&root.join(n), 1);
        }
        let result = run(&[root], &ScanOptions::default());
        let total: usize = result.projects.values().map(|p| p.file_count()).sum();
        assert_eq!(total, names.len());

        let p = result.get("P").unwrap();
        assert_eq!(p.cpr_files.len(), 2);
        assert_eq!(p.bak_files.len(), 1);
        assert_eq!(p.wav_files.len(), 3);
        assert_eq!(p.other_files.len(), 2);
        assert_eq!(result.get("Audio").unwrap().wav_files.len(), 1);
    }

    #[test]
    fn same_name_under_two_roots_is_multiple_sources_in_either_order() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        touch(&a.join("SongA/v1.cpr"), 10);
        touch(&b.join("SongA/v2.cpr"), 20);
        touch(&b.join("SongB/v1.cpr"), 5);

        for roots in [vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]] {
            let result = run(&roots, &ScanOptions::default());
            let song = result.get("SongA").unwrap();
            assert!(song.source.is_multiple());
            assert_eq!(song.cpr_files.len(), 2);
            assert!(song.has_ambiguous_identity());
            assert_eq!(
                result.get("SongB").unwrap().source,
                ProjectSource::Single(b.clone())
            );
        }
    }

    #[test]
    fn folder_path_identity_keeps_same_named_folders_apart() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        touch(&a.join("SongA/v1.cpr"), 10);
        touch(&b.join("SongA/v1.cpr"), 10);
        let options = ScanOptions {
            identity: ProjectIdentity::FolderPath,
            ..ScanOptions::default()
        };
        let result = run(&[a, b], &options);
        assert_eq!(result.projects.len(), 2);
        assert!(result.projects.values().all(|p| !p.source.is_multiple()));
    }

    #[test]
    fn missing_root_is_skipped_not_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let real = temp.path().join("real");
        touch(&real.join("SongA/a.cpr"), 1);
        let missing = temp.path().join("missing");

        let mut events = Vec::new();
        let result = scan(
            &[missing.clone(), real.clone()],
            &ScanOptions::default(),
            &CancelToken::new(),
            |e| events.push(e),
        )
        .unwrap();
        assert_eq!(result.skipped_roots, vec![missing.clone()]);
        assert_eq!(result.roots, vec![real.clone()]);
        assert_eq!(result.projects.len(), 1);
        assert_eq!(
            events,
            vec![
                ScanEvent::RootSkipped(missing),
                ScanEvent::Progress(50),
                ScanEvent::RootStarted(real),
                ScanEvent::Progress(100),
                ScanEvent::Finished {
                    projects: 1,
                    files: 1,
                    cancelled: false
                },
            ]
        );
    }

    #[test]
    fn rescanning_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        touch(&root.join("SongA/a.cpr"), 100);
        touch(&root.join("SongA/Audio/x.wav"), 300);
        touch(&root.join("SongB/b.cpr"), 7);

        let first = run(&[root.clone()], &ScanOptions::default()).summaries();
        let second = run(&[root], &ScanOptions::default()).summaries();
        assert_eq!(first, second);
    }

    #[test]
    fn directories_attach_to_projects_but_never_create_them() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("src");
        touch(&root.join("SongA/a.cpr"), 1);
        fs::create_dir_all(root.join("SongA/Edits")).unwrap();
        fs::create_dir_all(root.join("Empty/Nothing")).unwrap();

        let result = run(&[root], &ScanOptions::default());
        assert_eq!(result.projects.keys().collect::<Vec<_>>(), vec!["SongA"]);
        let dirs = &result.get("SongA").unwrap().directories;
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].name, "Edits");
    }

    #[test]
    fn exclude_globs_prune_the_walk() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        touch(&root.join("SongA/a.cpr"), 1);
        touch(&root.join("Trash/old.cpr"), 1);
        let options = ScanOptions {
            exclude: vec!["**/Trash".into()],
            ..ScanOptions::default()
        };
        let result = run(&[root], &options);
        assert!(result.get("Trash").is_none());
        assert!(result.get("SongA").is_some());
    }

    #[test]
    fn invalid_exclude_is_rejected_up_front() {
        let options = ScanOptions {
            exclude: vec!["a[".into()],
            ..ScanOptions::default()
        };
        assert!(Scanner::new(options).is_err());
    }

    #[test]
    fn cancelled_token_stops_before_first_root() {
        let temp = tempfile::tempdir().unwrap();
        touch(&temp.path().join("SongA/a.cpr"), 1);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = scan(
            &[temp.path().to_path_buf()],
            &ScanOptions::default(),
            &cancel,
            |_| {},
        )
        .unwrap();
        assert!(result.cancelled);
        assert!(result.projects.is_empty());
    }

    #[test]
    fn clear_resets_state() {
        let temp = tempfile::tempdir().unwrap();
        touch(&temp.path().join("SongA/a.cpr"), 1);
        let mut scanner = Scanner::new(ScanOptions::default()).unwrap();
        scanner.scan_root(temp.path(), &CancelToken::new());
        assert_eq!(scanner.result().projects.len(), 1);
        scanner.clear();
        assert!(scanner.result().projects.is_empty());
        assert_eq!(scanner.result().files_seen, 0);
    }
}
