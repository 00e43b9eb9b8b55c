use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Display/serialized form of [`ProjectSource::Multiple`].
pub const MULTIPLE_SOURCES: &str = "Multiple sources";

/// Bucket a file falls into, chosen from its lower-cased extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Cpr,
    Bak,
    Wav,
    Other,
}

impl FileKind {
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "cpr" => FileKind::Cpr,
            "bak" => FileKind::Bak,
            "wav" => FileKind::Wav,
            _ => FileKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Local>,
    pub created: DateTime<Local>,
    /// Scanned root this file was discovered under.
    pub source: PathBuf,
}

impl FileEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// macOS AppleDouble companion (`._name`).
    pub fn is_apple_double(&self) -> bool {
        is_apple_double(&self.path)
    }
}

pub fn is_apple_double(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("._"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub name: String,
    pub source: PathBuf,
}

/// Where a project was found: one scanned root, or more than one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectSource {
    Single(PathBuf),
    Multiple,
}

impl ProjectSource {
    pub fn is_multiple(&self) -> bool {
        matches!(self, ProjectSource::Multiple)
    }

    pub fn root(&self) -> Option<&Path> {
        match self {
            ProjectSource::Single(root) => Some(root),
            ProjectSource::Multiple => None,
        }
    }

    /// Fold in another root the project was seen under.
    pub fn merge(&mut self, root: &Path) {
        if let ProjectSource::Single(current) = self {
            if current != root {
                *self = ProjectSource::Multiple;
            }
        }
    }
}

impl fmt::Display for ProjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectSource::Single(root) => write!(f, "{}", root.display()),
            ProjectSource::Multiple => f.write_str(MULTIPLE_SOURCES),
        }
    }
}

impl Serialize for ProjectSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProjectSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw == MULTIPLE_SOURCES {
            ProjectSource::Multiple
        } else {
            ProjectSource::Single(PathBuf::from(raw))
        })
    }
}

/// Every file grouped under one project key during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    pub cpr_files: Vec<FileEntry>,
    pub bak_files: Vec<FileEntry>,
    pub wav_files: Vec<FileEntry>,
    pub other_files: Vec<FileEntry>,
    pub directories: Vec<DirectoryEntry>,
    pub source: ProjectSource,
    /// First folder seen for this key.
    pub project_dir: PathBuf,
    /// Every distinct folder merged under this key. More than one entry means
    /// unrelated folders share a name.
    pub project_dirs: Vec<PathBuf>,
}

impl ProjectRecord {
    pub fn new(name: impl Into<String>, project_dir: &Path, root: &Path) -> Self {
        Self {
            name: name.into(),
            cpr_files: Vec::new(),
            bak_files: Vec::new(),
            wav_files: Vec::new(),
            other_files: Vec::new(),
            directories: Vec::new(),
            source: ProjectSource::Single(root.to_path_buf()),
            project_dir: project_dir.to_path_buf(),
            project_dirs: vec![project_dir.to_path_buf()],
        }
    }

    pub fn push(&mut self, kind: FileKind, entry: FileEntry) {
        self.source.merge(&entry.source);
        if let Some(parent) = entry.path.parent() {
            if !self.project_dirs.iter().any(|d| d == parent) {
                self.project_dirs.push(parent.to_path_buf());
            }
        }
        self.bucket_mut(kind).push(entry);
    }

    pub fn bucket(&self, kind: FileKind) -> &[FileEntry] {
        match kind {
            FileKind::Cpr => &self.cpr_files,
            FileKind::Bak => &self.bak_files,
            FileKind::Wav => &self.wav_files,
            FileKind::Other => &self.other_files,
        }
    }

    fn bucket_mut(&mut self, kind: FileKind) -> &mut Vec<FileEntry> {
        match kind {
            FileKind::Cpr => &mut self.cpr_files,
            FileKind::Bak => &mut self.bak_files,
            FileKind::Wav => &mut self.wav_files,
            FileKind::Other => &mut self.other_files,
        }
    }

    /// All files with their bucket, CPR first.
    pub fn files(&self) -> impl Iterator<Item = (FileKind, &FileEntry)> {
        [FileKind::Cpr, FileKind::Bak, FileKind::Wav, FileKind::Other]
            .into_iter()
            .flat_map(move |kind| self.bucket(kind).iter().map(move |f| (kind, f)))
    }

    pub fn file_count(&self) -> usize {
        self.cpr_files.len() + self.bak_files.len() + self.wav_files.len() + self.other_files.len()
    }

    pub fn has_ambiguous_identity(&self) -> bool {
        self.project_dirs.len() > 1
    }
}

/// Per-project figures shown in listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    pub source: ProjectSource,
    pub project_dir: PathBuf,
    pub latest_cpr: Option<PathBuf>,
    pub latest_cpr_modified: Option<DateTime<Local>>,
    pub cpr_count: usize,
    pub bak_count: usize,
    pub wav_count: usize,
    pub other_count: usize,
    pub total_size: u64,
    pub total_size_mb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_uses_lowercased_extension() {
        assert_eq!(FileKind::of(Path::new("/a/Take1.CPR")), FileKind::Cpr);
        assert_eq!(FileKind::of(Path::new("/a/take1.Bak")), FileKind::Bak);
        assert_eq!(FileKind::of(Path::new("/a/mix.wav")), FileKind::Wav);
        assert_eq!(FileKind::of(Path::new("/a/mix.wave")), FileKind::Other);
        assert_eq!(FileKind::of(Path::new("/a/README")), FileKind::Other);
        assert_eq!(FileKind::of(Path::new("/a/.cpr")), FileKind::Other);
    }

    #[test]
    fn source_flips_to_multiple_on_second_root() {
        let mut source = ProjectSource::Single(PathBuf::from("/a"));
        source.merge(Path::new("/a"));
        assert_eq!(source, ProjectSource::Single(PathBuf::from("/a")));
        source.merge(Path::new("/b"));
        assert!(source.is_multiple());
        source.merge(Path::new("/a"));
        assert!(source.is_multiple());
        assert_eq!(source.to_string(), MULTIPLE_SOURCES);
    }

    #[test]
    fn source_serializes_as_string() {
        let json = serde_json::to_string(&ProjectSource::Multiple).unwrap();
        assert_eq!(json, "\"Multiple sources\"");
        let back: ProjectSource = serde_json::from_str("\"/music\"").unwrap();
        assert_eq!(back, ProjectSource::Single(PathBuf::from("/music")));
    }

    #[test]
    fn apple_double_detection() {
        assert!(is_apple_double(Path::new("/x/._mix.wav")));
        assert!(!is_apple_double(Path::new("/x/mix.wav")));
        assert!(!is_apple_double(Path::new("/x/.hidden")));
    }
}
