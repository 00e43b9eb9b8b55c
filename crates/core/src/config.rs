use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use storage::MetadataStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub daw: DawConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Roots scanned when none are given on the command line.
    #[serde(default)]
    pub roots: Vec<String>,
    /// Glob patterns pruned from the walk.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub identity: ProjectIdentity,
}

/// How files are grouped into projects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectIdentity {
    /// Key by the containing folder's name; same-named folders under
    /// different roots merge into one project.
    #[default]
    FolderName,
    /// Key by the containing folder's full path.
    FolderPath,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMode {
    #[default]
    Centralized,
    Local,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub mode: MetadataMode,
    /// Overrides the centralized file location.
    #[serde(default)]
    pub path: Option<String>,
}

impl MetadataConfig {
    pub fn store(&self) -> Result<MetadataStore, storage::StoreError> {
        match (self.mode, &self.path) {
            (MetadataMode::Local, _) => Ok(MetadataStore::local()),
            (MetadataMode::Centralized, Some(path)) => Ok(MetadataStore::centralized(path)),
            (MetadataMode::Centralized, None) => MetadataStore::centralized_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub keep_backups: bool,
    #[serde(default)]
    pub strip_dot_underscore: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DawConfig {
    /// DAW executable used to open project files; the platform opener
    /// handles them when unset.
    #[serde(default)]
    pub executable: Option<String>,
}

impl AppConfig {
    pub fn roots(&self) -> Vec<PathBuf> {
        self.scan.roots.iter().map(PathBuf::from).collect()
    }
}

/// Layered load: explicit file (or optional `config/default`), then
/// `CPR_CATALOG__SECTION__KEY` environment variables.
pub fn load(path: Option<&str>) -> crate::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("CPR_CATALOG")
            .prefix_separator("__")
            .separator("__"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("empty.toml");
        std::fs::write(&file, "").unwrap();
        let cfg = load(Some(file.to_str().unwrap())).unwrap();
        assert!(cfg.scan.roots.is_empty());
        assert_eq!(cfg.scan.identity, ProjectIdentity::FolderName);
        assert_eq!(cfg.metadata.mode, MetadataMode::Centralized);
        assert!(!cfg.export.strip_dot_underscore);
    }

    #[test]
    fn toml_sections_are_read() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("catalog.toml");
        std::fs::write(
            &file,
            r#"
[scan]
roots = ["/music/a", "/music/b"]
exclude = ["**/Mixdown/**"]
identity = "folder_path"

[metadata]
mode = "local"

[export]
destination = "/sorted"
keep_backups = true
strip_dot_underscore = true

[daw]
executable = "/Applications/Cubase 13.app"
"#,
        )
        .unwrap();
        let cfg = load(Some(file.to_str().unwrap())).unwrap();
        assert_eq!(cfg.roots().len(), 2);
        assert_eq!(cfg.scan.identity, ProjectIdentity::FolderPath);
        assert_eq!(cfg.metadata.mode, MetadataMode::Local);
        assert!(cfg.export.keep_backups);
        assert_eq!(cfg.export.destination.as_deref(), Some("/sorted"));
        assert!(cfg.daw.executable.is_some());
        assert_eq!(
            cfg.metadata.store().unwrap().mode(),
            &storage::StoreMode::Local
        );
    }
}
