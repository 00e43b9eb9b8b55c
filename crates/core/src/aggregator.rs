use crate::models::{FileEntry, ProjectRecord, ProjectSummary};
use crate::scanner::ScanResult;
use serde::{Deserialize, Serialize};
use storage::MetadataStore;
use tracing::warn;

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Megabytes rounded to two decimals.
pub fn size_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

/// Most recently modified CPR; the earlier entry wins a tie.
pub fn latest_cpr(record: &ProjectRecord) -> Option<&FileEntry> {
    record.cpr_files.iter().fold(None, |best, f| match best {
        Some(b) if b.modified >= f.modified => Some(b),
        _ => Some(f),
    })
}

pub fn summarize(record: &ProjectRecord) -> ProjectSummary {
    let total_size: u64 = record.files().map(|(_, f)| f.size).sum();
    let latest = latest_cpr(record);
    ProjectSummary {
        name: record.name.clone(),
        source: record.source.clone(),
        project_dir: record.project_dir.clone(),
        latest_cpr: latest.map(|f| f.path.clone()),
        latest_cpr_modified: latest.map(|f| f.modified),
        cpr_count: record.cpr_files.len(),
        bak_count: record.bak_files.len(),
        wav_count: record.wav_files.len(),
        other_count: record.other_files.len(),
        total_size,
        total_size_mb: size_mb(total_size),
        rating: None,
    }
}

/// One summary per project, ordered by name.
pub fn summarize_all(result: &ScanResult) -> Vec<ProjectSummary> {
    result.projects.values().map(summarize).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    /// Modification time of the latest CPR.
    Date,
    Size,
    /// Joined rating; unrated projects sort lowest.
    Rating,
}

/// Case-insensitive substring match on the project name. An empty needle
/// keeps everything.
pub fn filter_by_name(summaries: Vec<ProjectSummary>, needle: &str) -> Vec<ProjectSummary> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return summaries;
    }
    summaries
        .into_iter()
        .filter(|s| s.name.to_lowercase().contains(&needle))
        .collect()
}

pub fn sort_summaries(summaries: &mut [ProjectSummary], key: SortKey, descending: bool) {
    summaries.sort_by(|a, b| {
        let ord = match key {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Date => a.latest_cpr_modified.cmp(&b.latest_cpr_modified),
            SortKey::Size => a.total_size.cmp(&b.total_size),
            SortKey::Rating => a.rating.cmp(&b.rating),
        }
        .then_with(|| a.name.cmp(&b.name));
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

/// Fill in stored ratings. Projects without a record (or whose record can't
/// be read) keep `None`; nothing is created.
pub fn with_ratings(summaries: &mut [ProjectSummary], store: &MetadataStore) {
    for summary in summaries.iter_mut() {
        match store.peek(&summary.name, Some(&summary.project_dir)) {
            Ok(record) => summary.rating = record.map(|m| m.rating),
            Err(e) => warn!("no rating for {}: {}", summary.name, e),
        }
    }
}
