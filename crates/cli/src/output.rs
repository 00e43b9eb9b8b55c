use catalog_core::models::{ProjectRecord, ProjectSummary};
use catalog_core::workspace::FileInfo;
use chrono::{DateTime, Local};
use serde_json::Value;
use std::collections::HashSet;
use storage::ProjectMetadata;

/// Keep only the requested keys of each JSON object (case-insensitive).
pub fn filter_fields(mut results: Vec<Value>, fields: &[String]) -> Vec<Value> {
    if fields.is_empty() {
        return results;
    }
    let want: HashSet<String> = fields.iter().map(|s| s.to_lowercase()).collect();
    for r in results.iter_mut() {
        if let Some(obj) = r.as_object_mut() {
            obj.retain(|k, _| want.contains(&k.to_lowercase()));
        }
    }
    results
}

fn date(value: Option<DateTime<Local>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn summary_table(summaries: &[ProjectSummary]) -> String {
    let width = summaries
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Project".len());
    let mut out = format!(
        "{:<width$}  {:<16}  {:>10}  {:>4}  {:>4}  {:>4}  {:>5}  {:>6}  {}\n",
        "Project", "Modified", "Size (MB)", "CPR", "BAK", "WAV", "Other", "Rating", "Source"
    );
    for s in summaries {
        let rating = s
            .rating
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<width$}  {:<16}  {:>10.2}  {:>4}  {:>4}  {:>4}  {:>5}  {:>6}  {}\n",
            s.name,
            date(s.latest_cpr_modified),
            s.total_size_mb,
            s.cpr_count,
            s.bak_count,
            s.wav_count,
            s.other_count,
            rating,
            s.source
        ));
    }
    out
}

pub fn project_details(
    record: &ProjectRecord,
    summary: &ProjectSummary,
    metadata: Option<&ProjectMetadata>,
) -> String {
    let mut out = format!("{}\n", record.name);
    out.push_str(&format!("  source:      {}\n", record.source));
    out.push_str(&format!("  folder:      {}\n", record.project_dir.display()));
    if record.has_ambiguous_identity() {
        out.push_str("  also merged:\n");
        for dir in record.project_dirs.iter().skip(1) {
            out.push_str(&format!("    {}\n", dir.display()));
        }
    }
    if let Some(latest) = &summary.latest_cpr {
        out.push_str(&format!(
            "  latest cpr:  {} ({})\n",
            latest.display(),
            date(summary.latest_cpr_modified)
        ));
    }
    out.push_str(&format!("  total size:  {:.2} MB\n", summary.total_size_mb));
    for (kind, file) in record.files() {
        out.push_str(&format!(
            "  [{:?}] {}  {} bytes  {}\n",
            kind,
            file.path.display(),
            file.size,
            date(Some(file.modified))
        ));
    }
    for dir in &record.directories {
        out.push_str(&format!("  [dir] {}\n", dir.path.display()));
    }
    if let Some(meta) = metadata {
        out.push_str(&metadata_text(meta));
    }
    out
}

pub fn metadata_text(meta: &ProjectMetadata) -> String {
    let mut out = format!("  rating:      {}/5\n", meta.rating);
    out.push_str(&format!("  tags:        {}\n", meta.tags.join(", ")));
    if !meta.notes.is_empty() {
        out.push_str(&format!("  notes:       {}\n", meta.notes));
    }
    out.push_str(&format!("  modified:    {}\n", date(meta.last_modified)));
    out
}

pub fn listing(items: &[FileInfo]) -> String {
    items
        .iter()
        .map(|i| {
            if i.is_dir {
                format!("{}/\n", i.name)
            } else {
                format!("{:<40} {:>10.2} MB  {}\n", i.name, i.size_mb, date(Some(i.modified)))
            }
        })
        .collect()
}
