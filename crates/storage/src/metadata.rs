use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Highest star rating a project can carry.
pub const MAX_RATING: u8 = 5;

/// Free-form metadata attached to a project.
///
/// `tags`, `rating`, `notes` and `last_modified` are the fixed part of the
/// schema. Any other key found in a metadata file (`name`, `styles`, `bpm`,
/// `versions`, ...) is kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_rating")]
    pub rating: u8,
    #[serde(default)]
    pub notes: String,
    #[serde(default, with = "crate::timestamp")]
    pub last_modified: Option<DateTime<Local>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectMetadata {
    /// Default record used by the per-folder layout.
    pub fn local_default(project_name: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("name".into(), Value::String(project_name.to_string()));
        extra.insert("styles".into(), Value::Array(Vec::new()));
        extra.insert("bpm".into(), Value::from(0));
        extra.insert("versions".into(), Value::Array(Vec::new()));
        Self {
            extra,
            ..Self::default()
        }
    }

    pub fn rating_is_valid(&self) -> bool {
        self.rating <= MAX_RATING
    }

    /// Replace the tag list, dropping blanks and duplicates but keeping order.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.clear();
        for tag in tags {
            self.add_tag(tag);
        }
    }

    /// Returns false when the tag was already present (or blank).
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into().trim().to_string();
        if tag.is_empty() || self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    /// Stamp `last_modified` with the current time, never moving it backwards.
    pub(crate) fn touch(&mut self) {
        let now = Local::now();
        let stamp = match self.last_modified {
            Some(prev) if prev >= now => prev + Duration::microseconds(1),
            _ => now,
        };
        self.last_modified = Some(stamp);
    }
}

/// Hand-edited files may carry `null`, negative, fractional or oversized
/// ratings. Those are rounded and clamped into `0..=MAX_RATING` so one bad
/// record never makes the whole file unreadable.
fn lenient_rating<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Some(rating) = value.as_u64().filter(|r| *r <= u64::from(MAX_RATING)) {
        return Ok(rating as u8);
    }
    let fixed = value
        .as_f64()
        .filter(|r| r.is_finite())
        .map(|r| r.round().clamp(0.0, f64::from(MAX_RATING)) as u8)
        .unwrap_or(0);
    warn!("unusable rating {} in metadata, reading it as {}", value, fixed);
    Ok(fixed)
}
