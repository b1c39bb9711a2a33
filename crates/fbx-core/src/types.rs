//! Core type definitions for Filterboxd
//!
//! These types are the JSON values held by the Filter Store and the in-memory
//! forms the engine works with.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Label shown for a stored entry that lost its identity.
pub const BROKEN_ENTRY_LABEL: &str = "Broken, please remove";

// =============================================================================
// Film filter
// =============================================================================

/// One film to be suppressed or altered wherever it appears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilmFilterEntry {
    /// Site-internal film id. `None` when the stored value was missing or unparsable.
    #[serde(default, deserialize_with = "lenient_film_id")]
    pub id: Option<u64>,
    /// URL path segment, e.g. `up` in `/film/up/`.
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
}

impl FilmFilterEntry {
    pub fn new(id: u64, slug: &str, name: Option<&str>, year: Option<&str>) -> Self {
        Self {
            id: Some(id),
            slug: slug.to_string(),
            name: name.map(str::to_string),
            year: year.map(str::to_string),
        }
    }

    /// An entry that can no longer be matched or displayed.
    pub fn is_broken(&self) -> bool {
        self.id.is_none() || self.name.as_deref().map_or(true, |name| name.trim().is_empty())
    }

    /// Display label: `Name (Year)`, or the broken-entry label.
    pub fn label(&self) -> String {
        if self.is_broken() {
            return BROKEN_ENTRY_LABEL.to_string();
        }
        let name = self.name.as_deref().unwrap_or_default();
        match self.year.as_deref().filter(|year| !year.is_empty()) {
            Some(year) => format!("{name} ({year})"),
            None => name.to_string(),
        }
    }
}

/// Accept ids stored as JSON numbers or numeric strings; anything else is `None`.
fn lenient_film_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

/// Ordered list of filtered films, unique by id on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilmFilter {
    entries: Vec<FilmFilterEntry>,
}

impl FilmFilter {
    pub fn new(entries: Vec<FilmFilterEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[FilmFilterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|entry| entry.id == Some(id))
    }

    /// Append `entry` unless its id is already present. Returns whether it was added.
    pub fn insert(&mut self, entry: FilmFilterEntry) -> bool {
        match entry.id {
            Some(id) if self.contains(id) => false,
            _ => {
                self.entries.push(entry);
                true
            }
        }
    }

    /// Remove every entry with `id`. Returns whether anything was removed.
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != Some(id));
        self.entries.len() != before
    }

    /// Drop later duplicates of the same id, keeping first occurrences.
    /// Returns the number of entries removed.
    pub fn dedupe(&mut self) -> usize {
        let before = self.entries.len();
        let mut seen = std::collections::HashSet::new();
        self.entries
            .retain(|entry| entry.id.map_or(true, |id| seen.insert(id)));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilmFilterEntry> {
        self.entries.iter()
    }
}

// =============================================================================
// Review and section filters
// =============================================================================

/// Review filter toggles plus the word-count threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewFilterConfig {
    pub ratings: bool,
    pub likes: bool,
    pub comments: bool,
    pub by_word_count: bool,
    pub with_spoilers: bool,
    pub without_ratings: bool,
    pub minimum_word_count: u32,
}

impl Default for ReviewFilterConfig {
    fn default() -> Self {
        Self {
            ratings: false,
            likes: false,
            comments: false,
            by_word_count: false,
            with_spoilers: false,
            without_ratings: false,
            minimum_word_count: 10,
        }
    }
}

impl ReviewFilterConfig {
    /// Toggles that hide review elements outright.
    pub fn hides_elements(&self) -> bool {
        self.ratings || self.likes || self.comments
    }

    /// Toggles that filter whole reviews.
    pub fn filters_reviews(&self) -> bool {
        self.by_word_count || self.with_spoilers || self.without_ratings
    }
}

/// Section key to enabled flag, for one page kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionFilterConfig {
    sections: BTreeMap<String, bool>,
}

impl SectionFilterConfig {
    pub fn set(&mut self, key: &str, enabled: bool) {
        self.sections.insert(key.to_string(), enabled);
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.sections.get(key).copied().unwrap_or(false)
    }

    pub fn enabled_keys(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(key, _)| key.as_str())
    }
}

// =============================================================================
// Behavior
// =============================================================================

/// Stored behavior type. Film "Replace" swaps posters, review "Replace" swaps text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BehaviorType {
    Remove,
    #[default]
    Fade,
    Blur,
    #[serde(alias = "Replace poster", alias = "Replace text")]
    Replace,
    Custom,
}

/// Flat persisted behavior settings for one filter domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorConfig {
    pub kind: BehaviorType,
    pub fade_amount: i64,
    pub blur_amount: i64,
    pub replace_value: String,
    pub custom_css: String,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            kind: BehaviorType::Fade,
            fade_amount: 10,
            blur_amount: 3,
            replace_value: String::new(),
            custom_css: String::new(),
        }
    }
}

/// Validated visual treatment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BehaviorKind {
    Remove,
    /// Opacity percentage, 0-100.
    Fade { amount: u8 },
    /// Blur radius in pixels, at least 1.
    Blur { amount: u32 },
    /// Replacement poster URL (films) or body text (reviews).
    Replace { value: String },
    /// Arbitrary CSS declarations.
    Custom { css: String },
}

impl From<&BehaviorConfig> for BehaviorKind {
    fn from(config: &BehaviorConfig) -> Self {
        match config.kind {
            BehaviorType::Remove => Self::Remove,
            BehaviorType::Fade => Self::Fade {
                amount: config.fade_amount.clamp(0, 100) as u8,
            },
            BehaviorType::Blur => Self::Blur {
                amount: config.blur_amount.clamp(1, u32::MAX as i64) as u32,
            },
            BehaviorType::Replace => Self::Replace {
                value: config.replace_value.clone(),
            },
            BehaviorType::Custom => Self::Custom {
                css: config.custom_css.clone(),
            },
        }
    }
}

/// Behaviors for both filter domains, fixed for the page's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Behaviors {
    pub film: BehaviorKind,
    pub review: BehaviorKind,
}

impl Default for Behaviors {
    fn default() -> Self {
        let config = BehaviorConfig::default();
        Self {
            film: BehaviorKind::from(&config),
            review: BehaviorKind::from(&config),
        }
    }
}

// =============================================================================
// Log level and mutation ceilings
// =============================================================================

/// Persisted log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silent,
    #[default]
    Quiet,
    Info,
    Debug,
    Verbose,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Silent => log::LevelFilter::Off,
            Self::Quiet => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Verbose | Self::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Runaway-loop circuit breaker ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationLimits {
    pub max_idle: u64,
    pub max_active: u64,
}

impl Default for MutationLimits {
    fn default() -> Self {
        Self {
            max_idle: 10_000,
            max_active: 10_000,
        }
    }
}
