//! Filter Store
//!
//! Typed, fail-soft access to persisted settings. Backends implement
//! [`KeyValueStore`] over raw JSON text; [`FilterStore`] wraps them with
//! JSON encoding, defaults, and error containment. Writes are not persisted
//! until [`FilterStore::save`] is called.

use std::cell::Cell;
use std::collections::HashMap;

use log::{error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::types::{
    BehaviorConfig, BehaviorKind, BehaviorType, Behaviors, FilmFilter, LogLevel, MutationLimits, ReviewFilterConfig,
    SectionFilterConfig,
};

/// Error type for storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage backend failure: {0}")]
    Backend(String),
    #[error("JSON error for '{key}': {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw persisted key-value storage holding JSON text.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stage a write. Not durable until [`KeyValueStore::save`].
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;

    /// Flush staged writes.
    fn save(&mut self) -> Result<(), StoreError>;
}

/// Stable persisted key names.
pub mod keys {
    pub const FILM_FILTER: &str = "filmFilter";
    pub const REVIEW_FILTER: &str = "reviewFilter";
    pub const HOMEPAGE_FILTER: &str = "homepageFilter";
    pub const FILM_PAGE_FILTER: &str = "filmPageFilter";
    pub const LOG_LEVEL: &str = "logLevel";
    pub const MAX_IDLE_MUTATIONS: &str = "maxIdleMutations";
    pub const MAX_ACTIVE_MUTATIONS: &str = "maxActiveMutations";

    /// Per-domain behavior keys.
    #[derive(Debug, Clone, Copy)]
    pub struct BehaviorKeys {
        pub kind: &'static str,
        pub fade_amount: &'static str,
        pub blur_amount: &'static str,
        pub replace_value: &'static str,
        pub custom_css: &'static str,
    }

    pub const FILM_BEHAVIOR: BehaviorKeys = BehaviorKeys {
        kind: "filmBehaviorType",
        fade_amount: "filmBehaviorFadeAmount",
        blur_amount: "filmBehaviorBlurAmount",
        replace_value: "filmBehaviorReplaceValue",
        custom_css: "filmBehaviorCustomValue",
    };

    pub const REVIEW_BEHAVIOR: BehaviorKeys = BehaviorKeys {
        kind: "reviewBehaviorType",
        fade_amount: "reviewBehaviorFadeAmount",
        blur_amount: "reviewBehaviorBlurAmount",
        replace_value: "reviewBehaviorReplaceValue",
        custom_css: "reviewBehaviorCustomValue",
    };
}

// =============================================================================
// FilterStore
// =============================================================================

/// Fail-soft typed adapter over a [`KeyValueStore`].
#[derive(Debug)]
pub struct FilterStore<S> {
    backend: S,
}

impl<S: KeyValueStore> FilterStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    /// Read a raw JSON value. Storage and decode failures are logged and yield `None`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let raw = match self.backend.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                error!("Failed to read '{}': {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(source) => {
                error!("{}", StoreError::Json { key: key.to_string(), source });
                None
            }
        }
    }

    /// Stage a raw JSON value. Returns `false` on failure, after logging it.
    pub fn set(&mut self, key: &str, value: &Value) -> bool {
        match self.backend.set(key, value.to_string()) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write '{}': {}", key, e);
                false
            }
        }
    }

    /// Flush staged writes. Returns `false` on failure, after logging it.
    pub fn save(&mut self) -> bool {
        match self.backend.save() {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to save settings: {}", e);
                false
            }
        }
    }

    /// Typed read. Values of the wrong shape are logged and treated as absent.
    pub fn get_filter<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(source) => {
                warn!("{}", StoreError::Json { key: key.to_string(), source });
                None
            }
        }
    }

    /// Typed read that reports storage failures instead of absorbing them.
    /// Values of the wrong shape are still logged and treated as absent.
    pub fn try_get_filter<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(typed) => Ok(Some(typed)),
            Err(source) => {
                warn!("{}", StoreError::Json { key: key.to_string(), source });
                Ok(None)
            }
        }
    }

    /// Typed write (staged).
    pub fn set_filter<T: Serialize>(&mut self, key: &str, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(json) => self.set(key, &json),
            Err(source) => {
                error!("{}", StoreError::Json { key: key.to_string(), source });
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Typed accessors with defaults
    // -------------------------------------------------------------------------

    pub fn film_filter(&self) -> FilmFilter {
        self.get_filter(keys::FILM_FILTER).unwrap_or_default()
    }

    /// Film list for a read-modify-write. Unlike [`FilterStore::film_filter`]
    /// an unreadable store is an error, so callers never write back an empty
    /// list over the saved one.
    pub fn try_film_filter(&self) -> Result<FilmFilter, StoreError> {
        Ok(self.try_get_filter(keys::FILM_FILTER)?.unwrap_or_default())
    }

    pub fn set_film_filter(&mut self, filter: &FilmFilter) -> bool {
        self.set_filter(keys::FILM_FILTER, filter)
    }

    pub fn review_filter(&self) -> ReviewFilterConfig {
        self.get_filter(keys::REVIEW_FILTER).unwrap_or_default()
    }

    pub fn homepage_filter(&self) -> SectionFilterConfig {
        self.get_filter(keys::HOMEPAGE_FILTER).unwrap_or_default()
    }

    pub fn film_page_filter(&self) -> SectionFilterConfig {
        self.get_filter(keys::FILM_PAGE_FILTER).unwrap_or_default()
    }

    pub fn behavior(&self, keys: &keys::BehaviorKeys) -> BehaviorConfig {
        let defaults = BehaviorConfig::default();
        BehaviorConfig {
            kind: self.get_filter::<BehaviorType>(keys.kind).unwrap_or(defaults.kind),
            fade_amount: self.get_filter(keys.fade_amount).unwrap_or(defaults.fade_amount),
            blur_amount: self.get_filter(keys.blur_amount).unwrap_or(defaults.blur_amount),
            replace_value: self.get_filter(keys.replace_value).unwrap_or(defaults.replace_value),
            custom_css: self.get_filter(keys.custom_css).unwrap_or(defaults.custom_css),
        }
    }

    pub fn set_behavior(&mut self, keys: &keys::BehaviorKeys, config: &BehaviorConfig) -> bool {
        // Every write is attempted even if an earlier one fails.
        let results = [
            self.set_filter(keys.kind, &config.kind),
            self.set_filter(keys.fade_amount, &config.fade_amount),
            self.set_filter(keys.blur_amount, &config.blur_amount),
            self.set_filter(keys.replace_value, &config.replace_value),
            self.set_filter(keys.custom_css, &config.custom_css),
        ];
        results.iter().all(|ok| *ok)
    }

    /// Validated behaviors for both filter domains.
    pub fn behaviors(&self) -> Behaviors {
        Behaviors {
            film: BehaviorKind::from(&self.behavior(&keys::FILM_BEHAVIOR)),
            review: BehaviorKind::from(&self.behavior(&keys::REVIEW_BEHAVIOR)),
        }
    }

    pub fn log_level(&self) -> LogLevel {
        self.get_filter(keys::LOG_LEVEL).unwrap_or_default()
    }

    pub fn mutation_limits(&self) -> MutationLimits {
        let defaults = MutationLimits::default();
        MutationLimits {
            max_idle: self.get_filter(keys::MAX_IDLE_MUTATIONS).unwrap_or(defaults.max_idle),
            max_active: self.get_filter(keys::MAX_ACTIVE_MUTATIONS).unwrap_or(defaults.max_active),
        }
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory backend with staged and persisted layers and failure injection.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    staged: HashMap<String, String>,
    persisted: HashMap<String, String>,
    failing: bool,
    fail_next_get: Cell<bool>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a persisted value directly.
    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.persisted.insert(key.to_string(), value.to_string());
        self
    }

    /// Make every operation fail until switched back.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Make only the next `get` fail.
    pub fn fail_next_get(&self) {
        self.fail_next_get.set(true);
    }

    /// Persisted (saved) JSON value for `key`.
    pub fn persisted(&self, key: &str) -> Option<Value> {
        self.persisted
            .get(key)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn has_staged_writes(&self) -> bool {
        !self.staged.is_empty()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing {
            Err(StoreError::Unavailable("memory store set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        if self.fail_next_get.replace(false) {
            return Err(StoreError::Backend(format!("read of '{}' failed", key)));
        }
        Ok(self
            .staged
            .get(key)
            .or_else(|| self.persisted.get(key))
            .cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.check()?;
        self.staged.insert(key.to_string(), value);
        Ok(())
    }

    fn save(&mut self) -> Result<(), StoreError> {
        self.check()?;
        self.persisted.extend(self.staged.drain());
        self.saves += 1;
        Ok(())
    }
}
