//! Settings draft
//!
//! The settings panel edits many values but persists them with a single
//! Save. [`SettingsDraft`] collects those edits, including films marked for
//! removal, and [`SettingsDraft::commit`] stages every write before one
//! `save()`.

use log::{error, info};

use crate::store::{keys, FilterStore, KeyValueStore};
use crate::types::{
    BehaviorConfig, FilmFilter, FilmFilterEntry, LogLevel, MutationLimits, ReviewFilterConfig,
    SectionFilterConfig,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDraft {
    film_removals: Vec<FilmFilterEntry>,
    review: Option<ReviewFilterConfig>,
    homepage: Option<SectionFilterConfig>,
    film_page: Option<SectionFilterConfig>,
    film_behavior: Option<BehaviorConfig>,
    review_behavior: Option<BehaviorConfig>,
    log_level: Option<LogLevel>,
    limits: Option<MutationLimits>,
}

/// What a commit wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub films_removed: usize,
    pub keys_written: usize,
    pub saved: bool,
}

impl SettingsDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the pending-removal mark on `entry`. Returns whether it is now marked.
    pub fn toggle_film_removal(&mut self, entry: &FilmFilterEntry) -> bool {
        match self.film_removals.iter().position(|marked| marked == entry) {
            Some(index) => {
                self.film_removals.remove(index);
                false
            }
            None => {
                self.film_removals.push(entry.clone());
                true
            }
        }
    }

    pub fn is_marked_for_removal(&self, entry: &FilmFilterEntry) -> bool {
        self.film_removals.contains(entry)
    }

    pub fn set_review_filter(&mut self, config: ReviewFilterConfig) {
        self.review = Some(config);
    }

    pub fn set_homepage_filter(&mut self, config: SectionFilterConfig) {
        self.homepage = Some(config);
    }

    pub fn set_film_page_filter(&mut self, config: SectionFilterConfig) {
        self.film_page = Some(config);
    }

    pub fn set_film_behavior(&mut self, config: BehaviorConfig) {
        self.film_behavior = Some(config);
    }

    pub fn set_review_behavior(&mut self, config: BehaviorConfig) {
        self.review_behavior = Some(config);
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.log_level = Some(level);
    }

    pub fn set_mutation_limits(&mut self, limits: MutationLimits) {
        self.limits = Some(limits);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Stage every pending write, then save once. The draft is consumed even
    /// if some writes fail; failures are logged by the store. Film removals
    /// are skipped when the film list cannot be read.
    pub fn commit<S: KeyValueStore>(self, store: &mut FilterStore<S>) -> CommitReport {
        let mut keys_written = 0;
        let mut films_removed = 0;

        if !self.film_removals.is_empty() {
            match store.try_film_filter() {
                Ok(before) => {
                    let kept: Vec<FilmFilterEntry> = before
                        .iter()
                        .filter(|entry| !self.film_removals.iter().any(|marked| same_film(marked, entry)))
                        .cloned()
                        .collect();
                    let removed = before.len() - kept.len();
                    if store.set_film_filter(&FilmFilter::new(kept)) {
                        films_removed = removed;
                        keys_written += 1;
                    }
                }
                Err(e) => error!("Film removals skipped, film list unreadable: {}", e),
            }
        }

        let mut count = |ok: bool| {
            if ok {
                keys_written += 1;
            }
        };
        if let Some(config) = &self.review {
            count(store.set_filter(keys::REVIEW_FILTER, config));
        }
        if let Some(config) = &self.homepage {
            count(store.set_filter(keys::HOMEPAGE_FILTER, config));
        }
        if let Some(config) = &self.film_page {
            count(store.set_filter(keys::FILM_PAGE_FILTER, config));
        }
        if let Some(config) = &self.film_behavior {
            count(store.set_behavior(&keys::FILM_BEHAVIOR, config));
        }
        if let Some(config) = &self.review_behavior {
            count(store.set_behavior(&keys::REVIEW_BEHAVIOR, config));
        }
        if let Some(level) = &self.log_level {
            count(store.set_filter(keys::LOG_LEVEL, level));
        }
        if let Some(limits) = &self.limits {
            count(store.set_filter(keys::MAX_IDLE_MUTATIONS, &limits.max_idle));
            count(store.set_filter(keys::MAX_ACTIVE_MUTATIONS, &limits.max_active));
        }

        let saved = store.save();
        info!("Saved settings: {} key(s), {} film(s) removed", keys_written, films_removed);

        CommitReport {
            films_removed,
            keys_written,
            saved,
        }
    }
}

/// Films with an id compare by id; broken entries compare structurally.
fn same_film(marked: &FilmFilterEntry, stored: &FilmFilterEntry) -> bool {
    match marked.id {
        Some(id) => stored.id == Some(id),
        None => marked == stored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::BehaviorType;
    use serde_json::json;

    fn store() -> FilterStore<MemoryStore> {
        FilterStore::new(MemoryStore::new().with_value(
            keys::FILM_FILTER,
            json!([
                { "id": 42, "slug": "up", "name": "Up", "year": "2009" },
                { "id": "oops", "slug": "" },
                { "id": 7, "slug": "alien", "name": "Alien", "year": "1979" }
            ]),
        ))
    }

    #[test]
    fn commit_saves_exactly_once() {
        let mut store = store();
        let mut draft = SettingsDraft::new();
        draft.set_review_filter(ReviewFilterConfig {
            with_spoilers: true,
            ..ReviewFilterConfig::default()
        });
        draft.set_film_behavior(BehaviorConfig {
            kind: BehaviorType::Blur,
            blur_amount: 5,
            ..BehaviorConfig::default()
        });
        draft.set_mutation_limits(MutationLimits {
            max_idle: 50,
            max_active: 500,
        });

        let report = draft.commit(&mut store);

        assert_eq!(
            report,
            CommitReport {
                films_removed: 0,
                keys_written: 4,
                saved: true
            }
        );
        assert_eq!(store.backend().save_count(), 1);
        assert!(!store.backend().has_staged_writes());
        assert!(store.review_filter().with_spoilers);
        assert_eq!(store.behavior(&keys::FILM_BEHAVIOR).kind, BehaviorType::Blur);
        assert_eq!(store.mutation_limits().max_idle, 50);
    }

    #[test]
    fn removes_marked_films_including_broken_ones() {
        let mut store = store();
        let films = store.film_filter();
        let broken = films.entries()[1].clone();
        assert!(broken.is_broken());

        let mut draft = SettingsDraft::new();
        assert!(draft.toggle_film_removal(&films.entries()[0]));
        assert!(draft.toggle_film_removal(&broken));
        assert!(draft.toggle_film_removal(&films.entries()[2]));
        // Unmarked again before saving.
        assert!(!draft.toggle_film_removal(&films.entries()[2]));
        assert!(!draft.is_marked_for_removal(&films.entries()[2]));

        let report = draft.commit(&mut store);

        assert_eq!(report.films_removed, 2);
        let remaining: Vec<Option<u64>> = store.film_filter().iter().map(|entry| entry.id).collect();
        assert_eq!(remaining, vec![Some(7)]);
    }

    #[test]
    fn removals_skip_an_unreadable_film_list() {
        let mut store = store();
        let before = store.backend().persisted(keys::FILM_FILTER);
        let up = store.film_filter().entries()[0].clone();

        let mut draft = SettingsDraft::new();
        draft.toggle_film_removal(&up);
        draft.set_log_level(LogLevel::Debug);
        store.backend().fail_next_get();

        let report = draft.commit(&mut store);

        assert_eq!(
            report,
            CommitReport {
                films_removed: 0,
                keys_written: 1,
                saved: true
            }
        );
        assert_eq!(store.backend().persisted(keys::FILM_FILTER), before);
        assert_eq!(store.log_level(), LogLevel::Debug);
    }

    #[test]
    fn failed_save_is_reported() {
        let mut store = store();
        let mut draft = SettingsDraft::new();
        draft.set_log_level(LogLevel::Debug);
        store.backend_mut().set_failing(true);

        let report = draft.commit(&mut store);

        assert!(!report.saved);
        assert_eq!(report.keys_written, 0);
    }

    #[test]
    fn empty_draft() {
        let mut draft = SettingsDraft::new();
        assert!(draft.is_empty());
        draft.set_log_level(LogLevel::Silent);
        assert!(!draft.is_empty());
    }
}
