//! Application context
//!
//! Everything the engine's components share, built once at start-up and
//! passed by reference.

use crate::dom::Dom;
use crate::matcher::MatchRules;
use crate::reviews::ReviewSelectors;
use crate::sections::SectionTable;
use crate::store::{FilterStore, KeyValueStore};
use crate::toggle::ToggleSelectors;
use crate::types::Behaviors;

pub struct AppContext<D, S> {
    pub dom: D,
    pub store: FilterStore<S>,
    /// Read once at start-up; fixed for the page's lifetime.
    pub behaviors: Behaviors,
    pub rules: MatchRules,
    pub reviews: ReviewSelectors,
    pub sections: SectionTable,
    pub toggles: ToggleSelectors,
}

impl<D: Dom, S: KeyValueStore> AppContext<D, S> {
    /// Context with the default host-page tables and behaviors read from `store`.
    pub fn new(dom: D, store: FilterStore<S>) -> Self {
        let behaviors = store.behaviors();
        Self {
            dom,
            store,
            behaviors,
            rules: MatchRules::default(),
            reviews: ReviewSelectors::default(),
            sections: SectionTable::default(),
            toggles: ToggleSelectors::default(),
        }
    }

    pub fn with_rules(mut self, rules: MatchRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_behaviors(mut self, behaviors: Behaviors) -> Self {
        self.behaviors = behaviors;
        self
    }
}
