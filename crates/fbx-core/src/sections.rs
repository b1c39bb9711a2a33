//! Section filters
//!
//! Homepage and film-page sections are hidden with an inline `display: none`.
//! They have no behavior and no shared class.

use std::collections::BTreeMap;

use log::warn;

use crate::dom::Dom;
use crate::selector::{compile, Selector};
use crate::types::SectionFilterConfig;

pub const HOMEPAGE_SECTIONS: &[(&str, &str)] = &[
    ("friendsHaveBeenWatching", "section#recent-from-friends"),
    ("popularWithFriends", "section#popular-with-friends"),
    ("popularReviewsWithFriends", "section#popular-reviews-with-friends"),
    ("newFromFriends", "section#new-from-friends"),
    ("popularLists", "section#popular-lists"),
    ("recentStories", "section#recent-stories"),
    ("latestNews", "section#latest-news"),
    ("proPromo", ".pro-message"),
];

pub const FILM_PAGE_SECTIONS: &[(&str, &str)] = &[
    ("backdropImage", "#backdrop"),
    ("castTab", r#"#tabbed-content [data-id="cast"], #tab-cast"#),
    ("crewTab", r#"#tabbed-content [data-id="crew"], #tab-crew"#),
    ("detailsTab", r#"#tabbed-content [data-id="details"], #tab-details"#),
    ("genresTab", r#"#tabbed-content [data-id="genres"], #tab-genres"#),
    ("releasesTab", r#"#tabbed-content [data-id="releases"], #tab-releases"#),
    ("whereToWatch", "section#watch"),
    ("ratingsHistogram", ".ratings-histogram-chart"),
    ("popularReviews", "section.film-recent-reviews"),
    ("similarFilms", "section#related"),
    ("popularLists", "section#film-popular-lists"),
];

/// Compiled section tables for both page kinds.
#[derive(Debug, Clone)]
pub struct SectionTable {
    homepage: BTreeMap<&'static str, Selector>,
    film_page: BTreeMap<&'static str, Selector>,
}

impl Default for SectionTable {
    fn default() -> Self {
        Self {
            homepage: compile_table(HOMEPAGE_SECTIONS),
            film_page: compile_table(FILM_PAGE_SECTIONS),
        }
    }
}

fn compile_table(entries: &[(&'static str, &str)]) -> BTreeMap<&'static str, Selector> {
    entries
        .iter()
        .filter_map(|(key, text)| compile(key, text).map(|selector| (*key, selector)))
        .collect()
}

impl SectionTable {
    pub fn homepage_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.homepage.keys().copied()
    }

    pub fn film_page_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.film_page.keys().copied()
    }

    /// One selector list covering every enabled section of both page kinds.
    pub fn combined(&self, homepage: &SectionFilterConfig, film_page: &SectionFilterConfig) -> Option<Selector> {
        let selected = select(&self.homepage, homepage, "homepage")
            .chain(select(&self.film_page, film_page, "film page"));
        Selector::union(selected)
    }
}

fn select<'a>(
    table: &'a BTreeMap<&'static str, Selector>,
    config: &'a SectionFilterConfig,
    page: &'a str,
) -> impl Iterator<Item = Selector> + 'a {
    config.enabled_keys().filter_map(move |key| match table.get(key) {
        Some(selector) => Some(selector.clone()),
        None => {
            warn!("Unknown {} section '{}'", page, key);
            None
        }
    })
}

/// Hide every enabled section. Returns the number of elements newly hidden.
pub fn apply_section_filters<D: Dom>(
    dom: &D,
    table: &SectionTable,
    homepage: &SectionFilterConfig,
    film_page: &SectionFilterConfig,
) -> usize {
    let Some(selector) = table.combined(homepage, film_page) else {
        return 0;
    };

    let mut hidden = 0;
    for node in dom.query_all(&selector) {
        if dom.style_property(&node, "display").as_deref() != Some("none") {
            dom.set_style_property(&node, "display", "none");
            hidden += 1;
        }
    }
    hidden
}
