//! Filter Application Pass
//!
//! One pass reads the film list, review config and section configs from the
//! store once and applies them in a fixed order: films, reviews, sections.

use log::trace;

use crate::context::AppContext;
use crate::dom::Dom;
use crate::markers::FILM_MARKERS;
use crate::matcher::{match_film, Direction};
use crate::reviews::apply_review_filters;
use crate::sections::apply_section_filters;
use crate::store::KeyValueStore;
use crate::treatment::{apply_filter_to_film, remove_filter_from_film};
use crate::types::FilmFilterEntry;

/// Elements newly touched by one pass, per filter domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub films: usize,
    pub reviews: usize,
    pub sections: usize,
}

impl PassReport {
    /// Whether the pass changed the page at all.
    pub fn page_updated(&self) -> bool {
        self.films + self.reviews + self.sections > 0
    }

    pub fn total(&self) -> usize {
        self.films + self.reviews + self.sections
    }
}

/// Run one pass over the current document.
pub fn apply_filters<D: Dom, S: KeyValueStore>(ctx: &AppContext<D, S>) -> PassReport {
    let films = ctx.store.film_filter();
    let review_config = ctx.store.review_filter();
    let homepage = ctx.store.homepage_filter();
    let film_page = ctx.store.film_page_filter();

    let mut report = PassReport::default();

    for entry in films.iter() {
        report.films += apply_film(ctx, entry);
    }

    report.reviews = apply_review_filters(&ctx.dom, &ctx.reviews, &review_config, &ctx.behaviors.review);
    report.sections = apply_section_filters(&ctx.dom, &ctx.sections, &homepage, &film_page);

    trace!(
        "Pass finished: {} film, {} review, {} section element(s) updated",
        report.films,
        report.reviews,
        report.sections
    );
    report
}

/// Treat every unprocessed fragment of one film. Returns the number treated.
pub fn apply_film<D: Dom, S: KeyValueStore>(ctx: &AppContext<D, S>, entry: &FilmFilterEntry) -> usize {
    match_film(&ctx.dom, &ctx.rules, entry, &FILM_MARKERS, Direction::Apply)
        .iter()
        .filter(|m| apply_filter_to_film(&ctx.dom, &m.node, m.ancestor_offset, &ctx.behaviors.film))
        .count()
}

/// Reverse the treatment on every fragment of one film. Returns the number restored.
pub fn remove_film<D: Dom, S: KeyValueStore>(ctx: &AppContext<D, S>, entry: &FilmFilterEntry) -> usize {
    match_film(&ctx.dom, &ctx.rules, entry, &FILM_MARKERS, Direction::Remove)
        .iter()
        .filter(|m| remove_filter_from_film(&ctx.dom, &m.node, m.ancestor_offset))
        .count()
}
