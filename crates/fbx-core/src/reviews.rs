//! Review filters
//!
//! Two kinds of work: rating, like and comment elements are hidden outright,
//! and whole reviews that are spoilers, unrated or too short receive the
//! shared review class (after an optional text replacement).

use log::{debug, trace};

use crate::dom::Dom;
use crate::markers::{FILTERED_REVIEW, REVIEW_MARKERS};
use crate::selector::{compile, Compound, Selector};
use crate::treatment::mark;
use crate::types::{BehaviorKind, ReviewFilterConfig};

/// Host-page selectors used by the review filters. A selector that failed to
/// compile is `None` and disables the filter depending on it.
#[derive(Debug, Clone)]
pub struct ReviewSelectors {
    pub review: Option<Selector>,
    pub body: Option<Selector>,
    pub spoiler: Option<Selector>,
    pub rating: Option<Selector>,
    pub hide_ratings: Option<Selector>,
    pub hide_likes: Option<Selector>,
    pub hide_comments: Option<Selector>,
}

impl Default for ReviewSelectors {
    fn default() -> Self {
        Self {
            review: compile("review", ".film-detail"),
            body: compile("review body", ".body-text"),
            spoiler: compile("review spoiler", ".contains-spoilers"),
            rating: compile("review rating", ".rating"),
            hide_ratings: compile("ratings", ".film-detail-content .rating"),
            hide_likes: compile("likes", ".film-detail-content .like-link-target"),
            hide_comments: compile("comments", ".film-detail-content .icon-comment"),
        }
    }
}

/// Hide review elements and filter reviews. Returns the number of elements
/// changed.
pub fn apply_review_filters<D: Dom>(
    dom: &D,
    selectors: &ReviewSelectors,
    config: &ReviewFilterConfig,
    behavior: &BehaviorKind,
) -> usize {
    let mut changed = 0;
    if config.hides_elements() {
        changed += hide_review_elements(dom, selectors, config);
    }
    if config.filters_reviews() {
        changed += filter_reviews(dom, selectors, config, behavior);
    }
    changed
}

fn hide_review_elements<D: Dom>(dom: &D, selectors: &ReviewSelectors, config: &ReviewFilterConfig) -> usize {
    let enabled = [
        (config.ratings, &selectors.hide_ratings),
        (config.likes, &selectors.hide_likes),
        (config.comments, &selectors.hide_comments),
    ];
    let Some(combined) = Selector::union(
        enabled
            .into_iter()
            .filter(|(on, _)| *on)
            .filter_map(|(_, selector)| selector.clone()),
    ) else {
        return 0;
    };

    let mut hidden = 0;
    for node in dom.query_all(&combined) {
        if dom.style_property(&node, "display").as_deref() != Some("none") {
            dom.set_style_property(&node, "display", "none");
            hidden += 1;
        }
    }
    hidden
}

fn filter_reviews<D: Dom>(
    dom: &D,
    selectors: &ReviewSelectors,
    config: &ReviewFilterConfig,
    behavior: &BehaviorKind,
) -> usize {
    let Some(review) = &selectors.review else {
        debug!("Review selector unavailable, skipping review filters");
        return 0;
    };
    let pending = review.excluding(&Compound::class(REVIEW_MARKERS.applied));

    let mut filtered = 0;
    for node in dom.query_all(&pending) {
        if !should_filter(dom, &node, selectors, config) {
            continue;
        }

        if let BehaviorKind::Replace { value } = behavior {
            match selectors.body.as_ref().and_then(|body| dom.query_first_within(&node, body)) {
                Some(body) => dom.set_text(&body, value),
                None => debug!("Review {:?} has no body to replace", node),
            }
        }
        dom.add_class(&node, FILTERED_REVIEW);
        mark(dom, &node, &REVIEW_MARKERS, true);
        filtered += 1;
    }

    if filtered > 0 {
        trace!("Filtered {} review(s)", filtered);
    }
    filtered
}

fn should_filter<D: Dom>(dom: &D, node: &D::Node, selectors: &ReviewSelectors, config: &ReviewFilterConfig) -> bool {
    let contains = |selector: &Option<Selector>| {
        selector
            .as_ref()
            .map(|selector| dom.matches(node, selector) || dom.query_first_within(node, selector).is_some())
    };

    if config.with_spoilers && contains(&selectors.spoiler) == Some(true) {
        return true;
    }
    if config.without_ratings && contains(&selectors.rating) == Some(false) {
        return true;
    }
    if config.by_word_count {
        let text = match selectors.body.as_ref().and_then(|body| dom.query_first_within(node, body)) {
            Some(body) => dom.text(&body),
            None => dom.text(node),
        };
        if word_count(&text) < config.minimum_word_count as usize {
            return true;
        }
    }
    false
}

/// Whitespace-separated token count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
