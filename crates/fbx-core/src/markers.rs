//! Class and attribute names written into the host page.

/// Shared class carrying the film behavior's stylesheet rule.
pub const FILTERED_FILM: &str = "fbx-filtered-film";

/// Shared class carrying the review behavior's stylesheet rule.
pub const FILTERED_REVIEW: &str = "fbx-filtered-review";

/// Class on injected "Add to filter" / "Remove from filter" controls.
pub const TOGGLE_CONTROL: &str = "fbx-filter-toggle";

/// Id of the generated `<style>` element.
pub const STYLESHEET_ID: &str = "fbx-stylesheet";

/// Poster recovery attributes for the replace behavior.
pub const ORIGINAL_SRC: &str = "data-fbx-original-src";
pub const ORIGINAL_SRCSET: &str = "data-fbx-original-srcset";

/// Cached membership flag on toggle controls.
pub const TITLE_HIDDEN: &str = "data-title-hidden";

/// Mutually exclusive processed markers for one treatment domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    pub applied: &'static str,
    pub removed: &'static str,
}

pub const FILM_MARKERS: Markers = Markers {
    applied: "fbx-film-filter-applied",
    removed: "fbx-film-filter-removed",
};

pub const REVIEW_MARKERS: Markers = Markers {
    applied: "fbx-review-filter-applied",
    removed: "fbx-review-filter-removed",
};
