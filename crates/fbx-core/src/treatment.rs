//! Treatment Applier
//!
//! Applies or reverses the film behavior on one matched node. Class-based
//! behaviors toggle [`FILTERED_FILM`] on the ancestor `ancestor_offset` parents
//! up; the replace behavior swaps the poster image source and keeps the
//! original in recovery attributes.

use log::debug;

use crate::dom::{ancestor_at, Dom};
use crate::markers::{Markers, FILM_MARKERS, FILTERED_FILM, ORIGINAL_SRC, ORIGINAL_SRCSET};
use crate::selector::{Complex, Compound, Selector};
use crate::types::BehaviorKind;

/// Apply `behavior` to the film fragment at `node`.
pub fn apply_filter_to_film<D: Dom>(
    dom: &D,
    node: &D::Node,
    ancestor_offset: usize,
    behavior: &BehaviorKind,
) -> bool {
    let target = ancestor_at(dom, node, ancestor_offset);

    match behavior {
        BehaviorKind::Replace { value } => match poster_image(dom, node, &target) {
            Some(img) => replace_image(dom, &img, value),
            None => debug!("No poster image to replace below {:?}", target),
        },
        _ => dom.add_class(&target, FILTERED_FILM),
    }

    mark(dom, node, &FILM_MARKERS, true);
    true
}

/// Reverse any treatment on the film fragment at `node`.
///
/// Removal does not depend on the active behavior: the shared class is
/// dropped and a swapped poster is restored if recovery attributes exist.
pub fn remove_filter_from_film<D: Dom>(dom: &D, node: &D::Node, ancestor_offset: usize) -> bool {
    let target = ancestor_at(dom, node, ancestor_offset);

    dom.remove_class(&target, FILTERED_FILM);
    if let Some(img) = poster_image(dom, node, &target) {
        restore_image(dom, &img);
    }

    mark(dom, node, &FILM_MARKERS, false);
    true
}

/// Set one processed marker and clear the other.
pub fn mark<D: Dom>(dom: &D, node: &D::Node, markers: &Markers, applied: bool) {
    if applied {
        dom.add_class(node, markers.applied);
        dom.remove_class(node, markers.removed);
    } else {
        dom.add_class(node, markers.removed);
        dom.remove_class(node, markers.applied);
    }
}

/// The image to swap: the matched node itself, an image inside it, or else a
/// film poster image under the treated ancestor. Other images there, such as
/// avatars, are never swapped.
fn poster_image<D: Dom>(dom: &D, node: &D::Node, target: &D::Node) -> Option<D::Node> {
    if dom.tag_name(node) == "img" {
        return Some(node.clone());
    }
    let img = Compound::tag("img");
    let poster_img = Selector::from(Complex::new(Compound::class("film-poster")).descendant(img.clone()));
    dom.query_first_within(node, &Selector::from(img))
        .or_else(|| dom.query_first_within(target, &poster_img))
}

fn replace_image<D: Dom>(dom: &D, img: &D::Node, replacement: &str) {
    // Keep the first recorded original; a second apply must not stash the replacement.
    if dom.attribute(img, ORIGINAL_SRC).is_none() {
        let src = dom.attribute(img, "src").unwrap_or_default();
        dom.set_attribute(img, ORIGINAL_SRC, &src);
        if let Some(srcset) = dom.attribute(img, "srcset") {
            dom.set_attribute(img, ORIGINAL_SRCSET, &srcset);
        }
    }
    dom.set_attribute(img, "src", replacement);
    dom.remove_attribute(img, "srcset");
}

fn restore_image<D: Dom>(dom: &D, img: &D::Node) {
    let Some(src) = dom.attribute(img, ORIGINAL_SRC) else {
        return;
    };
    dom.set_attribute(img, "src", &src);
    dom.remove_attribute(img, ORIGINAL_SRC);

    if let Some(srcset) = dom.attribute(img, ORIGINAL_SRCSET) {
        dom.set_attribute(img, "srcset", &srcset);
        dom.remove_attribute(img, ORIGINAL_SRCSET);
    }
}

#[cfg(all(test, feature = "memory-dom"))]
mod tests {
    use super::*;
    use crate::dom::memory::MemoryDom;

    const TILE: &str = r#"<ul id="grid"><li class="poster-container" id="tile"><div class="film-poster" id="poster" data-film-id="42"><img id="img" src="Y" srcset="Y 2x"></div></li></ul>"#;

    #[test]
    fn class_behaviors_mark_the_offset_ancestor() {
        let dom = MemoryDom::from_html(TILE);
        let poster = dom.element_by_id("poster").unwrap();
        let tile = dom.element_by_id("tile").unwrap();

        assert!(apply_filter_to_film(&dom, &poster, 1, &BehaviorKind::Blur { amount: 5 }));
        assert!(dom.has_class(&tile, FILTERED_FILM));
        assert!(!dom.has_class(&poster, FILTERED_FILM));
        assert!(dom.has_class(&poster, FILM_MARKERS.applied));

        assert!(remove_filter_from_film(&dom, &poster, 1));
        assert!(!dom.has_class(&tile, FILTERED_FILM));
        assert!(dom.has_class(&poster, FILM_MARKERS.removed));
        assert!(!dom.has_class(&poster, FILM_MARKERS.applied));
    }

    #[test]
    fn offset_past_the_root_stops_at_the_top() {
        let dom = MemoryDom::from_html(TILE);
        let poster = dom.element_by_id("poster").unwrap();

        apply_filter_to_film(&dom, &poster, 50, &BehaviorKind::Remove);

        let html = dom.query_first(&Selector::parse("html").unwrap()).unwrap();
        assert!(dom.has_class(&html, FILTERED_FILM));
    }

    #[test]
    fn replace_poster_round_trip() {
        let dom = MemoryDom::from_html(TILE);
        let poster = dom.element_by_id("poster").unwrap();
        let img = dom.element_by_id("img").unwrap();
        let replace = BehaviorKind::Replace { value: "X".to_string() };

        apply_filter_to_film(&dom, &poster, 1, &replace);
        assert_eq!(dom.attribute(&img, "src").as_deref(), Some("X"));
        assert_eq!(dom.attribute(&img, ORIGINAL_SRC).as_deref(), Some("Y"));
        assert_eq!(dom.attribute(&img, "srcset"), None);
        assert!(dom.has_class(&poster, FILM_MARKERS.applied));

        // Re-applying keeps the first original.
        apply_filter_to_film(&dom, &poster, 1, &replace);
        assert_eq!(dom.attribute(&img, ORIGINAL_SRC).as_deref(), Some("Y"));

        remove_filter_from_film(&dom, &poster, 1);
        assert_eq!(dom.attribute(&img, "src").as_deref(), Some("Y"));
        assert_eq!(dom.attribute(&img, "srcset").as_deref(), Some("Y 2x"));
        assert_eq!(dom.attribute(&img, ORIGINAL_SRC), None);
        assert_eq!(dom.attribute(&img, ORIGINAL_SRCSET), None);
        assert!(dom.has_class(&poster, FILM_MARKERS.removed));
        assert!(!dom.has_class(&poster, FILM_MARKERS.applied));
    }

    #[test]
    fn replace_leaves_other_images_alone() {
        let dom = MemoryDom::from_html(
            r#"<li class="film-detail" id="review"><a class="avatar"><img id="avatar" src="me.jpg"></a><div class="film-poster" data-film-id="42"><img id="poster-img" src="Y"></div><p><a id="title" data-film-id="42">Up</a></p></li>"#,
        );
        let title = dom.element_by_id("title").unwrap();
        let avatar = dom.element_by_id("avatar").unwrap();
        let poster_img = dom.element_by_id("poster-img").unwrap();

        apply_filter_to_film(&dom, &title, 2, &BehaviorKind::Replace { value: "X".to_string() });

        assert_eq!(dom.attribute(&avatar, "src").as_deref(), Some("me.jpg"));
        assert_eq!(dom.attribute(&avatar, ORIGINAL_SRC), None);
        assert_eq!(dom.attribute(&poster_img, "src").as_deref(), Some("X"));

        remove_filter_from_film(&dom, &title, 2);
        assert_eq!(dom.attribute(&poster_img, "src").as_deref(), Some("Y"));
    }

    #[test]
    fn replace_without_poster_image_skips_the_swap() {
        let dom = MemoryDom::from_html(r#"<div id="row"><img id="avatar" src="me.jpg"><span id="leaf" data-film-id="42">Up</span></div>"#);
        let leaf = dom.element_by_id("leaf").unwrap();
        let avatar = dom.element_by_id("avatar").unwrap();

        apply_filter_to_film(&dom, &leaf, 1, &BehaviorKind::Replace { value: "X".to_string() });

        assert_eq!(dom.attribute(&avatar, "src").as_deref(), Some("me.jpg"));
        assert!(dom.has_class(&leaf, FILM_MARKERS.applied));
    }

    #[test]
    fn replace_without_image_still_marks() {
        let dom = MemoryDom::from_html(r#"<div><span id="leaf" data-film-id="42">Up</span></div>"#);
        let leaf = dom.element_by_id("leaf").unwrap();

        apply_filter_to_film(&dom, &leaf, 0, &BehaviorKind::Replace { value: "X".to_string() });
        assert!(dom.has_class(&leaf, FILM_MARKERS.applied));
        assert!(!dom.has_class(&leaf, FILTERED_FILM));
    }
}
