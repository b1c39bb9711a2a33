//! Interactive Toggle Injector
//!
//! "Add to filter" / "Remove from filter" controls are fabricated by cloning a
//! neighbouring host-page menu item, so they inherit the host's styling. The
//! film's identity is written onto the control when it is built; clicks are
//! routed back through [`handle_toggle_click`].

use log::{debug, info};
use thiserror::Error;

use crate::context::AppContext;
use crate::dom::Dom;
use crate::markers::{TITLE_HIDDEN, TOGGLE_CONTROL};
use crate::pass::{apply_film, remove_film};
use crate::selector::{compile, Compound, Selector};
use crate::store::KeyValueStore;
use crate::types::FilmFilterEntry;

pub const ADD_LABEL: &str = "Add to filter";
pub const REMOVE_LABEL: &str = "Remove from filter";

const FILM_ID: &str = "data-film-id";
const FILM_SLUG: &str = "data-film-slug";
const FILM_NAME: &str = "data-film-name";
const FILM_YEAR: &str = "data-film-release-year";
const LINK_ATTRIBUTES: [&str; 2] = ["data-film-link", "data-target-link"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToggleError {
    #[error("element is not a filter toggle")]
    NotAControl,
    #[error("no film id found")]
    MissingFilmId,
    #[error("invalid film id '{0}'")]
    InvalidFilmId(String),
    #[error("film list unreadable: {0}")]
    Storage(String),
}

/// Host-page anchors for control injection.
#[derive(Debug, Clone)]
pub struct ToggleSelectors {
    pub popmenu: Option<Selector>,
    pub add_this_film: Option<Selector>,
    pub menu_item: Option<Selector>,
    pub actions_panel: Option<Selector>,
    pub film_poster: Option<Selector>,
    pub release_year: Option<Selector>,
    pub film_name: Option<Selector>,
    pub control: Selector,
}

impl Default for ToggleSelectors {
    fn default() -> Self {
        Self {
            popmenu: compile("poster menu", ".film-poster-popmenu"),
            add_this_film: compile("poster menu film", ".menu-item-add-this-film"),
            menu_item: compile("menu item", "li"),
            actions_panel: compile("actions panel", "ul.js-actions-panel"),
            film_poster: compile("film poster", ".film-poster"),
            release_year: compile("release year", ".releaseyear a"),
            film_name: compile("film name", ".headline-1 .name"),
            control: Compound::class(TOGGLE_CONTROL).into(),
        }
    }
}

/// Result of a handled click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub film_id: u64,
    /// Membership after the click.
    pub hidden: bool,
    /// Page fragments treated or restored.
    pub elements_changed: usize,
    /// Other controls for the same film whose state was updated.
    pub synced_controls: usize,
}

// =============================================================================
// Injection
// =============================================================================

/// Add a control to every poster pop-up menu that lacks one. Returns the
/// number of controls inserted.
pub fn maybe_insert_context_menu_toggles<D: Dom, S: KeyValueStore>(ctx: &AppContext<D, S>) -> usize {
    let sel = &ctx.toggles;
    let (Some(popmenu), Some(menu_item)) = (&sel.popmenu, &sel.menu_item) else {
        return 0;
    };

    let mut inserted = 0;
    for menu in ctx.dom.query_all(popmenu) {
        if ctx.dom.query_first_within(&menu, &sel.control).is_some() {
            continue;
        }
        let Some(last_item) = ctx.dom.query_all_within(&menu, menu_item).pop() else {
            debug!("Poster menu without items, skipping");
            continue;
        };
        let Some(list) = ctx.dom.parent(&last_item) else {
            continue;
        };
        let source = sel
            .add_this_film
            .as_ref()
            .and_then(|selector| ctx.dom.query_first_within(&menu, selector));
        let identity = match resolve_identity(ctx, source.as_ref(), false) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Poster menu skipped: {}", e);
                continue;
            }
        };

        let Some(control) = build_control(ctx, &last_item, &identity) else {
            continue;
        };
        if ctx.dom.append_child(&list, &control) {
            inserted += 1;
        }
    }
    inserted
}

/// Add a control to the film page's actions panel, before its last item.
/// Returns whether a control was inserted.
pub fn maybe_insert_sidebar_toggle<D: Dom, S: KeyValueStore>(ctx: &AppContext<D, S>) -> bool {
    let sel = &ctx.toggles;
    let Some(panel) = sel.actions_panel.as_ref().and_then(|s| ctx.dom.query_first(s)) else {
        return false;
    };
    if ctx.dom.query_first_within(&panel, &sel.control).is_some() {
        return false;
    }
    let Some(last_item) = ctx.dom.children(&panel).pop() else {
        debug!("Actions panel is empty");
        return false;
    };

    let film_id = Selector::from(Compound::any().has_attr(FILM_ID));
    let source = ctx.dom.query_first_within(&panel, &film_id);
    let identity = match resolve_identity(ctx, source.as_ref(), true) {
        Ok(identity) => identity,
        Err(e) => {
            debug!("Sidebar toggle skipped: {}", e);
            return false;
        }
    };

    match build_control(ctx, &last_item, &identity) {
        Some(control) => ctx.dom.insert_before(&panel, &control, &last_item),
        None => false,
    }
}

/// Film identity read from the page through the fallback chain: the source
/// element's attributes, then a matching film poster, then (film page only)
/// the page headline and release year.
fn resolve_identity<D: Dom, S: KeyValueStore>(
    ctx: &AppContext<D, S>,
    source: Option<&D::Node>,
    page_fallback: bool,
) -> Result<FilmFilterEntry, ToggleError> {
    let dom = &ctx.dom;
    let sel = &ctx.toggles;
    let read = |node: Option<&D::Node>, name: &str| {
        node.and_then(|node| dom.attribute(node, name))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let find_poster = |wanted: Option<&str>| {
        let selector = sel.film_poster.as_ref()?;
        dom.query_all(selector).into_iter().find(|node| match (dom.attribute(node, FILM_ID), wanted) {
            (Some(found), Some(wanted)) => found.trim() == wanted,
            (Some(_), None) => true,
            (None, _) => false,
        })
    };

    let mut raw_id = read(source, FILM_ID);
    if raw_id.is_none() && page_fallback {
        raw_id = read(find_poster(None).as_ref(), FILM_ID);
    }
    let raw_id = raw_id.ok_or(ToggleError::MissingFilmId)?;
    let id = parse_film_id(&raw_id)?;
    let poster = find_poster(Some(&id.to_string()));

    let slug = read(source, FILM_SLUG)
        .or_else(|| slug_from_links(dom, source))
        .or_else(|| read(poster.as_ref(), FILM_SLUG))
        .or_else(|| slug_from_links(dom, poster.as_ref()))
        .unwrap_or_default();

    let mut name = read(source, FILM_NAME).or_else(|| read(poster.as_ref(), FILM_NAME));
    let mut year = read(source, FILM_YEAR).or_else(|| read(poster.as_ref(), FILM_YEAR));

    if page_fallback {
        let text_of = |selector: &Option<Selector>| {
            selector
                .as_ref()
                .and_then(|selector| dom.query_first(selector))
                .map(|node| dom.text(&node).trim().to_string())
                .filter(|text| !text.is_empty())
        };
        name = name.or_else(|| text_of(&sel.film_name));
        year = year.or_else(|| text_of(&sel.release_year));
    }

    Ok(FilmFilterEntry {
        id: Some(id),
        slug,
        name,
        year,
    })
}

fn parse_film_id(raw: &str) -> Result<u64, ToggleError> {
    raw.trim()
        .parse()
        .map_err(|_| ToggleError::InvalidFilmId(raw.to_string()))
}

/// `up` from a `/film/up/` style link attribute.
fn slug_from_links<D: Dom>(dom: &D, node: Option<&D::Node>) -> Option<String> {
    let node = node?;
    LINK_ATTRIBUTES.iter().find_map(|name| {
        let link = dom.attribute(node, name)?;
        let mut segments = link.split('/').filter(|segment| !segment.is_empty());
        segments.find(|segment| *segment == "film")?;
        segments.next().map(str::to_string)
    })
}

/// Clone `template` into a control for `identity`. The clone is detached.
fn build_control<D: Dom, S: KeyValueStore>(
    ctx: &AppContext<D, S>,
    template: &D::Node,
    identity: &FilmFilterEntry,
) -> Option<D::Node> {
    let dom = &ctx.dom;
    let id = identity.id?;
    let control = dom.clone_node(template)?;
    let hidden = ctx.store.film_filter().contains(id);

    dom.remove_attribute(&control, "id");
    dom.add_class(&control, TOGGLE_CONTROL);
    dom.set_attribute(&control, FILM_ID, &id.to_string());
    dom.set_attribute(&control, FILM_SLUG, &identity.slug);
    if let Some(name) = &identity.name {
        dom.set_attribute(&control, FILM_NAME, name);
    }
    if let Some(year) = &identity.year {
        dom.set_attribute(&control, FILM_YEAR, year);
    }

    if let Some(link) = dom.first_element_child(&control) {
        dom.remove_attribute(&link, "class");
        dom.remove_attribute(&link, "href");
    }
    set_state(dom, &control, hidden);
    dom.listen_click(&control);

    Some(control)
}

fn set_state<D: Dom>(dom: &D, control: &D::Node, hidden: bool) {
    dom.set_attribute(control, TITLE_HIDDEN, if hidden { "true" } else { "false" });
    let label = if hidden { REMOVE_LABEL } else { ADD_LABEL };
    match dom.first_element_child(control) {
        Some(link) => dom.set_text(&link, label),
        None => dom.set_text(control, label),
    }
}

// =============================================================================
// Click handling
// =============================================================================

/// Toggle the film behind `target` (a control or an element inside one).
///
/// Adds or removes the store entry, saves, treats or restores the page and
/// updates every control for the same film. If the film list cannot be read
/// nothing is written and the page is left as it was. The caller is responsible for
/// suspending the mutation observer around this call.
pub fn handle_toggle_click<D: Dom, S: KeyValueStore>(
    ctx: &mut AppContext<D, S>,
    target: &D::Node,
) -> Result<ToggleOutcome, ToggleError> {
    let control = ctx
        .dom
        .closest(target, &ctx.toggles.control)
        .ok_or(ToggleError::NotAControl)?;
    let raw_id = ctx
        .dom
        .attribute(&control, FILM_ID)
        .ok_or(ToggleError::MissingFilmId)?;
    let film_id = parse_film_id(&raw_id)?;
    let was_hidden = ctx.dom.attribute(&control, TITLE_HIDDEN).as_deref() == Some("true");

    let attribute = |name: &str| ctx.dom.attribute(&control, name).filter(|value| !value.is_empty());
    let clicked = FilmFilterEntry {
        id: Some(film_id),
        slug: attribute(FILM_SLUG).unwrap_or_default(),
        name: attribute(FILM_NAME),
        year: attribute(FILM_YEAR),
    };

    let mut films = ctx
        .store
        .try_film_filter()
        .map_err(|e| ToggleError::Storage(e.to_string()))?;
    let elements_changed = if was_hidden {
        let stored = films
            .iter()
            .find(|entry| entry.id == Some(film_id))
            .cloned()
            .unwrap_or(clicked);
        films.remove(film_id);
        ctx.store.set_film_filter(&films);
        ctx.store.save();
        info!("Removed {} from the film filter", stored.label());
        remove_film(ctx, &stored)
    } else {
        if !films.insert(clicked.clone()) {
            debug!("Film {} already filtered", film_id);
        }
        ctx.store.set_film_filter(&films);
        ctx.store.save();
        info!("Added {} to the film filter", clicked.label());
        apply_film(ctx, &clicked)
    };

    let hidden = !was_hidden;
    let mut synced_controls = 0;
    for other in ctx.dom.query_all(&ctx.toggles.control) {
        if ctx.dom.attribute(&other, FILM_ID).as_deref() != Some(raw_id.as_str()) {
            continue;
        }
        set_state(&ctx.dom, &other, hidden);
        if other != control {
            synced_controls += 1;
        }
    }

    Ok(ToggleOutcome {
        film_id,
        hidden,
        elements_changed,
        synced_controls,
    })
}
