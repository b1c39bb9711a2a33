//! Entity Matcher
//!
//! The host page renders one film as many differently shaped fragments. Each
//! shape is a [`MatchRule`]: a scope selector, how the film is identified
//! inside it, and how many parents up the treated element sits. Rules are
//! evaluated in order and unioned; a leaf claimed by an earlier rule is not
//! claimed again by a later one.

use log::{debug, warn};

use crate::dom::Dom;
use crate::markers::Markers;
use crate::selector::{compile, AttrOp, Complex, Compound, Selector};
use crate::types::FilmFilterEntry;

/// How a fragment identifies its film.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// `[data-film-id="<id>"]`
    FilmId,
    /// `a[href*="/film/<slug>/"]`. Slugs that are substrings of other slugs can over-match.
    SlugHref,
}

/// Declarative form of a rule, as written in the default table.
#[derive(Debug, Clone, Copy)]
pub struct RuleTemplate {
    pub context: &'static str,
    pub scope: Option<&'static str>,
    pub identity: Identity,
    pub ancestor_offset: usize,
    pub exclusions: &'static [&'static str],
}

pub const DEFAULT_RULES: &[RuleTemplate] = &[
    RuleTemplate {
        context: "activity rows",
        scope: Some("section.activity-row"),
        identity: Identity::FilmId,
        ancestor_offset: 3,
        exclusions: &[],
    },
    RuleTemplate {
        context: "activity likes",
        scope: Some("section.activity-row .activity-summary"),
        identity: Identity::SlugHref,
        ancestor_offset: 3,
        exclusions: &[],
    },
    RuleTemplate {
        context: "poster grids",
        scope: Some(".poster-container"),
        identity: Identity::FilmId,
        ancestor_offset: 1,
        exclusions: &[],
    },
    RuleTemplate {
        context: "review tiles",
        scope: Some(".review-tile"),
        identity: Identity::FilmId,
        ancestor_offset: 3,
        exclusions: &[],
    },
    RuleTemplate {
        context: "diary",
        scope: Some(".td-film-details"),
        identity: Identity::FilmId,
        ancestor_offset: 2,
        exclusions: &[],
    },
    // Popular with friends, competitions
    RuleTemplate {
        context: "remaining",
        scope: None,
        identity: Identity::FilmId,
        ancestor_offset: 0,
        exclusions: &["aside"],
    },
];

/// Containers whose film references are never treated.
pub const DEFAULT_IGNORED_CONTAINERS: &[&str] = &[
    ".film-poster-popmenu",
    ".js-actions-panel",
    ".fbx-filter-toggle",
    "#backdrop",
];

#[derive(Debug, Clone)]
pub struct MatchRule {
    pub context: &'static str,
    pub scope: Option<Complex>,
    pub identity: Identity,
    pub ancestor_offset: usize,
    pub exclusions: Vec<Selector>,
}

/// Compiled rule table.
#[derive(Debug, Clone)]
pub struct MatchRules {
    rules: Vec<MatchRule>,
    ignored_containers: Vec<Selector>,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self::from_templates(DEFAULT_RULES, DEFAULT_IGNORED_CONTAINERS)
    }
}

impl MatchRules {
    /// Compile a table. Rules with unparsable selectors are logged and skipped.
    pub fn from_templates(templates: &[RuleTemplate], ignored_containers: &[&str]) -> Self {
        let mut rules = Vec::with_capacity(templates.len());

        'templates: for template in templates {
            let scope = match template.scope {
                Some(text) => match Complex::parse(text) {
                    Ok(scope) => Some(scope),
                    Err(e) => {
                        warn!("Ignoring rule for {}: {}", template.context, e);
                        continue;
                    }
                },
                None => None,
            };

            let mut exclusions = Vec::with_capacity(template.exclusions.len());
            for text in template.exclusions {
                match compile(template.context, text) {
                    Some(selector) => exclusions.push(selector),
                    None => continue 'templates,
                }
            }

            rules.push(MatchRule {
                context: template.context,
                scope,
                identity: template.identity,
                ancestor_offset: template.ancestor_offset,
                exclusions,
            });
        }

        let ignored_containers = ignored_containers
            .iter()
            .filter_map(|text| compile("ignored container", text))
            .collect();

        Self {
            rules,
            ignored_containers,
        }
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }
}

/// Which treatment the caller is about to perform; decides the skip marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Remove,
}

impl Direction {
    fn skip_marker(self, markers: &Markers) -> &'static str {
        match self {
            Self::Apply => markers.applied,
            Self::Remove => markers.removed,
        }
    }
}

/// A matched leaf and the offset its treatment should use.
#[derive(Debug, Clone, PartialEq)]
pub struct FilmMatch<N> {
    pub node: N,
    pub ancestor_offset: usize,
    pub context: &'static str,
}

/// Live nodes representing `entry`, excluding nodes already processed in
/// `direction` and nodes inside ignored containers.
pub fn match_film<D: Dom>(
    dom: &D,
    rules: &MatchRules,
    entry: &FilmFilterEntry,
    markers: &Markers,
    direction: Direction,
) -> Vec<FilmMatch<D::Node>> {
    let skip = Compound::class(direction.skip_marker(markers));
    let mut matches: Vec<FilmMatch<D::Node>> = Vec::new();

    for rule in &rules.rules {
        let Some(subject) = identity_compound(rule.identity, entry) else {
            continue;
        };
        let selector = Selector::from(Complex::scoped(rule.scope.as_ref(), subject.not(skip.clone())));

        for node in dom.query_all(&selector) {
            if matches.iter().any(|m| m.node == node) {
                continue;
            }
            let excluded = rule
                .exclusions
                .iter()
                .chain(&rules.ignored_containers)
                .any(|container| dom.closest(&node, container).is_some());
            if excluded {
                continue;
            }
            matches.push(FilmMatch {
                node,
                ancestor_offset: rule.ancestor_offset,
                context: rule.context,
            });
        }
    }

    if !matches.is_empty() {
        debug!(
            "Matched {} element(s) for film {:?} ({:?})",
            matches.len(),
            entry.id,
            direction
        );
    }
    matches
}

fn identity_compound(identity: Identity, entry: &FilmFilterEntry) -> Option<Compound> {
    match identity {
        Identity::FilmId => {
            let id = entry.id?;
            Some(Compound::any().with_attr("data-film-id", AttrOp::Equals, &id.to_string()))
        }
        Identity::SlugHref => {
            if entry.slug.is_empty() {
                return None;
            }
            Some(Compound::tag("a").with_attr("href", AttrOp::Contains, &format!("/film/{}/", entry.slug)))
        }
    }
}

#[cfg(all(test, feature = "memory-dom"))]
mod tests {
    use super::*;
    use crate::dom::memory::MemoryDom;
    use crate::markers::FILM_MARKERS;

    fn up() -> FilmFilterEntry {
        FilmFilterEntry::new(42, "up", Some("Up"), Some("2009"))
    }

    #[test]
    fn default_table_compiles_completely() {
        let rules = MatchRules::default();
        assert_eq!(rules.rules().len(), DEFAULT_RULES.len());
        assert_eq!(rules.ignored_containers.len(), DEFAULT_IGNORED_CONTAINERS.len());
    }

    #[test]
    fn generated_selectors_are_valid_css() {
        let rules = MatchRules::default();
        let slug_with_quote = FilmFilterEntry::new(7, "say-\"hi\"", None, None);
        for rule in rules.rules() {
            for entry in [up(), slug_with_quote.clone()] {
                let subject = identity_compound(rule.identity, &entry).unwrap();
                let selector = Selector::from(Complex::scoped(rule.scope.as_ref(), subject))
                    .excluding(&Compound::class(FILM_MARKERS.applied));
                assert!(selector.to_scraper().is_ok(), "{} renders '{}'", rule.context, selector);
            }
        }
    }

    #[test]
    fn each_context_gets_its_own_offset() {
        let dom = MemoryDom::from_html(
            r#"
            <ul><li class="poster-container"><div class="film-poster" id="grid" data-film-id="42"></div></li></ul>
            <div class="review-tile"><div><div><div class="film-poster" id="review" data-film-id="42"></div></div></div></div>
            <section class="activity-row"><div class="activity-summary"><p><a id="like" href="/someone/film/up/">Up</a></p></div></section>
            <div class="td-film-details"><div><div class="film-poster" id="diary" data-film-id="42"></div></div></div>
            <div class="popular"><div class="film-poster" id="loose" data-film-id="42"></div></div>
            "#,
        );

        let matches = match_film(&dom, &MatchRules::default(), &up(), &FILM_MARKERS, Direction::Apply);
        let found: Vec<(String, usize)> = matches
            .iter()
            .map(|m| (dom.attribute(&m.node, "id").unwrap_or_default(), m.ancestor_offset))
            .collect();

        assert_eq!(
            found,
            vec![
                ("like".to_string(), 3),
                ("grid".to_string(), 1),
                ("review".to_string(), 3),
                ("diary".to_string(), 2),
                ("loose".to_string(), 0),
            ]
        );
    }

    #[test]
    fn skips_processed_and_ignored_nodes() {
        let dom = MemoryDom::from_html(
            r#"
            <div class="film-poster-popmenu"><a class="menu-item-add-this-film" data-film-id="42">Add</a></div>
            <ul class="js-actions-panel"><li><a data-film-id="42">Review</a></li></ul>
            <div id="backdrop" data-film-id="42"></div>
            <aside><div data-film-id="42"></div></aside>
            <div class="film-poster fbx-film-filter-applied" id="done" data-film-id="42"></div>
            <div class="film-poster" id="fresh" data-film-id="42"></div>
            <div class="film-poster" id="other" data-film-id="7"></div>
            "#,
        );

        let matches = match_film(&dom, &MatchRules::default(), &up(), &FILM_MARKERS, Direction::Apply);
        assert_eq!(matches.len(), 1);
        assert_eq!(dom.attribute(&matches[0].node, "id").as_deref(), Some("fresh"));

        // Removal skips the removed marker instead.
        let matches = match_film(&dom, &MatchRules::default(), &up(), &FILM_MARKERS, Direction::Remove);
        let ids: Vec<String> = matches
            .iter()
            .filter_map(|m| dom.attribute(&m.node, "id"))
            .collect();
        assert_eq!(ids, vec!["done", "fresh"]);
    }

    #[test]
    fn entries_without_identity_match_nothing_by_that_identity() {
        let dom = MemoryDom::from_html(r#"<div data-film-id="42"></div>"#);
        let broken = FilmFilterEntry {
            id: None,
            slug: String::new(),
            name: None,
            year: None,
        };
        assert!(match_film(&dom, &MatchRules::default(), &broken, &FILM_MARKERS, Direction::Apply).is_empty());
    }

    #[test]
    fn invalid_templates_are_skipped() {
        let templates = [
            RuleTemplate {
                context: "bad scope",
                scope: Some("li >"),
                identity: Identity::FilmId,
                ancestor_offset: 0,
                exclusions: &[],
            },
            RuleTemplate {
                context: "list scope",
                scope: Some(".a, .b"),
                identity: Identity::FilmId,
                ancestor_offset: 0,
                exclusions: &[],
            },
            RuleTemplate {
                context: "good",
                scope: None,
                identity: Identity::FilmId,
                ancestor_offset: 0,
                exclusions: &[],
            },
        ];
        let rules = MatchRules::from_templates(&templates, &["[broken"]);
        assert_eq!(rules.rules().len(), 1);
        assert_eq!(rules.rules()[0].context, "good");
        assert!(rules.ignored_containers.is_empty());
    }
}
