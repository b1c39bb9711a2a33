//! Generated Stylesheet
//!
//! One `<style>` element carries the rule for each shared filter class,
//! derived from the active behaviors, plus fixed rules for injected controls.

use crate::markers::{FILTERED_FILM, FILTERED_REVIEW};
use crate::types::{BehaviorKind, Behaviors};

const FIXED_RULES: &str = "\
.fbx-filter-toggle a { cursor: pointer; }
.fbx-settings .fbx-film-entry { transition: opacity 0.2s ease; }
.fbx-settings .fbx-film-entry:hover { opacity: 0.6; }
.fbx-settings .fbx-film-entry.fbx-pending-removal { opacity: 0.3; text-decoration: line-through; }
";

/// CSS declarations realising `behavior` on the shared class.
///
/// Replace has no class-level declarations; it is carried out on the element.
pub fn declarations(behavior: &BehaviorKind) -> String {
    match behavior {
        BehaviorKind::Remove => "display: none !important;".to_string(),
        BehaviorKind::Fade { amount } => format!("opacity: {amount}%;"),
        BehaviorKind::Blur { amount } => format!("filter: blur({amount}px);"),
        BehaviorKind::Replace { .. } => String::new(),
        BehaviorKind::Custom { css } => css.trim().to_string(),
    }
}

/// Full stylesheet text for the given behaviors.
pub fn generate(behaviors: &Behaviors) -> String {
    let mut css = String::new();
    css.push_str(&rule(FILTERED_FILM, &declarations(&behaviors.film)));
    css.push_str(&rule(FILTERED_REVIEW, &declarations(&behaviors.review)));
    css.push_str(FIXED_RULES);
    css
}

fn rule(class: &str, declarations: &str) -> String {
    if declarations.is_empty() {
        format!(".{class} {{ }}\n")
    } else {
        format!(".{class} {{ {declarations} }}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn film_rule(css: &str) -> &str {
        css.lines()
            .find(|line| line.starts_with(".fbx-filtered-film "))
            .unwrap()
    }

    #[test]
    fn blur_then_fade_replaces_rule() {
        let mut behaviors = Behaviors {
            film: BehaviorKind::Blur { amount: 5 },
            review: BehaviorKind::Remove,
        };
        let css = generate(&behaviors);
        assert_eq!(film_rule(&css), ".fbx-filtered-film { filter: blur(5px); }");

        behaviors.film = BehaviorKind::Fade { amount: 20 };
        let css = generate(&behaviors);
        assert_eq!(film_rule(&css), ".fbx-filtered-film { opacity: 20%; }");
        assert!(!css.contains("blur("));
    }

    #[test]
    fn review_rule_follows_review_behavior() {
        let behaviors = Behaviors {
            film: BehaviorKind::Replace { value: "x.jpg".into() },
            review: BehaviorKind::Custom { css: " color: red; ".into() },
        };
        let css = generate(&behaviors);
        assert!(css.contains(".fbx-filtered-film { }"));
        assert!(css.contains(".fbx-filtered-review { color: red; }"));
        assert!(css.contains(".fbx-filter-toggle a { cursor: pointer; }"));
    }

    #[test]
    fn remove_hides_outright() {
        assert_eq!(declarations(&BehaviorKind::Remove), "display: none !important;");
    }
}
