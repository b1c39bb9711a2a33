//! Selector builder
//!
//! Generated selectors are assembled from typed [`Compound`] parts instead of
//! format strings, and configured selector text is checked with `scraper`'s
//! CSS parser before it is used. `Display` renders CSS that both
//! `querySelectorAll` and [`scraper::Selector`] accept.

use std::fmt;

use log::warn;

/// Error produced while reading configured selector text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,
    #[error("Invalid selector '{text}': {reason}")]
    Invalid { text: String, reason: String },
    #[error("Expected a single selector, got a list: '{0}'")]
    List(String),
}

// =============================================================================
// Selector AST
// =============================================================================

/// Attribute comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `[name]`
    Exists,
    /// `[name="value"]`
    Equals,
    /// `[name~="value"]` - whitespace-separated word
    Includes,
    /// `[name^="value"]`
    Prefix,
    /// `[name$="value"]`
    Suffix,
    /// `[name*="value"]`
    Contains,
}

impl AttrOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Exists => "",
            Self::Equals => "=",
            Self::Includes => "~=",
            Self::Prefix => "^=",
            Self::Suffix => "$=",
            Self::Contains => "*=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub op: AttrOp,
    pub value: String,
}

/// A compound selector: everything between two combinators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compound {
    /// Lowercase tag name; `None` is the universal selector.
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttrSelector>,
    /// `:not(...)` arguments; a node matching any of them is rejected.
    pub negations: Vec<Compound>,
}

impl Compound {
    /// The universal selector `*`.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn tag(name: &str) -> Self {
        Self {
            tag: Some(name.to_ascii_lowercase()),
            ..Self::default()
        }
    }

    pub fn class(name: &str) -> Self {
        Self::any().with_class(name)
    }

    pub fn with_class(mut self, name: &str) -> Self {
        self.classes.push(name.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_attr(mut self, name: &str, op: AttrOp, value: &str) -> Self {
        self.attributes.push(AttrSelector {
            name: name.to_ascii_lowercase(),
            op,
            value: value.to_string(),
        });
        self
    }

    pub fn has_attr(self, name: &str) -> Self {
        self.with_attr(name, AttrOp::Exists, "")
    }

    pub fn not(mut self, negation: Compound) -> Self {
        self.negations.push(negation);
        self
    }

    fn is_universal(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.negations.is_empty()
    }
}

/// One selector of a list: compounds joined by descendant or child
/// combinators, e.g. `.review-tile [data-film-id]`. Held as rendered CSS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Complex {
    css: String,
}

impl Complex {
    pub fn new(subject: Compound) -> Self {
        Self {
            css: subject.to_string(),
        }
    }

    /// Configured text for a single complex selector.
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let mut selector = Selector::parse(text)?;
        if selector.alternatives.len() > 1 {
            return Err(SelectorError::List(text.trim().to_string()));
        }
        Ok(selector.alternatives.remove(0))
    }

    /// Extend with `self <descendant>`.
    pub fn descendant(mut self, next: Compound) -> Self {
        self.css = format!("{} {}", self.css, next);
        self
    }

    /// Extend with `self > child`.
    pub fn child(mut self, next: Compound) -> Self {
        self.css = format!("{} > {}", self.css, next);
        self
    }

    /// Scope `subject` under an optional context selector.
    pub fn scoped(scope: Option<&Complex>, subject: Compound) -> Self {
        match scope {
            Some(scope) => scope.clone().descendant(subject),
            None => Self::new(subject),
        }
    }

    /// Add `:not(negation)` to the rightmost compound.
    fn exclude(&mut self, negation: &Compound) {
        self.css = format!("{}:not({})", self.css, negation);
    }
}

/// A comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Complex>,
}

impl Selector {
    /// Read configured selector text. The whole list must be accepted by
    /// `scraper`'s CSS parser.
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SelectorError::Empty);
        }
        scraper::Selector::parse(text).map_err(|e| SelectorError::Invalid {
            text: text.to_string(),
            reason: e.to_string(),
        })?;

        let alternatives = split_list(text)
            .into_iter()
            .map(|css| Complex { css: css.to_string() })
            .collect();
        Ok(Self { alternatives })
    }

    /// Join several selectors into one list. Returns `None` when nothing is left.
    pub fn union<I>(selectors: I) -> Option<Self>
    where
        I: IntoIterator<Item = Selector>,
    {
        let alternatives: Vec<Complex> = selectors
            .into_iter()
            .flat_map(|selector| selector.alternatives)
            .collect();

        if alternatives.is_empty() {
            None
        } else {
            Some(Self { alternatives })
        }
    }

    pub fn alternatives(&self) -> &[Complex] {
        &self.alternatives
    }

    /// Copy of this list whose every subject also carries `:not(negation)`.
    pub fn excluding(&self, negation: &Compound) -> Self {
        let alternatives = self
            .alternatives
            .iter()
            .cloned()
            .map(|mut complex| {
                complex.exclude(negation);
                complex
            })
            .collect();
        Self { alternatives }
    }

    /// Compile the rendered CSS with `scraper` for matching against parsed
    /// documents.
    pub fn to_scraper(&self) -> Result<scraper::Selector, SelectorError> {
        let css = self.to_string();
        scraper::Selector::parse(&css).map_err(|e| SelectorError::Invalid {
            reason: e.to_string(),
            text: css.clone(),
        })
    }
}

/// Parse a configured selector, logging and discarding it on failure.
pub fn compile(label: &str, text: &str) -> Option<Selector> {
    match Selector::parse(text) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Ignoring selector for {} ('{}'): {}", label, text, e);
            None
        }
    }
}

/// Split already validated selector-list text at top-level commas.
fn split_list(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (pos, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (_, '\\') => escaped = true,
            (Some(open), ch) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(text[start..pos].trim());
                start = pos + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

impl From<Complex> for Selector {
    fn from(complex: Complex) -> Self {
        Self {
            alternatives: vec![complex],
        }
    }
}

impl From<Compound> for Selector {
    fn from(compound: Compound) -> Self {
        Complex::new(compound).into()
    }
}

// =============================================================================
// Rendering
// =============================================================================

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            f.write_str(tag)?;
        } else if self.is_universal() {
            f.write_str("*")?;
        }
        if let Some(id) = &self.id {
            write!(f, "#{id}")?;
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        for attr in &self.attributes {
            match attr.op {
                AttrOp::Exists => write!(f, "[{}]", attr.name)?,
                op => {
                    write!(f, "[{}{}\"", attr.name, op.symbol())?;
                    for ch in attr.value.chars() {
                        if ch == '"' || ch == '\\' {
                            f.write_str("\\")?;
                        }
                        write!(f, "{ch}")?;
                    }
                    f.write_str("\"]")?;
                }
            }
        }
        for negation in &self.negations {
            write!(f, ":not({negation})")?;
        }
        Ok(())
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.css)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, complex) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{complex}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lists_at_top_level_commas_only() {
        let selector = Selector::parse(r#"#tabbed-content [data-id="a,b"],  ul.js-actions-panel > li:not(.x, .y)"#).unwrap();
        let parts: Vec<String> = selector.alternatives().iter().map(|c| c.to_string()).collect();
        assert_eq!(parts, vec![r#"#tabbed-content [data-id="a,b"]"#, "ul.js-actions-panel > li:not(.x, .y)"]);
        assert_eq!(
            selector.to_string(),
            r#"#tabbed-content [data-id="a,b"], ul.js-actions-panel > li:not(.x, .y)"#
        );
    }

    #[test]
    fn builders_render_css_the_parser_accepts() {
        let compound = Compound::tag("A")
            .with_id("main")
            .with_class("poster")
            .with_attr("href", AttrOp::Contains, "/film/up/")
            .with_attr("rel", AttrOp::Includes, "nofollow")
            .with_attr("class", AttrOp::Prefix, "x")
            .with_attr("id", AttrOp::Suffix, "y")
            .has_attr("title")
            .not(Compound::class("seen"));
        let rendered = compound.to_string();
        assert_eq!(
            rendered,
            r#"a#main.poster[href*="/film/up/"][rel~="nofollow"][class^="x"][id$="y"][title]:not(.seen)"#
        );
        assert!(scraper::Selector::parse(&rendered).is_ok());

        let complex = Complex::new(Compound::class("review-tile")).child(Compound::tag("div")).descendant(Compound::any());
        assert_eq!(complex.to_string(), ".review-tile > div *");
        assert!(Selector::from(complex).to_scraper().is_ok());
    }

    #[test]
    fn escapes_attribute_values_on_render() {
        let compound = Compound::any().with_attr("data-film-name", AttrOp::Equals, "Say \"Hi\" \\o/");
        let rendered = compound.to_string();
        assert_eq!(rendered, r#"[data-film-name="Say \"Hi\" \\o/"]"#);
        assert!(Selector::parse(&rendered).is_ok());
    }

    #[test]
    fn rejects_malformed_selectors() {
        assert_eq!(Selector::parse("   "), Err(SelectorError::Empty));
        assert!(matches!(Selector::parse(".a,"), Err(SelectorError::Invalid { .. })));
        assert!(matches!(Selector::parse("[data-film-id=\"4"), Err(SelectorError::Invalid { .. })));
        assert!(matches!(Selector::parse("li:no-such-pseudo"), Err(SelectorError::Invalid { .. })));
        assert!(matches!(Complex::parse(".a, .b"), Err(SelectorError::List(_))));
        assert!(compile("broken", "div >").is_none());
        assert!(compile("pseudo", "li:first-child").is_some());
    }

    #[test]
    fn builds_scoped_selectors() {
        let scope = Complex::parse(".review-tile").unwrap();
        let subject = Compound::any()
            .with_attr("data-film-id", AttrOp::Equals, "42")
            .not(Compound::class("applied"));

        let complex = Complex::scoped(Some(&scope), subject.clone());
        assert_eq!(complex.to_string(), ".review-tile [data-film-id=\"42\"]:not(.applied)");
        assert_eq!(Complex::scoped(None, subject).to_string(), "[data-film-id=\"42\"]:not(.applied)");
    }

    #[test]
    fn union_flattens_alternatives() {
        let merged = Selector::union(vec![
            Selector::parse("#a, #b").unwrap(),
            Selector::parse(".c").unwrap(),
        ])
        .unwrap();
        assert_eq!(merged.alternatives().len(), 3);
        assert_eq!(merged.to_string(), "#a, #b, .c");
        assert!(Selector::union(Vec::new()).is_none());
    }

    #[test]
    fn excluding_negates_every_alternative() {
        let selector = Selector::parse(".film-detail, .review-tile > div").unwrap();
        let excluded = selector.excluding(&Compound::class("done"));
        assert_eq!(
            excluded.to_string(),
            ".film-detail:not(.done), .review-tile > div:not(.done)"
        );
        assert!(excluded.to_scraper().is_ok());
    }
}
