//! Container locator: finds the elements on a results page that each hold
//! one auction result.
//!
//! Strategies are tried in order. The first one that yields at least one
//! plausible container wins; the generic scored strategy is the usual last
//! entry.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

use super::patterns;

/// Containers whose text falls outside this window are navigation chrome or
/// whole-page summaries.
pub const MIN_TEXT_CHARS: usize = 20;
pub const MAX_TEXT_CHARS: usize = 2000;

/// Signals a generic container needs before it is kept.
pub const MIN_SIGNALS: usize = 2;

static GENERIC_CONTAINERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div, article, section, li").unwrap());

/// One candidate element with its visible text, one text node per line.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub element: ElementRef<'a>,
    pub text: String,
}

impl<'a> Candidate<'a> {
    pub fn new(element: ElementRef<'a>) -> Self {
        Self {
            text: container_text(element),
            element,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_plausible(&self) -> bool {
        (MIN_TEXT_CHARS..=MAX_TEXT_CHARS).contains(&self.char_len())
    }
}

#[derive(Debug, Clone)]
pub enum Strategy {
    /// Site-specific markup (class names, `data-testid` attributes).
    Selector { name: String, selector: Selector },
    /// Every block element scored on the five result signals.
    Scored,
}

impl Strategy {
    pub fn selector(css: &str) -> anyhow::Result<Self> {
        let selector = Selector::parse(css)
            .map_err(|e| crate::error::ScrapeError::Selector(format!("{}: {:?}", css, e)))?;
        Ok(Strategy::Selector {
            name: css.to_string(),
            selector,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Strategy::Selector { name, .. } => name,
            Strategy::Scored => "scored",
        }
    }

    /// Plausible candidates for this strategy, in document order.
    pub fn candidates<'a>(&self, doc: &'a Html) -> Vec<Candidate<'a>> {
        match self {
            Strategy::Selector { selector, .. } => doc
                .select(selector)
                .map(Candidate::new)
                .filter(Candidate::is_plausible)
                .collect(),
            Strategy::Scored => doc
                .select(&GENERIC_CONTAINERS)
                .map(Candidate::new)
                .filter(|c| c.is_plausible() && signal_count(&c.text) >= MIN_SIGNALS)
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct Located<'a> {
    pub strategy: Option<String>,
    pub candidates: Vec<Candidate<'a>>,
}

/// Run `strategies` in order and return the first non-empty result.
/// Finding nothing is not an error.
pub fn locate<'a>(doc: &'a Html, strategies: &[Strategy]) -> Located<'a> {
    for strategy in strategies {
        let candidates = strategy.candidates(doc);
        debug!("Strategy {:?}: {} candidates", strategy.name(), candidates.len());
        if !candidates.is_empty() {
            return Located {
                strategy: Some(strategy.name().to_string()),
                candidates,
            };
        }
    }

    Located {
        strategy: None,
        candidates: Vec::new(),
    }
}

/// How many of the five result signals appear in `text`: a dollar amount,
/// a postcode, a result keyword, a bed/bath/car count and a street address.
pub fn signal_count(text: &str) -> usize {
    [
        patterns::PRICE_SIGNAL.is_match(text),
        patterns::POSTCODE.is_match(text),
        patterns::RESULT_SIGNAL.is_match(text),
        patterns::FEATURE_SIGNAL.is_match(text),
        patterns::ADDRESS.is_match(text),
    ]
    .into_iter()
    .filter(|hit| *hit)
    .count()
}

/// Visible text of an element, one trimmed text node per line. Script and
/// style contents are skipped.
pub fn container_text(element: ElementRef<'_>) -> String {
    let mut lines = Vec::new();

    for node in element.descendants() {
        let Some(text) = node.value().as_text() else { continue };

        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
        if hidden {
            continue;
        }

        let t = text.trim();
        if !t.is_empty() {
            lines.push(t);
        }
    }

    lines.join("\n")
}
