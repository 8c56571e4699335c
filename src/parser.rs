//! Extraction of article links from rendered archive markup.
//!
//! Archive pages list each post as an anchor pointing at `/p/<slug>`, usually
//! next to a `<time>` element carrying the publication date. The parser walks
//! the document once, collecting anchors and `<time>` elements in document
//! order, then pairs every matching anchor with a date.
//!
//! # Date Pairing
//!
//! 1. If the anchor sits inside a post container (the closest ancestor holding
//!    any `<time>` holds exactly one), that element is used.
//! 2. Otherwise the nearest `<time>` before the anchor in document order.
//! 3. Otherwise the nearest `<time>` after it.
//!
//! The parser never fails: markup with no recognizable anchors yields an empty
//! list, which the crawler reads as "nothing loaded yet".

use crate::models::ArticleCandidate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

/// Default pattern for article paths: `/p/<slug>` with an optional trailing
/// slash. Comment pages (`/p/<slug>/comments`) do not match.
pub const DEFAULT_LINK_PATTERN: &str = r"^/p/[^/]+/?$";

/// Minimum anchor text length (in characters) accepted as a title.
const MIN_TITLE_CHARS: usize = 6;

static LINK_OR_TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href], time").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());

/// Capability for turning rendered markup into article candidates.
pub trait DocumentParser {
    /// Extract candidates from `markup`, resolving links against `base_url`.
    fn extract(&self, markup: &str, base_url: &str) -> Vec<ArticleCandidate>;
}

/// [`DocumentParser`] that recognizes article anchors by a path regex.
#[derive(Debug, Clone)]
pub struct ArchiveLinkParser {
    link_pattern: Regex,
}

impl ArchiveLinkParser {
    /// Build a parser matching article paths against `pattern`.
    pub fn with_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            link_pattern: Regex::new(pattern)?,
        })
    }

    fn is_article(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && self.link_pattern.is_match(url.path())
    }
}

impl Default for ArchiveLinkParser {
    fn default() -> Self {
        Self {
            link_pattern: Regex::new(DEFAULT_LINK_PATTERN).unwrap(),
        }
    }
}

enum Item {
    Time(Option<String>),
    Link {
        url: String,
        title: Option<String>,
        container_date: Option<String>,
    },
}

impl DocumentParser for ArchiveLinkParser {
    #[instrument(level = "debug", skip_all, fields(bytes = markup.len(), %base_url))]
    fn extract(&self, markup: &str, base_url: &str) -> Vec<ArticleCandidate> {
        let Ok(base) = Url::parse(base_url) else {
            debug!("Base URL does not parse; nothing to resolve against");
            return Vec::new();
        };
        let document = Html::parse_document(markup);

        let mut items = Vec::new();
        for element in document.select(&LINK_OR_TIME) {
            if element.value().name() == "time" {
                items.push(Item::Time(time_value(element)));
                continue;
            }
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = base.join(href.trim()) else {
                continue;
            };
            if !self.is_article(&resolved) {
                continue;
            }
            items.push(Item::Link {
                url: resolved.to_string(),
                title: anchor_title(element),
                container_date: container_date(element),
            });
        }

        // Nearest <time> after each position, filled back to front.
        let mut following = vec![None; items.len()];
        let mut next: Option<String> = None;
        for (i, item) in items.iter().enumerate().rev() {
            following[i] = next.clone();
            if let Item::Time(Some(value)) = item {
                next = Some(value.clone());
            }
        }

        let mut candidates = Vec::new();
        let mut preceding: Option<String> = None;
        for (item, after) in items.into_iter().zip(following) {
            match item {
                Item::Time(value) => {
                    if value.is_some() {
                        preceding = value;
                    }
                }
                Item::Link {
                    url,
                    title,
                    container_date,
                } => {
                    let raw_date = container_date.or_else(|| preceding.clone()).or(after);
                    candidates.push(ArticleCandidate {
                        url,
                        title,
                        raw_date,
                    });
                }
            }
        }

        debug!(count = candidates.len(), "Extracted article candidates");
        candidates
    }
}

/// `datetime` attribute if present, otherwise the element text.
fn time_value(element: ElementRef<'_>) -> Option<String> {
    if let Some(attr) = element.value().attr("datetime") {
        let attr = attr.trim();
        if !attr.is_empty() {
            return Some(attr.to_string());
        }
    }
    let text = collapse_whitespace(element.text());
    (!text.is_empty()).then_some(text)
}

fn anchor_title(element: ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(element.text());
    if text.chars().count() >= MIN_TITLE_CHARS {
        return Some(text);
    }
    element
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// The date of the post container around `anchor`, if there is exactly one.
fn container_date(anchor: ElementRef<'_>) -> Option<String> {
    for ancestor in anchor.ancestors().filter_map(ElementRef::wrap) {
        let mut times = ancestor.select(&TIME);
        let Some(first) = times.next() else {
            continue;
        };
        if times.next().is_some() {
            return None;
        }
        return time_value(first);
    }
    None
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
