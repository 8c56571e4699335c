//! URL canonicalization, date parsing, deduplication and ordering.
//!
//! The normalizer is the only place that adds records to a [`CrawlState`].
//! Every candidate is reduced to a canonical URL first; a URL that is already
//! in `visited_urls` never produces a second record, it can only fill in a
//! title or date the first sighting lacked.
//!
//! # Canonical URLs
//!
//! `https://Example.com/p/post/?utm_source=x&id=3#comments` becomes
//! `https://example.com/p/post?id=3`: lowercase host, no trailing slash, no
//! fragment, tracking parameters removed, other parameters kept in order.
//!
//! # Dates
//!
//! Raw date strings are tried against an ordered list of [`DateMatcher`]s and
//! the first one that parses wins.

use crate::models::{ArticleCandidate, ArticleRecord, CrawlState};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::{debug, instrument};
use url::Url;

/// Query parameters dropped during canonicalization (compared lowercase).
/// Any parameter starting with `utm_` is dropped as well.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "ref",
    "r",
    "s",
    "triedredirect",
];

/// Reduce `raw` to its canonical form, or `None` if it is not an absolute
/// http(s) URL with a host.
pub fn canonicalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.set_query(None);
    if !kept.is_empty() {
        url.query_pairs_mut().extend_pairs(kept.iter());
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// One accepted date format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMatcher {
    /// `2024-01-15T10:00:00.000Z`, `2024-01-15T10:00:00+02:00`
    Rfc3339,
    /// A `chrono` format with date and time, read as UTC.
    DateTime(&'static str),
    /// A `chrono` format with a date only, read as midnight UTC.
    Date(&'static str),
    /// `Jan 15` as shown for posts of the current year. Resolved against the
    /// reference day; a date after it is taken from the previous year.
    MonthDay,
}

impl DateMatcher {
    fn parse(&self, raw: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
        match self {
            DateMatcher::Rfc3339 => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            DateMatcher::DateTime(fmt) => NaiveDateTime::parse_from_str(raw, fmt)
                .ok()
                .map(|dt| dt.and_utc()),
            DateMatcher::Date(fmt) => NaiveDate::parse_from_str(raw, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
            DateMatcher::MonthDay => {
                let this_year = NaiveDate::parse_from_str(
                    &format!("{raw} {}", today.year()),
                    "%B %d %Y",
                )
                .ok()?;
                let date = if this_year > today {
                    this_year.with_year(today.year() - 1)?
                } else {
                    this_year
                };
                date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
            }
        }
    }
}

/// Ordered list of date matchers; first match wins.
#[derive(Debug, Clone)]
pub struct DateParser {
    matchers: Vec<DateMatcher>,
}

impl DateParser {
    pub fn new(matchers: Vec<DateMatcher>) -> Self {
        Self { matchers }
    }

    /// Parse against today's UTC date for year-less formats.
    pub fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        self.parse_relative_to(raw, Utc::now().date_naive())
    }

    pub fn parse_relative_to(&self, raw: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let parsed = self.matchers.iter().find_map(|m| m.parse(raw, today));
        if parsed.is_none() {
            debug!(raw, "No date format matched");
        }
        parsed
    }
}

impl Default for DateParser {
    fn default() -> Self {
        Self::new(vec![
            DateMatcher::Rfc3339,
            DateMatcher::DateTime("%Y-%m-%dT%H:%M:%S"),
            DateMatcher::Date("%Y-%m-%d"),
            DateMatcher::Date("%B %d, %Y"),
            DateMatcher::Date("%d %B %Y"),
            DateMatcher::Date("%d.%m.%Y"),
            DateMatcher::Date("%m/%d/%Y"),
            DateMatcher::MonthDay,
        ])
    }
}

/// Merges candidates into a [`CrawlState`].
#[derive(Debug, Clone, Default)]
pub struct ArticleNormalizer {
    dates: DateParser,
}

impl ArticleNormalizer {
    pub fn new(dates: DateParser) -> Self {
        Self { dates }
    }

    /// Add every candidate whose canonical URL has not been seen yet.
    ///
    /// Returns the number of records added by this call; this is the crawler's
    /// progress signal. Candidates whose URL cannot be canonicalized are
    /// dropped.
    #[instrument(level = "debug", skip_all, fields(candidates = candidates.len()))]
    pub fn merge(&self, state: &mut CrawlState, candidates: Vec<ArticleCandidate>) -> usize {
        let mut added = 0;
        // Built on the first duplicate that could fill a gap.
        let mut incomplete: Option<HashMap<String, usize>> = None;
        for candidate in candidates {
            let Some(url) = canonicalize(&candidate.url) else {
                debug!(url = %candidate.url, "Dropping candidate with unusable URL");
                continue;
            };
            let title = candidate.title.filter(|t| !t.trim().is_empty());
            let raw_date = candidate.raw_date.filter(|d| !d.trim().is_empty());

            if state.visited_urls.contains(&url) {
                if title.is_some() || raw_date.is_some() {
                    let index = incomplete.get_or_insert_with(|| incomplete_index(&state.records));
                    if let Some(&pos) = index.get(&url) {
                        self.fill_missing(&mut state.records[pos], title, raw_date);
                    }
                }
                continue;
            }

            let published_at = raw_date.as_deref().and_then(|raw| self.dates.parse(raw));
            let first_seen_order = state.records.len() as u64;
            let record = ArticleRecord {
                url: url.clone(),
                title,
                published_raw: raw_date,
                published_at,
                first_seen_order,
            };
            if let Some(index) = incomplete.as_mut() {
                if is_incomplete(&record) {
                    index.insert(url.clone(), state.records.len());
                }
            }
            state.visited_urls.insert(url);
            state.records.push(record);
            added += 1;
        }
        debug!(added, total = state.records.len(), "Merged candidates");
        added
    }

    /// First non-empty title/date wins; later values never overwrite.
    fn fill_missing(&self, record: &mut ArticleRecord, title: Option<String>, raw_date: Option<String>) {
        if record.title.is_none() {
            record.title = title;
        }
        if record.published_raw.is_none() {
            if let Some(raw) = raw_date {
                record.published_at = self.dates.parse(&raw);
                record.published_raw = Some(raw);
            }
        }
    }
}

fn is_incomplete(record: &ArticleRecord) -> bool {
    record.title.is_none() || record.published_raw.is_none()
}

/// Positions of the records that still lack a title or a date.
fn incomplete_index(records: &[ArticleRecord]) -> HashMap<String, usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| is_incomplete(r))
        .map(|(pos, r)| (r.url.clone(), pos))
        .collect()
}

/// Order records for output.
///
/// With `by_date`, dated records come first ordered by date (`ascending` or
/// not), ties broken by discovery order; undated records follow in discovery
/// order. Without `by_date`, discovery order is kept.
pub fn sort_records(records: &[ArticleRecord], by_date: bool, ascending: bool) -> Vec<ArticleRecord> {
    if !by_date {
        return records
            .iter()
            .sorted_by_key(|r| r.first_seen_order)
            .cloned()
            .collect();
    }

    let (dated, undated): (Vec<&ArticleRecord>, Vec<&ArticleRecord>) =
        records.iter().partition(|r| r.published_at.is_some());

    dated
        .into_iter()
        .sorted_by(|a, b| {
            let by_date = if ascending {
                a.published_at.cmp(&b.published_at)
            } else {
                b.published_at.cmp(&a.published_at)
            };
            by_date.then(a.first_seen_order.cmp(&b.first_seen_order))
        })
        .chain(undated.into_iter().sorted_by_key(|r| r.first_seen_order))
        .cloned()
        .collect()
}
