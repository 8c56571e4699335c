//! Data models for discovered articles and crawl progress.
//!
//! - [`ArticleCandidate`]: a link as the document parser found it
//! - [`ArticleRecord`]: a deduplicated article with a canonical URL
//! - [`CrawlState`]: the crawler's working set, persisted between runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A raw article link extracted from rendered markup.
///
/// The URL is absolute but not yet canonical; the date is whatever text the
/// page carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleCandidate {
    pub url: String,
    pub title: Option<String>,
    pub raw_date: Option<String>,
}

/// A unique article in the result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Absolute canonical URL, the deduplication key.
    pub url: String,
    pub title: Option<String>,
    /// The date string as it appeared on the page.
    pub published_raw: Option<String>,
    /// Parsed form of `published_raw`, if any format matched.
    pub published_at: Option<DateTime<Utc>>,
    /// Position at discovery time; stable fallback sort key.
    pub first_seen_order: u64,
}

impl ArticleRecord {
    /// The date to show in outputs: the parsed date as `YYYY-MM-DD`, or the
    /// raw string when it could not be parsed.
    pub fn display_date(&self) -> Option<String> {
        match (&self.published_at, &self.published_raw) {
            (Some(at), _) => Some(at.format("%Y-%m-%d").to_string()),
            (None, Some(raw)) => Some(raw.clone()),
            (None, None) => None,
        }
    }
}

/// Progress of a crawl over one archive.
#[derive(Debug, Clone)]
pub struct CrawlState {
    pub archive_url: String,
    pub visited_urls: HashSet<String>,
    /// Discovery order.
    pub records: Vec<ArticleRecord>,
    pub last_scroll_height: u64,
    pub no_new_content_streak: u32,
    pub saved_at: Option<DateTime<Utc>>,
}

impl CrawlState {
    pub fn new(archive_url: impl Into<String>) -> Self {
        Self {
            archive_url: archive_url.into(),
            visited_urls: HashSet::new(),
            records: Vec::new(),
            last_scroll_height: 0,
            no_new_content_streak: 0,
            saved_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
