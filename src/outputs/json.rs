//! JSON output for downstream tools.
//!
//! ```json
//! {
//!   "total_articles": 2,
//!   "articles": [
//!     { "url": "...", "title": "...", "date": "2024-01-15", "published_at": "2024-01-15T00:00:00Z" }
//!   ]
//! }
//! ```
//!
//! Dates and titles are always included, regardless of the display columns.

use crate::error::ExportError;
use crate::models::ArticleRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ArticleList<'a> {
    total_articles: usize,
    articles: Vec<ArticleEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ArticleEntry<'a> {
    url: &'a str,
    title: Option<&'a str>,
    date: Option<&'a str>,
    published_at: Option<DateTime<Utc>>,
}

pub fn render(records: &[ArticleRecord]) -> Result<Vec<u8>, ExportError> {
    let list = ArticleList {
        total_articles: records.len(),
        articles: records
            .iter()
            .map(|r| ArticleEntry {
                url: &r.url,
                title: r.title.as_deref(),
                date: r.published_raw.as_deref(),
                published_at: r.published_at,
            })
            .collect(),
    };
    Ok(serde_json::to_vec_pretty(&list)?)
}
