//! Plain-text output: `date - title - url`, optional parts omitted.

use super::Columns;
use crate::models::ArticleRecord;

pub fn render(records: &[ArticleRecord], columns: Columns) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&line(record, columns));
        out.push('\n');
    }
    out
}

pub fn line(record: &ArticleRecord, columns: Columns) -> String {
    let mut parts = Vec::with_capacity(3);
    if columns.dates {
        if let Some(date) = record.display_date() {
            parts.push(date);
        }
    }
    if columns.titles {
        if let Some(title) = &record.title {
            parts.push(title.clone());
        }
    }
    parts.push(record.url.clone());
    parts.join(" - ")
}
