//! CSV output with a `title,date,url` header (optional columns omitted).

use super::Columns;
use crate::error::ExportError;
use crate::models::ArticleRecord;

pub fn render(records: &[ArticleRecord], columns: Columns) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = Vec::with_capacity(3);
    if columns.titles {
        header.push("title");
    }
    if columns.dates {
        header.push("date");
    }
    header.push("url");
    writer.write_record(&header)?;

    for record in records {
        let mut row = Vec::with_capacity(3);
        if columns.titles {
            row.push(record.title.clone().unwrap_or_default());
        }
        if columns.dates {
            row.push(record.display_date().unwrap_or_default());
        }
        row.push(record.url.clone());
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))
}
