//! Output writers for crawl results.
//!
//! # Submodules
//!
//! - [`txt`]: one line per article, `date - title - url`
//! - [`csv`]: header row plus one row per article
//! - [`json`]: `{ "total_articles": n, "articles": [...] }`
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── example_substack_com_archive.txt          # or .csv / .json
//! └── example_substack_com_archive.debug.html   # with --debug
//! ```

use crate::error::ExportError;
use crate::models::ArticleRecord;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

pub mod csv;
pub mod json;
pub mod txt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Txt,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Txt => "txt",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Which optional columns to include.
#[derive(Debug, Clone, Copy, Default)]
pub struct Columns {
    pub dates: bool,
    pub titles: bool,
}

/// Write `records` to `{dir}/{stem}.{ext}` and return the path.
#[instrument(level = "info", skip(records), fields(count = records.len()))]
pub async fn export(
    records: &[ArticleRecord],
    format: OutputFormat,
    dir: &Path,
    stem: &str,
    columns: Columns,
) -> Result<PathBuf, ExportError> {
    let path = dir.join(format!("{stem}.{}", format.extension()));
    let bytes = match format {
        OutputFormat::Txt => txt::render(records, columns).into_bytes(),
        OutputFormat::Csv => csv::render(records, columns)?,
        OutputFormat::Json => json::render(records)?,
    };
    fs::write(&path, bytes).await.map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "Wrote articles");
    Ok(path)
}

/// Save the last rendered document as `{dir}/{stem}.debug.html`.
#[instrument(level = "info", skip(markup), fields(bytes = markup.len()))]
pub async fn write_debug_html(dir: &Path, stem: &str, markup: &str) -> Result<PathBuf, ExportError> {
    let path = dir.join(format!("{stem}.debug.html"));
    fs::write(&path, markup).await.map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "Saved debug HTML");
    Ok(path)
}

/// Print the text rendering to stdout with a count header.
pub fn print_to_console(records: &[ArticleRecord], columns: Columns) {
    println!("\nFound {} articles:\n", records.len());
    print!("{}", txt::render(records, columns));
}
