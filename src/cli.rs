//! Command-line interface definitions.
//!
//! Flags override the matching keys of the configuration file.

use archive_crawler::outputs::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

/// Collect article links from an infinite-scroll archive page.
///
/// # Examples
///
/// ```sh
/// # Basic usage
/// archive_crawler https://example.substack.com/archive
///
/// # Dates and titles, newest first, as CSV
/// archive_crawler https://example.substack.com/archive --show-dates --show-titles --sort-by-date -f csv
///
/// # Pick up where an interrupted run stopped
/// archive_crawler https://example.substack.com/archive --resume
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Archive page URL (e.g. https://example.substack.com/archive)
    pub url: String,

    /// Path to a YAML or JSON configuration file
    #[arg(short, long, env = "ARCHIVE_CRAWLER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Resume from the checkpoint of a previous run
    #[arg(long)]
    pub resume: bool,

    /// Do not read or write checkpoints
    #[arg(long, conflicts_with = "resume")]
    pub no_checkpoint: bool,

    /// Keep the checkpoint after a complete crawl
    #[arg(long)]
    pub keep_checkpoint: bool,

    /// Unchanged scroll cycles before the archive counts as exhausted
    #[arg(long)]
    pub threshold: Option<u32>,

    /// Sort articles by publication date (newest first)
    #[arg(long)]
    pub sort_by_date: bool,

    /// Oldest first when sorting by date
    #[arg(long, requires = "sort_by_date")]
    pub ascending: bool,

    /// Include publication dates in the output
    #[arg(long)]
    pub show_dates: bool,

    /// Include titles in the output
    #[arg(long)]
    pub show_titles: bool,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output file name without extension (defaults to one derived from the URL)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Output directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Also print the articles to stdout
    #[arg(long)]
    pub print: bool,

    /// Save the last rendered HTML next to the results and log at debug level
    #[arg(long)]
    pub debug: bool,

    /// Log filter when RUST_LOG is unset (e.g. debug, archive_crawler=trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
