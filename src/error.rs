//! Error types for crawling, checkpointing, configuration and export.
//!
//! Renderer failures are split into two kinds so the retry policy can tell
//! them apart:
//!
//! - [`RenderError::Transient`]: timeouts and temporary connectivity problems,
//!   retried with backoff.
//! - [`RenderError::Permanent`]: invalid URLs, an unavailable renderer, or a
//!   blocked/forbidden response, surfaced immediately.
//!
//! A crawl that ends badly returns a [`CrawlFailure`], which keeps the records
//! collected so far so the caller can still export them.

use crate::crawler::CrawlPhase;
use crate::models::ArticleRecord;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a page renderer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Timeouts, temporary network errors, 429 and 5xx responses.
    #[error("transient render error: {0}")]
    Transient(String),

    /// Invalid URL, renderer unavailable, 4xx responses other than 404.
    #[error("permanent render error: {0}")]
    Permanent(String),

    /// The resource does not exist (404). Never retried.
    #[error("not found: {0}")]
    NotFound(String),
}

impl RenderError {
    /// Whether the retry policy may try the call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::Transient(_))
    }
}

/// Errors raised while writing or deleting a checkpoint snapshot.
///
/// Loading never produces one of these: an unreadable snapshot is treated as
/// "no checkpoint".
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The reason a crawl stopped before exhausting the archive.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("invalid archive URL: {0}")]
    InvalidUrl(String),

    #[error("crawl cancelled")]
    Cancelled,
}

/// A terminal crawl failure together with the partial result.
#[derive(Debug)]
pub struct CrawlFailure {
    /// The state the crawler was in when the failure happened.
    pub phase: CrawlPhase,
    /// Records collected before the failure, in discovery order.
    pub records: Vec<ArticleRecord>,
    /// Whether a checkpoint was written on the way out.
    pub checkpoint_saved: bool,
    /// Last rendered document, when markup capture is enabled.
    pub final_markup: Option<String>,
    pub source: CrawlError,
}

impl CrawlFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, CrawlError::Cancelled)
    }
}

impl fmt::Display for CrawlFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "crawl failed while {}: {} ({} records collected, checkpoint {})",
            self.phase,
            self.source,
            self.records.len(),
            if self.checkpoint_saved {
                "saved for resume"
            } else {
                "not saved"
            }
        )
    }
}

impl std::error::Error for CrawlFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Errors raised while loading or validating the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported config format {path} (expected .yaml, .yml or .json)")]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Errors raised by the output writers.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode JSON output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode CSV output: {0}")]
    Csv(#[from] csv::Error),
}
