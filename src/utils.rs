//! Helpers for output naming and filesystem checks.

use crate::error::ExportError;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};
use url::Url;

/// Derive a file stem from an archive URL.
///
/// Host and path are joined with underscores and everything that is not
/// alphanumeric is replaced, so `https://foo.substack.com/archive` becomes
/// `foo_substack_com_archive`.
///
/// # Examples
///
/// ```
/// use archive_crawler::utils::output_stem;
/// assert_eq!(output_stem("https://foo.substack.com/archive"), "foo_substack_com_archive");
/// ```
pub fn output_stem(archive_url: &str) -> String {
    let raw = match Url::parse(archive_url) {
        Ok(url) => format!("{}{}", url.host_str().unwrap_or_default(), url.path()),
        Err(_) => archive_url.to_string(),
    };
    let stem = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if stem.is_empty() {
        "articles".to_string()
    } else {
        stem
    }
}

/// Probe file name; the leading dot keeps it out of casual listings.
const WRITE_PROBE: &str = ".archive_crawler.probe";

/// Create `dir` if needed and prove that files can be written into it.
///
/// Fails with the path of whichever step went wrong, so a crawl is never
/// started when its results would have nowhere to go.
#[instrument(level = "info", skip_all, fields(path = %dir.display()))]
pub async fn ensure_writable_dir(dir: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(dir).await.map_err(io_error(dir))?;
    let probe = dir.join(WRITE_PROBE);
    fs::write(&probe, b"").await.map_err(io_error(&probe))?;
    if let Err(e) = fs::remove_file(&probe).await {
        debug!(error = %e, "Could not remove write probe");
    }
    info!("Output directory is writable");
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError {
    let path = path.to_path_buf();
    move |source| ExportError::Io { path, source }
}
