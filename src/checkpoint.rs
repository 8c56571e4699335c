//! Crash-safe persistence of crawl progress.
//!
//! Each archive gets one snapshot file named after the hex SHA-256 of its URL,
//! so distinct archives never share a file:
//!
//! ```text
//! .checkpoints/
//! ├── 3b4c…e1.json       # current snapshot
//! └── 3b4c…e1.json.tmp   # only present while a save is in flight
//! ```
//!
//! # Atomicity
//!
//! [`CheckpointStore::save`] writes the new snapshot to the `.tmp` file,
//! syncs it, and renames it over the current one. A crash mid-write leaves the
//! previous snapshot untouched.
//!
//! # Loading
//!
//! [`CheckpointStore::load`] never fails. A missing file, unreadable JSON, a
//! different `schema_version`, or a snapshot recorded for another URL all
//! come back as `None`, which the crawler treats as a fresh start.

use crate::error::CheckpointError;
use crate::models::{ArticleRecord, CrawlState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Version tag written into every snapshot. Bump on incompatible changes.
pub const SCHEMA_VERSION: u32 = 1;

/// On-disk form of a [`CrawlState`].
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    schema_version: u32,
    archive_url: String,
    visited_urls: Vec<String>,
    records: Vec<ArticleRecord>,
    last_scroll_height: u64,
    no_new_content_streak: u32,
    saved_at: DateTime<Utc>,
}

impl Snapshot {
    fn from_state(state: &CrawlState, saved_at: DateTime<Utc>) -> Self {
        let mut visited_urls: Vec<String> = state.visited_urls.iter().cloned().collect();
        visited_urls.sort();
        Self {
            schema_version: SCHEMA_VERSION,
            archive_url: state.archive_url.clone(),
            visited_urls,
            records: state.records.clone(),
            last_scroll_height: state.last_scroll_height,
            no_new_content_streak: state.no_new_content_streak,
            saved_at,
        }
    }

    fn into_state(self) -> CrawlState {
        CrawlState {
            archive_url: self.archive_url,
            visited_urls: self.visited_urls.into_iter().collect(),
            records: self.records,
            last_scroll_height: self.last_scroll_height,
            no_new_content_streak: self.no_new_content_streak,
            saved_at: Some(self.saved_at),
        }
    }
}

/// Only the version tag, read before committing to the full layout.
#[derive(Deserialize)]
struct VersionProbe {
    schema_version: Option<u32>,
}

/// Directory of per-archive snapshots.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    directory: PathBuf,
}

impl CheckpointStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the snapshot for `archive_url`.
    pub fn snapshot_path(&self, archive_url: &str) -> PathBuf {
        self.directory.join(format!("{}.json", checkpoint_key(archive_url)))
    }

    /// Persist `state` atomically and stamp it with the save time.
    #[instrument(level = "debug", skip_all, fields(url = %state.archive_url, records = state.records.len()))]
    pub async fn save(&self, state: &mut CrawlState) -> Result<(), CheckpointError> {
        let saved_at = Utc::now();
        let json = serde_json::to_vec_pretty(&Snapshot::from_state(state, saved_at))?;

        fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| CheckpointError::Io {
                path: self.directory.clone(),
                source,
            })?;

        let path = self.snapshot_path(&state.archive_url);
        let temp_path = path.with_extension("json.tmp");

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&json).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(source) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CheckpointError::Io { path, source });
        }

        state.saved_at = Some(saved_at);
        debug!(path = %path.display(), "Checkpoint saved");
        Ok(())
    }

    /// Restore the snapshot for `archive_url`, or `None` if there is no
    /// usable one.
    #[instrument(level = "debug", skip(self))]
    pub async fn load(&self, archive_url: &str) -> Option<CrawlState> {
        let path = self.snapshot_path(archive_url);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No checkpoint found");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint unreadable; ignoring");
                return None;
            }
        };

        match serde_json::from_slice::<VersionProbe>(&bytes) {
            Ok(VersionProbe {
                schema_version: Some(SCHEMA_VERSION),
            }) => {}
            Ok(VersionProbe { schema_version }) => {
                warn!(
                    path = %path.display(),
                    found = ?schema_version,
                    expected = SCHEMA_VERSION,
                    "Checkpoint schema mismatch; ignoring"
                );
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint corrupt; ignoring");
                return None;
            }
        }

        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint corrupt; ignoring");
                return None;
            }
        };

        if snapshot.archive_url != archive_url {
            warn!(
                path = %path.display(),
                found = %snapshot.archive_url,
                "Checkpoint belongs to a different archive; ignoring"
            );
            return None;
        }

        info!(
            records = snapshot.records.len(),
            saved_at = %snapshot.saved_at,
            "Checkpoint loaded"
        );
        Some(snapshot.into_state())
    }

    /// Delete the snapshot for `archive_url`. Missing files are not an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn clear(&self, archive_url: &str) -> Result<(), CheckpointError> {
        let path = self.snapshot_path(archive_url);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }

    pub async fn exists(&self, archive_url: &str) -> bool {
        fs::try_exists(self.snapshot_path(archive_url))
            .await
            .unwrap_or(false)
    }
}

/// Stable file stem for an archive URL.
pub fn checkpoint_key(archive_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(archive_url.as_bytes());
    hex::encode(hasher.finalize())
}
