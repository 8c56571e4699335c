//! Scroll-driven incremental crawl with checkpointed resume.
//!
//! # State Machine
//!
//! ```text
//! Initializing ─▶ Rendering ─▶ Extracting ─▶ Deciding ─┬─▶ Rendering
//!                                                      ├─▶ Exhausted (success)
//!      any renderer failure after retries ─────────────┴─▶ Failed
//! ```
//!
//! - **Initializing**: validate the URL, restore the checkpoint when resuming,
//!   navigate, wait, take the starting height.
//! - **Rendering**: scroll to the bottom, wait a randomized interval so lazy
//!   content can arrive, measure the height. The wait is the only point where
//!   cancellation is observed.
//! - **Extracting**: parse the markup and merge new records.
//! - **Deciding**: a taller page or new records reset the no-progress streak;
//!   otherwise it grows. `exhaustion_threshold` consecutive unchanged cycles
//!   end the crawl.
//!
//! The renderer is owned by the run and closed on every exit path, after the
//! final checkpoint write.

use crate::checkpoint::CheckpointStore;
use crate::error::{CrawlError, CrawlFailure};
use crate::models::{ArticleRecord, CrawlState};
use crate::normalizer::{ArticleNormalizer, sort_records};
use crate::parser::DocumentParser;
use crate::renderer::{PageRenderer, RetryPolicy, RetryRenderer};
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Non-terminal crawl states, reported on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Initializing,
    Rendering,
    Extracting,
    Deciding,
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlPhase::Initializing => "initializing",
            CrawlPhase::Rendering => "rendering",
            CrawlPhase::Extracting => "extracting",
            CrawlPhase::Deciding => "deciding",
        };
        f.write_str(name)
    }
}

/// Why a successful crawl stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `exhaustion_threshold` consecutive cycles without progress.
    Exhausted,
    /// `max_cycles` reached first; the checkpoint is kept.
    CycleLimit,
}

/// Randomized wait bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRange {
    pub min: Duration,
    pub max: Duration,
}

impl WaitRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(duration: Duration) -> Self {
        Self::new(duration, duration)
    }

    fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rng().random_range(min..=max))
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Restore the saved checkpoint for the archive, if any.
    pub resume: bool,
    pub exhaustion_threshold: u32,
    pub initial_wait: WaitRange,
    pub scroll_wait: WaitRange,
    pub checkpoint_every: u32,
    pub max_cycles: Option<u32>,
    /// Delete the checkpoint after exhaustion.
    pub clear_on_success: bool,
    pub sort_by_date: bool,
    pub ascending: bool,
    /// Keep the last rendered document for inspection.
    pub capture_markup: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            resume: false,
            exhaustion_threshold: 3,
            initial_wait: WaitRange::new(Duration::from_secs(3), Duration::from_secs(6)),
            scroll_wait: WaitRange::new(Duration::from_secs(3), Duration::from_secs(6)),
            checkpoint_every: 1,
            max_cycles: None,
            clear_on_success: true,
            sort_by_date: false,
            ascending: false,
            capture_markup: false,
        }
    }
}

/// Result of a successful crawl.
#[derive(Debug)]
pub struct CrawlOutcome {
    /// All records, ordered per the sort options.
    pub records: Vec<ArticleRecord>,
    pub total: usize,
    /// Records discovered by this run, excluding restored ones.
    pub new_this_run: usize,
    /// Records restored from the checkpoint.
    pub resumed_from: usize,
    /// Scroll cycles performed.
    pub cycles: u32,
    /// Backoff-and-retry cycles performed at the renderer boundary.
    pub retries: u32,
    pub stop_reason: StopReason,
    /// Last rendered document, when `capture_markup` is set.
    pub final_markup: Option<String>,
}

/// Bookkeeping for one run.
struct Run {
    state: CrawlState,
    phase: CrawlPhase,
    cycle: u32,
    resumed_from: usize,
    checkpoint_saved: bool,
}

/// Drives a [`PageRenderer`] until the archive stops growing.
#[derive(Debug)]
pub struct IncrementalCrawler<P> {
    parser: P,
    normalizer: ArticleNormalizer,
    store: Option<CheckpointStore>,
    retry: RetryPolicy,
    options: CrawlOptions,
}

impl<P: DocumentParser> IncrementalCrawler<P> {
    pub fn new(
        parser: P,
        normalizer: ArticleNormalizer,
        store: Option<CheckpointStore>,
        retry: RetryPolicy,
        options: CrawlOptions,
    ) -> Self {
        Self {
            parser,
            normalizer,
            store,
            retry,
            options,
        }
    }

    /// Crawl `archive_url` with `renderer`, which is closed before returning.
    ///
    /// Setting `cancel` to `true` stops the crawl at the next wait; the
    /// progress so far is checkpointed and returned in the failure.
    #[instrument(level = "info", skip(self, renderer, cancel))]
    pub async fn run<R: PageRenderer>(
        &self,
        archive_url: &str,
        renderer: R,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<CrawlOutcome, CrawlFailure> {
        let started = Instant::now();
        let mut renderer = RetryRenderer::new(renderer, self.retry.clone());
        let mut run = Run {
            state: CrawlState::new(archive_url),
            phase: CrawlPhase::Initializing,
            cycle: 0,
            resumed_from: 0,
            checkpoint_saved: false,
        };

        let result = self.drive(&mut run, &mut renderer, &mut cancel).await;

        match &result {
            Ok(StopReason::Exhausted) => {
                self.checkpoint(&mut run).await;
                if self.options.clear_on_success {
                    if let Some(store) = &self.store {
                        match store.clear(archive_url).await {
                            Ok(()) => run.checkpoint_saved = false,
                            Err(e) => warn!(error = %e, "Failed to clear checkpoint"),
                        }
                    }
                }
            }
            Ok(StopReason::CycleLimit) => self.checkpoint(&mut run).await,
            Err(_) if run.cycle > 0 || !run.state.is_empty() => self.checkpoint(&mut run).await,
            Err(_) => {}
        }

        let final_markup = if self.options.capture_markup {
            match renderer.current_markup().await {
                Ok(markup) => Some(markup),
                Err(e) => {
                    warn!(error = %e, "Could not capture the final document");
                    None
                }
            }
        } else {
            None
        };
        let retries = renderer.retries();
        renderer.close().await;

        let elapsed = started.elapsed();
        match result {
            Ok(stop_reason) => {
                let total = run.state.records.len();
                info!(
                    total,
                    new = total - run.resumed_from,
                    cycles = run.cycle,
                    retries,
                    ?stop_reason,
                    secs = elapsed.as_secs(),
                    "Crawl finished"
                );
                Ok(CrawlOutcome {
                    records: sort_records(
                        &run.state.records,
                        self.options.sort_by_date,
                        self.options.ascending,
                    ),
                    total,
                    new_this_run: total - run.resumed_from,
                    resumed_from: run.resumed_from,
                    cycles: run.cycle,
                    retries,
                    stop_reason,
                    final_markup,
                })
            }
            Err(source) => {
                let failure = CrawlFailure {
                    phase: run.phase,
                    records: run.state.records,
                    checkpoint_saved: run.checkpoint_saved,
                    final_markup,
                    source,
                };
                warn!(
                    phase = %failure.phase,
                    records = failure.records.len(),
                    checkpoint_saved = failure.checkpoint_saved,
                    error = %failure.source,
                    secs = elapsed.as_secs(),
                    "Crawl stopped early"
                );
                Err(failure)
            }
        }
    }

    async fn drive<R: PageRenderer>(
        &self,
        run: &mut Run,
        renderer: &mut R,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<StopReason, CrawlError> {
        let archive_url = run.state.archive_url.clone();
        validate_archive_url(&archive_url)?;

        if self.options.resume {
            if let Some(store) = &self.store {
                if let Some(restored) = store.load(&archive_url).await {
                    run.resumed_from = restored.records.len();
                    info!(
                        records = run.resumed_from,
                        previous_height = restored.last_scroll_height,
                        "Resuming from checkpoint"
                    );
                    run.state = restored;
                }
            }
        }

        renderer.navigate(&archive_url).await?;
        pause(self.options.initial_wait, cancel).await?;
        // A fresh session starts at the top of the page again.
        run.state.last_scroll_height = renderer.current_height().await?;
        run.state.no_new_content_streak = 0;
        debug!(height = run.state.last_scroll_height, "Initial render complete");

        loop {
            run.cycle += 1;

            run.phase = CrawlPhase::Rendering;
            renderer.scroll_to_bottom().await?;
            pause(self.options.scroll_wait, cancel).await?;
            let height = renderer.current_height().await?;

            run.phase = CrawlPhase::Extracting;
            let markup = renderer.current_markup().await?;
            let candidates = self.parser.extract(&markup, &archive_url);
            let found = candidates.len();
            let added = self.normalizer.merge(&mut run.state, candidates);

            run.phase = CrawlPhase::Deciding;
            let grew = height > run.state.last_scroll_height;
            if grew || added > 0 {
                run.state.no_new_content_streak = 0;
                run.state.last_scroll_height = height;
            } else {
                run.state.no_new_content_streak += 1;
            }
            info!(
                cycle = run.cycle,
                height,
                found,
                added,
                total = run.state.records.len(),
                streak = run.state.no_new_content_streak,
                "Scroll cycle complete"
            );

            if run.state.no_new_content_streak >= self.options.exhaustion_threshold {
                info!(cycle = run.cycle, "Archive exhausted");
                return Ok(StopReason::Exhausted);
            }
            if self.options.max_cycles.is_some_and(|max| run.cycle >= max) {
                warn!(cycle = run.cycle, "Stopping at the cycle limit");
                return Ok(StopReason::CycleLimit);
            }
            if run.cycle % self.options.checkpoint_every.max(1) == 0 {
                self.checkpoint(run).await;
            }
        }
    }

    async fn checkpoint(&self, run: &mut Run) {
        let Some(store) = &self.store else {
            return;
        };
        match store.save(&mut run.state).await {
            Ok(()) => run.checkpoint_saved = true,
            Err(e) => {
                warn!(error = %e, "Failed to save checkpoint; continuing");
                run.checkpoint_saved = false;
            }
        }
    }
}

fn validate_archive_url(archive_url: &str) -> Result<(), CrawlError> {
    let url = Url::parse(archive_url)
        .map_err(|e| CrawlError::InvalidUrl(format!("{archive_url}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(CrawlError::InvalidUrl(format!(
            "{archive_url}: expected an http(s) URL with a host"
        )));
    }
    Ok(())
}

/// Wait a sampled interval unless cancelled first.
async fn pause(range: WaitRange, cancel: &mut watch::Receiver<bool>) -> Result<(), CrawlError> {
    if *cancel.borrow() {
        return Err(CrawlError::Cancelled);
    }
    let delay = range.sample();
    debug!(?delay, "Waiting for content to settle");
    tokio::select! {
        _ = sleep(delay) => Ok(()),
        _ = cancelled(cancel) => Err(CrawlError::Cancelled),
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        // Sender gone: nobody can cancel any more.
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::models::ArticleCandidate;
    use crate::parser::ArchiveLinkParser;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tempfile::tempdir;

    const ARCHIVE: &str = "https://example.substack.com/archive";

    /// In-memory archive: every scroll reveals the next batch of posts.
    struct ScriptedRenderer {
        batches: Vec<Vec<String>>,
        loaded: usize,
        navigate_errors: VecDeque<RenderError>,
        scroll_errors: VecDeque<(u32, RenderError)>,
        cancel_on_scroll: Option<(u32, watch::Sender<bool>)>,
        /// Records in the saved snapshot at the start of each scroll.
        watched_store: Option<(CheckpointStore, Arc<Mutex<Vec<Option<usize>>>>)>,
        scrolls: u32,
        navigations: Arc<AtomicU32>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedRenderer {
        fn new(batch_sizes: &[usize]) -> Self {
            let mut next = 0;
            let batches: Vec<Vec<String>> = batch_sizes
                .iter()
                .map(|&size| {
                    (0..size)
                        .map(|_| {
                            next += 1;
                            format!("post-{next}")
                        })
                        .collect::<Vec<String>>()
                })
                .collect();
            Self {
                batches,
                loaded: 0,
                navigate_errors: VecDeque::new(),
                scroll_errors: VecDeque::new(),
                cancel_on_scroll: None,
                watched_store: None,
                scrolls: 0,
                navigations: Arc::new(AtomicU32::new(0)),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl PageRenderer for ScriptedRenderer {
        async fn navigate(&mut self, _url: &str) -> Result<(), RenderError> {
            self.navigations.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.navigate_errors.pop_front() {
                return Err(err);
            }
            self.loaded = 0;
            Ok(())
        }

        async fn scroll_to_bottom(&mut self) -> Result<(), RenderError> {
            self.scrolls += 1;
            if let Some((store, seen)) = &self.watched_store {
                let saved = store.load(ARCHIVE).await.map(|state| state.records.len());
                seen.lock().unwrap().push(saved);
            }
            if let Some((at, _)) = self.scroll_errors.front() {
                if *at == self.scrolls {
                    let (_, err) = self.scroll_errors.pop_front().unwrap();
                    return Err(err);
                }
            }
            if let Some((at, sender)) = &self.cancel_on_scroll {
                if *at == self.scrolls {
                    sender.send(true).unwrap();
                }
            }
            self.loaded = (self.loaded + 1).min(self.batches.len());
            Ok(())
        }

        async fn current_height(&mut self) -> Result<u64, RenderError> {
            Ok(1_000 + 500 * self.loaded as u64)
        }

        async fn current_markup(&mut self) -> Result<String, RenderError> {
            let mut html = String::from("<html><body>");
            for slug in self.batches[..self.loaded].iter().flatten() {
                html.push_str(&format!(
                    "<div><a href=\"/p/{slug}\">Title of {slug}</a><time>Jan 5, 2024</time></div>"
                ));
            }
            html.push_str("</body></html>");
            Ok(html)
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn instant_options() -> CrawlOptions {
        CrawlOptions {
            initial_wait: WaitRange::fixed(Duration::ZERO),
            scroll_wait: WaitRange::fixed(Duration::ZERO),
            ..CrawlOptions::default()
        }
    }

    fn instant_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn crawler(
        store: Option<CheckpointStore>,
        options: CrawlOptions,
    ) -> IncrementalCrawler<ArchiveLinkParser> {
        IncrementalCrawler::new(
            ArchiveLinkParser::default(),
            ArticleNormalizer::default(),
            store,
            instant_retry(),
            options,
        )
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        rx
    }

    #[tokio::test]
    async fn test_three_batches_then_exhausted_on_cycle_six() {
        let renderer = ScriptedRenderer::new(&[10, 10, 5]);
        let closed = renderer.closed.clone();

        let outcome = crawler(None, instant_options())
            .run(ARCHIVE, renderer, no_cancel())
            .await
            .unwrap();

        assert_eq!(outcome.total, 25);
        assert_eq!(outcome.records.len(), 25);
        assert_eq!(outcome.new_this_run, 25);
        assert_eq!(outcome.cycles, 6);
        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_exhaustion_after_exactly_threshold_unchanged_cycles() {
        for threshold in [1, 3, 5] {
            let options = CrawlOptions {
                exhaustion_threshold: threshold,
                ..instant_options()
            };
            let outcome = crawler(None, options)
                .run(ARCHIVE, ScriptedRenderer::new(&[4]), no_cancel())
                .await
                .unwrap();
            assert_eq!(outcome.cycles, 1 + threshold);
            assert_eq!(outcome.total, 4);
        }
    }

    #[tokio::test]
    async fn test_height_growth_alone_resets_streak() {
        // The empty batch still makes the page taller.
        let outcome = crawler(None, instant_options())
            .run(ARCHIVE, ScriptedRenderer::new(&[5, 0, 0, 5]), no_cancel())
            .await
            .unwrap();
        assert_eq!(outcome.total, 10);
        assert_eq!(outcome.cycles, 4 + 3);
    }

    #[tokio::test]
    async fn test_checkpoint_written_every_n_cycles() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut renderer = ScriptedRenderer::new(&[2, 2, 2, 2, 2, 2]);
        renderer.watched_store = Some((store.clone(), seen.clone()));
        let options = CrawlOptions {
            checkpoint_every: 2,
            clear_on_success: false,
            ..instant_options()
        };

        let outcome = crawler(Some(store), options)
            .run(ARCHIVE, renderer, no_cancel())
            .await
            .unwrap();
        assert_eq!(outcome.cycles, 9);

        // Snapshots land after cycles 2, 4, 6 and 8 only.
        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                None,
                None,
                Some(4),
                Some(4),
                Some(8),
                Some(8),
                Some(12),
                Some(12),
                Some(12)
            ]
        );
    }

    #[tokio::test]
    async fn test_final_markup_only_when_captured() {
        let outcome = crawler(None, instant_options())
            .run(ARCHIVE, ScriptedRenderer::new(&[3]), no_cancel())
            .await
            .unwrap();
        assert!(outcome.final_markup.is_none());

        let options = CrawlOptions {
            capture_markup: true,
            ..instant_options()
        };
        let outcome = crawler(None, options)
            .run(ARCHIVE, ScriptedRenderer::new(&[3]), no_cancel())
            .await
            .unwrap();
        let markup = outcome.final_markup.unwrap();
        assert!(markup.contains("/p/post-3"));
    }

    #[tokio::test]
    async fn test_transient_navigation_errors_are_retried() {
        let mut renderer = ScriptedRenderer::new(&[3]);
        renderer.navigate_errors = VecDeque::from([
            RenderError::Transient("timeout".into()),
            RenderError::Transient("connection reset".into()),
        ]);
        let navigations = renderer.navigations.clone();

        let outcome = crawler(None, instant_options())
            .run(ARCHIVE, renderer, no_cancel())
            .await
            .unwrap();

        assert_eq!(outcome.retries, 2);
        assert_eq!(navigations.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_fails_in_initializing() {
        let mut renderer = ScriptedRenderer::new(&[3]);
        renderer.navigate_errors = VecDeque::from(vec![RenderError::Transient("timeout".into()); 3]);
        let closed = renderer.closed.clone();
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let failure = crawler(Some(store.clone()), instant_options())
            .run(ARCHIVE, renderer, no_cancel())
            .await
            .unwrap_err();

        assert_eq!(failure.phase, CrawlPhase::Initializing);
        assert!(matches!(failure.source, CrawlError::Render(RenderError::Transient(_))));
        assert!(failure.records.is_empty());
        assert!(!failure.checkpoint_saved);
        assert!(!store.exists(ARCHIVE).await);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_permanent_error_keeps_partial_records_and_checkpoint() {
        let mut renderer = ScriptedRenderer::new(&[10, 10]);
        renderer.scroll_errors = VecDeque::from([(2, RenderError::Permanent("403 forbidden".into()))]);
        let closed = renderer.closed.clone();
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let failure = crawler(Some(store.clone()), instant_options())
            .run(ARCHIVE, renderer, no_cancel())
            .await
            .unwrap_err();

        assert_eq!(failure.phase, CrawlPhase::Rendering);
        assert_eq!(failure.records.len(), 10);
        assert!(failure.checkpoint_saved);
        assert!(closed.load(Ordering::SeqCst));
        assert!(failure.to_string().contains("10 records collected"));

        let saved = store.load(ARCHIVE).await.unwrap();
        assert_eq!(saved.records.len(), 10);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_navigation() {
        let renderer = ScriptedRenderer::new(&[1]);
        let navigations = renderer.navigations.clone();
        let closed = renderer.closed.clone();

        let failure = crawler(None, instant_options())
            .run("ftp://example.com/archive", renderer, no_cancel())
            .await
            .unwrap_err();

        assert!(matches!(failure.source, CrawlError::InvalidUrl(_)));
        assert_eq!(failure.phase, CrawlPhase::Initializing);
        assert_eq!(navigations.load(Ordering::SeqCst), 0);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_resume_never_re_adds_visited_records() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        // A previous run saw the first batch.
        let mut previous = CrawlState::new(ARCHIVE);
        let first_batch: Vec<ArticleCandidate> = (1..=10)
            .map(|i| ArticleCandidate {
                url: format!("https://example.substack.com/p/post-{i}"),
                title: Some(format!("Saved title {i}")),
                raw_date: None,
            })
            .collect();
        ArticleNormalizer::default().merge(&mut previous, first_batch);
        previous.last_scroll_height = 99_999;
        store.save(&mut previous).await.unwrap();

        let options = CrawlOptions {
            resume: true,
            clear_on_success: false,
            ..instant_options()
        };
        let outcome = crawler(Some(store.clone()), options)
            .run(ARCHIVE, ScriptedRenderer::new(&[10, 10, 5]), no_cancel())
            .await
            .unwrap();

        assert_eq!(outcome.resumed_from, 10);
        assert_eq!(outcome.total, 25);
        assert_eq!(outcome.new_this_run, 15);
        assert_eq!(outcome.cycles, 6);

        let unique: std::collections::HashSet<_> = outcome.records.iter().map(|r| &r.url).collect();
        assert_eq!(unique.len(), 25);
        let first = &outcome.records[0];
        assert_eq!(first.title.as_deref(), Some("Saved title 1"));
        // The date only appeared in the new render and fills the gap.
        assert_eq!(first.published_raw.as_deref(), Some("Jan 5, 2024"));

        assert_eq!(store.load(ARCHIVE).await.unwrap().records.len(), 25);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_with_resume_starts_fresh() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        std::fs::write(store.snapshot_path(ARCHIVE), "{ this is not json").unwrap();

        let options = CrawlOptions {
            resume: true,
            ..instant_options()
        };
        let outcome = crawler(Some(store), options)
            .run(ARCHIVE, ScriptedRenderer::new(&[10, 10, 5]), no_cancel())
            .await
            .unwrap();

        assert_eq!(outcome.resumed_from, 0);
        assert_eq!(outcome.total, 25);
        assert_eq!(outcome.new_this_run, 25);
    }

    #[tokio::test]
    async fn test_checkpoint_cleared_only_when_requested() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        crawler(Some(store.clone()), instant_options())
            .run(ARCHIVE, ScriptedRenderer::new(&[2]), no_cancel())
            .await
            .unwrap();
        assert!(!store.exists(ARCHIVE).await);

        let keep = CrawlOptions {
            clear_on_success: false,
            ..instant_options()
        };
        crawler(Some(store.clone()), keep)
            .run(ARCHIVE, ScriptedRenderer::new(&[2]), no_cancel())
            .await
            .unwrap();
        assert!(store.exists(ARCHIVE).await);
    }

    #[tokio::test]
    async fn test_cancellation_checkpoints_then_releases_renderer() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let (tx, rx) = watch::channel(false);
        let mut renderer = ScriptedRenderer::new(&[10, 10, 10]);
        renderer.cancel_on_scroll = Some((2, tx));
        let closed = renderer.closed.clone();

        let failure = crawler(Some(store.clone()), instant_options())
            .run(ARCHIVE, renderer, rx)
            .await
            .unwrap_err();

        assert!(failure.is_cancelled());
        assert_eq!(failure.phase, CrawlPhase::Rendering);
        assert_eq!(failure.records.len(), 10);
        assert!(failure.checkpoint_saved);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(store.load(ARCHIVE).await.unwrap().records.len(), 10);
    }

    #[tokio::test]
    async fn test_cycle_limit_keeps_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let options = CrawlOptions {
            max_cycles: Some(2),
            checkpoint_every: 5,
            ..instant_options()
        };

        let outcome = crawler(Some(store.clone()), options)
            .run(ARCHIVE, ScriptedRenderer::new(&[10, 10, 10]), no_cancel())
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::CycleLimit);
        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.total, 20);
        assert_eq!(store.load(ARCHIVE).await.unwrap().records.len(), 20);
    }

    #[tokio::test]
    async fn test_sorted_output() {
        let options = CrawlOptions {
            sort_by_date: true,
            ..instant_options()
        };
        let outcome = crawler(None, options)
            .run(ARCHIVE, ScriptedRenderer::new(&[3]), no_cancel())
            .await
            .unwrap();
        // Same date everywhere: discovery order decides.
        let orders: Vec<u64> = outcome.records.iter().map(|r| r.first_seen_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn test_wait_range_sampling_stays_in_bounds() {
        let range = WaitRange::new(Duration::from_millis(10), Duration::from_millis(20));
        for _ in 0..100 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(WaitRange::fixed(Duration::ZERO).sample(), Duration::ZERO);
    }
}
